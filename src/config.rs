use crate::services::ingestion::{IngestionSettings, OrphanPolicy};
use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, fmt::Display, str::FromStr, time::Duration};

/// Which object store backend the server talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ObjectStoreKind {
    /// Remote provider over HTTP.
    Http,
    /// In-process map; contents are lost on restart.
    Memory,
}

impl FromStr for ObjectStoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(ObjectStoreKind::Http),
            "memory" => Ok(ObjectStoreKind::Memory),
            other => bail!("unknown object store `{other}` (expected http or memory)"),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub upload_folder: String,
    pub object_store: ObjectStoreKind,
    pub object_store_url: Option<String>,
    pub object_store_api_key: Option<String>,
    pub object_store_api_secret: Option<String>,
    pub remote_timeout_secs: u64,
    pub upload_retries: u32,
    pub max_file_size: usize,
    pub max_files: usize,
    pub orphan_policy: OrphanPolicy,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Media library ingestion and catalog API")]
pub struct Args {
    /// Host to bind to (overrides MEDIA_LIBRARY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides MEDIA_LIBRARY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides MEDIA_LIBRARY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Default remote folder for uploads (overrides MEDIA_LIBRARY_UPLOAD_FOLDER)
    #[arg(long)]
    pub upload_folder: Option<String>,

    /// Object store backend (overrides MEDIA_LIBRARY_OBJECT_STORE)
    #[arg(long, value_enum)]
    pub object_store: Option<ObjectStoreKind>,

    /// Object store base URL (overrides MEDIA_LIBRARY_OBJECT_STORE_URL)
    #[arg(long)]
    pub object_store_url: Option<String>,

    /// Seconds allowed for each remote call (overrides MEDIA_LIBRARY_REMOTE_TIMEOUT_SECS)
    #[arg(long)]
    pub remote_timeout_secs: Option<u64>,

    /// Extra attempts per failed upload (overrides MEDIA_LIBRARY_UPLOAD_RETRIES)
    #[arg(long)]
    pub upload_retries: Option<u32>,

    /// compensate or keep (overrides MEDIA_LIBRARY_ORPHAN_POLICY)
    #[arg(long)]
    pub orphan_policy: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::resolve(args, |key| env::var(key).ok())?;
        cfg.validate()?;
        Ok((cfg, migrate))
    }

    /// Merge CLI args over values read through `lookup`, over defaults.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_host = lookup("MEDIA_LIBRARY_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = parse_var(&lookup, "MEDIA_LIBRARY_PORT", 3000)?;
        let env_db = lookup("MEDIA_LIBRARY_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./data/media_library.db".into());
        let env_folder =
            lookup("MEDIA_LIBRARY_UPLOAD_FOLDER").unwrap_or_else(|| "media".into());
        let env_store = parse_var(&lookup, "MEDIA_LIBRARY_OBJECT_STORE", ObjectStoreKind::Http)?;
        let env_timeout = parse_var(&lookup, "MEDIA_LIBRARY_REMOTE_TIMEOUT_SECS", 30)?;
        let env_retries = parse_var(&lookup, "MEDIA_LIBRARY_UPLOAD_RETRIES", 0)?;
        let env_policy = lookup("MEDIA_LIBRARY_ORPHAN_POLICY");

        let orphan_policy = match args.orphan_policy.or(env_policy) {
            Some(raw) => raw.parse::<OrphanPolicy>().map_err(anyhow::Error::msg)?,
            None => OrphanPolicy::default(),
        };

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            upload_folder: args.upload_folder.unwrap_or(env_folder),
            object_store: args.object_store.unwrap_or(env_store),
            object_store_url: args
                .object_store_url
                .or_else(|| lookup("MEDIA_LIBRARY_OBJECT_STORE_URL")),
            object_store_api_key: lookup("MEDIA_LIBRARY_OBJECT_STORE_API_KEY"),
            object_store_api_secret: lookup("MEDIA_LIBRARY_OBJECT_STORE_API_SECRET"),
            remote_timeout_secs: args.remote_timeout_secs.unwrap_or(env_timeout),
            upload_retries: args.upload_retries.unwrap_or(env_retries),
            max_file_size: parse_var(&lookup, "MEDIA_LIBRARY_MAX_FILE_SIZE", 10 * 1024 * 1024)?,
            max_files: parse_var(&lookup, "MEDIA_LIBRARY_MAX_FILES", 20)?,
            orphan_policy,
        })
    }

    /// Reject settings the server cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.upload_folder.trim().trim_matches('/').is_empty() {
            bail!("upload folder must not be empty");
        }
        if self.remote_timeout_secs == 0 {
            bail!("remote timeout must be at least one second");
        }
        if self.max_file_size == 0 || self.max_files == 0 {
            bail!("max file size and max files must be positive");
        }
        if self.object_store == ObjectStoreKind::Http {
            for (name, value) in [
                ("MEDIA_LIBRARY_OBJECT_STORE_URL", &self.object_store_url),
                ("MEDIA_LIBRARY_OBJECT_STORE_API_KEY", &self.object_store_api_key),
                ("MEDIA_LIBRARY_OBJECT_STORE_API_SECRET", &self.object_store_api_secret),
            ] {
                if value.as_deref().is_none_or(|v| v.trim().is_empty()) {
                    bail!("{name} is required when the object store is http");
                }
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn ingestion_settings(&self) -> IngestionSettings {
        IngestionSettings {
            remote_timeout: self.remote_timeout(),
            max_file_size: self.max_file_size,
            max_files: self.max_files,
            upload_retries: self.upload_retries,
            orphan_policy: self.orphan_policy,
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{err}"))
            .with_context(|| format!("parsing {key} value `{value}`")),
        None => Ok(default),
    }
}
