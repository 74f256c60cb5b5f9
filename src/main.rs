use anyhow::{Context, Result};
use axum::Router;
use media_library::{
    config::{AppConfig, ObjectStoreKind},
    routes,
    services::{
        library_service::LibraryService,
        memory_store::MemoryObjectStore,
        metadata_repository::{self, MetadataRepository, SqliteMetadataRepository},
        object_store::{HttpObjectStore, HttpObjectStoreConfig, ObjectStore},
    },
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!(
        addr = %cfg.addr(),
        database_url = %cfg.database_url,
        object_store = ?cfg.object_store,
        orphan_policy = %cfg.orphan_policy,
        "starting media-library"
    );

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {parent:?}"))?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let options = SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("parsing database url `{db_url}`"))?
        .create_if_missing(true);
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?,
    );

    metadata_repository::migrate(&db).await?;

    // --- Handle migration mode ---
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core services ---
    let store: Arc<dyn ObjectStore> = match cfg.object_store {
        ObjectStoreKind::Http => Arc::new(HttpObjectStore::new(HttpObjectStoreConfig {
            base_url: cfg.object_store_url.clone().unwrap_or_default(),
            api_key: cfg.object_store_api_key.clone().unwrap_or_default(),
            api_secret: cfg.object_store_api_secret.clone().unwrap_or_default(),
            timeout: cfg.remote_timeout(),
        })?),
        ObjectStoreKind::Memory => {
            tracing::warn!("using the in-memory object store; uploads are lost on restart");
            Arc::new(MemoryObjectStore::new())
        }
    };
    let repository: Arc<dyn MetadataRepository> = Arc::new(SqliteMetadataRepository::new(db));
    let service = LibraryService::new(
        store,
        repository,
        cfg.ingestion_settings(),
        cfg.upload_folder.clone(),
    );

    // --- Build router ---
    let app: Router = routes::routes::app(service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
