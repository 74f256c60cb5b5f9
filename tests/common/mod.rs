//! Shared fixtures for the integration tests: an in-memory SQLite pool, a
//! scriptable object store and a repository that fails on insert.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use media_library::{
    models::{
        asset::{AssetDescriptor, AssetRecord, AssetUpdate, NewAsset, alt_from_filename},
        catalog::CatalogQuery,
    },
    services::{
        ingestion::UploadEntry,
        metadata_repository::{
            MetadataRepository, RepositoryError, RepositoryResult, SqliteMetadataRepository,
            migrate,
        },
        object_store::{ObjectStore, ObjectStoreError, RemoteDeletion, UploadRequest},
    },
};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use uuid::Uuid;

/// Fresh migrated in-memory database. One connection so every query sees
/// the same database.
pub async fn memory_pool() -> Arc<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory sqlite");
    migrate(&pool).await.expect("migrate");
    Arc::new(pool)
}

pub async fn sqlite_repository() -> Arc<SqliteMetadataRepository> {
    Arc::new(SqliteMetadataRepository::new(memory_pool().await))
}

pub fn entry(filename: &str, alt: Option<&str>) -> UploadEntry {
    UploadEntry::new(
        format!("bytes of {filename}").into_bytes(),
        filename,
        alt.map(str::to_string),
    )
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

/// A record as the ingestion pipeline would build it.
pub fn new_asset(n: i64, title: &str, alt: &str) -> NewAsset {
    NewAsset {
        title: title.to_string(),
        alt: alt.to_string(),
        asset_id: format!("{n:032x}"),
        public_id: format!("media/{title}"),
        version_id: "1".into(),
        signature: format!("sig-{n}"),
        width: Some(100),
        height: Some(50),
        format: "png".into(),
        resource_type: "image".into(),
        bytes: 1000 + n,
        url: format!("http://cdn.test/media/{title}.png"),
        secure_url: format!("https://cdn.test/media/{title}.png"),
        asset_folder: "media".into(),
        display_name: title.to_string(),
        original_filename: title.to_string(),
        created_at: base_time() + ChronoDuration::minutes(n),
    }
}

/// Insert `count` assets titled `asset_00`, `asset_01`, ...; later ones are newer.
pub async fn seed(repository: &dyn MetadataRepository, count: i64) -> Vec<AssetRecord> {
    let assets = (0..count)
        .map(|n| new_asset(n, &format!("asset_{n:02}"), &format!("picture {n}")))
        .collect();
    repository.insert_batch(assets).await.expect("seed assets")
}

#[derive(Default)]
struct Script {
    delays: HashMap<String, Duration>,
    failing: HashSet<String>,
    /// filename -> number of attempts that still fail before success
    flaky: HashMap<String, u32>,
    fail_deletes: bool,
    delete_delay: Option<Duration>,
}

/// Object store double whose per-file latency and failures are scripted.
#[derive(Default)]
pub struct FakeObjectStore {
    script: Mutex<Script>,
    live: Mutex<HashSet<String>>,
    uploads: Mutex<Vec<String>>,
    deletes: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeObjectStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn delay(&self, filename: &str, delay: Duration) -> &Self {
        self.script.lock().unwrap().delays.insert(filename.into(), delay);
        self
    }

    pub fn fail(&self, filename: &str) -> &Self {
        self.script.lock().unwrap().failing.insert(filename.into());
        self
    }

    pub fn flaky(&self, filename: &str, failures: u32) -> &Self {
        self.script.lock().unwrap().flaky.insert(filename.into(), failures);
        self
    }

    pub fn fail_deletes(&self) -> &Self {
        self.script.lock().unwrap().fail_deletes = true;
        self
    }

    pub fn delete_delay(&self, delay: Duration) -> &Self {
        self.script.lock().unwrap().delete_delay = Some(delay);
        self
    }

    /// Public ids currently held by the store.
    pub fn live(&self) -> HashSet<String> {
        self.live.lock().unwrap().clone()
    }

    /// Filenames of every upload attempt, in start order.
    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    /// Public ids of every delete call, in call order.
    pub fn deletes(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Put an object in place without going through `upload`.
    pub fn insert_live(&self, public_id: &str) {
        self.live.lock().unwrap().insert(public_id.into());
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn upload(&self, request: UploadRequest) -> Result<AssetDescriptor, ObjectStoreError> {
        self.uploads.lock().unwrap().push(request.filename.clone());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let (delay, fails) = {
            let mut script = self.script.lock().unwrap();
            let delay = script.delays.get(&request.filename).copied();
            let flaky = match script.flaky.get_mut(&request.filename) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            };
            (delay, flaky || script.failing.contains(&request.filename))
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fails {
            return Err(ObjectStoreError::Rejected {
                status: 500,
                message: format!("scripted failure for {}", request.filename),
            });
        }

        let stem = alt_from_filename(&request.filename);
        let public_id = format!("{}/{}", request.folder, stem);
        self.live.lock().unwrap().insert(public_id.clone());
        Ok(AssetDescriptor {
            asset_id: Uuid::new_v4().simple().to_string(),
            public_id: public_id.clone(),
            version_id: "1".into(),
            signature: format!("{:x}", md5::compute(&request.bytes)),
            width: Some(640),
            height: Some(480),
            format: "png".into(),
            resource_type: "image".into(),
            bytes: request.bytes.len() as i64,
            url: format!("http://cdn.test/{public_id}"),
            secure_url: format!("https://cdn.test/{public_id}"),
            asset_folder: request.folder.clone(),
            display_name: None,
            original_filename: stem,
            created_at: Utc::now(),
        })
    }

    async fn delete(&self, public_id: &str) -> Result<RemoteDeletion, ObjectStoreError> {
        self.deletes.lock().unwrap().push(public_id.into());
        let (fail, delay) = {
            let script = self.script.lock().unwrap();
            (script.fail_deletes, script.delete_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(ObjectStoreError::Unavailable("scripted delete failure".into()));
        }
        if self.live.lock().unwrap().remove(public_id) {
            Ok(RemoteDeletion::Deleted)
        } else {
            Ok(RemoteDeletion::AlreadyAbsent)
        }
    }

    async fn health_check(&self) -> Result<(), ObjectStoreError> {
        Ok(())
    }
}

/// Delegates to an inner repository but refuses every batch insert.
pub struct FailingRepository {
    pub inner: Arc<dyn MetadataRepository>,
}

impl FailingRepository {
    pub fn wrap(inner: Arc<dyn MetadataRepository>) -> Arc<Self> {
        Arc::new(Self { inner })
    }
}

#[async_trait]
impl MetadataRepository for FailingRepository {
    async fn insert_batch(&self, _assets: Vec<NewAsset>) -> RepositoryResult<Vec<AssetRecord>> {
        Err(RepositoryError::Sqlx(sqlx::Error::PoolTimedOut))
    }

    async fn delete_by_id(&self, id: i64) -> RepositoryResult<AssetRecord> {
        self.inner.delete_by_id(id).await
    }

    async fn query(&self, query: &CatalogQuery) -> RepositoryResult<(Vec<AssetRecord>, i64)> {
        self.inner.query(query).await
    }

    async fn get(&self, id: i64) -> RepositoryResult<AssetRecord> {
        self.inner.get(id).await
    }

    async fn update(&self, id: i64, update: AssetUpdate) -> RepositoryResult<AssetRecord> {
        self.inner.update(id, update).await
    }

    async fn ping(&self) -> RepositoryResult<()> {
        self.inner.ping().await
    }
}
