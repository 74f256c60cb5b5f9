//! src/services/metadata_repository.rs
//!
//! Durable asset metadata backed by SQLite. Batch inserts run in one
//! transaction, deletes return the removed row in the same statement, and
//! listings compute the page and the total count inside one read
//! transaction.

use crate::{
    errors::LibraryError,
    models::{
        asset::{AssetRecord, AssetUpdate, NewAsset},
        catalog::CatalogQuery,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

const MIGRATION_SQL: &str = include_str!("../../migrations/0001_init.sql");

const ASSET_COLUMNS: &str = "id, title, alt, asset_id, public_id, version_id, signature, \
     width, height, format, resource_type, bytes, url, secure_url, asset_folder, \
     display_name, original_filename, created_at, updated_at";

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("asset {0} not found")]
    NotFound(i64),
    #[error("asset with public id `{0}` already exists")]
    Duplicate(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

impl From<RepositoryError> for LibraryError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => LibraryError::NotFound(id),
            other => LibraryError::persistence(other.to_string()),
        }
    }
}

/// Durable store of asset records.
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// Insert every asset or none of them.
    async fn insert_batch(&self, assets: Vec<NewAsset>) -> RepositoryResult<Vec<AssetRecord>>;

    /// Remove a row and hand back what it contained.
    async fn delete_by_id(&self, id: i64) -> RepositoryResult<AssetRecord>;

    /// One page of records matching the query, plus the total match count.
    async fn query(&self, query: &CatalogQuery) -> RepositoryResult<(Vec<AssetRecord>, i64)>;

    async fn get(&self, id: i64) -> RepositoryResult<AssetRecord>;

    /// Change descriptive fields and refresh `updated_at`.
    async fn update(&self, id: i64, update: AssetUpdate) -> RepositoryResult<AssetRecord>;

    async fn ping(&self) -> RepositoryResult<()>;
}

/// Apply the embedded schema. Safe to run repeatedly.
pub async fn migrate(db: &SqlitePool) -> RepositoryResult<()> {
    let statements = MIGRATION_SQL
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    debug!("running {} migration statements", statements.len());

    for stmt in statements {
        sqlx::query(stmt).execute(db).await?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct SqliteMetadataRepository {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl SqliteMetadataRepository {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MetadataRepository for SqliteMetadataRepository {
    async fn insert_batch(&self, assets: Vec<NewAsset>) -> RepositoryResult<Vec<AssetRecord>> {
        if assets.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "INSERT INTO assets (
                title, alt, title_folded, alt_folded, asset_id, public_id, version_id,
                signature, width, height, format, resource_type, bytes, url, secure_url,
                asset_folder, display_name, original_filename, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {ASSET_COLUMNS}"
        );

        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let mut inserted = Vec::with_capacity(assets.len());

        // Dropping `tx` on any early return rolls the whole batch back.
        for asset in assets {
            let row = sqlx::query_as::<_, AssetRecord>(&sql)
                .bind(&asset.title)
                .bind(&asset.alt)
                .bind(fold(&asset.title))
                .bind(fold(&asset.alt))
                .bind(&asset.asset_id)
                .bind(&asset.public_id)
                .bind(&asset.version_id)
                .bind(&asset.signature)
                .bind(asset.width)
                .bind(asset.height)
                .bind(&asset.format)
                .bind(&asset.resource_type)
                .bind(asset.bytes)
                .bind(&asset.url)
                .bind(&asset.secure_url)
                .bind(&asset.asset_folder)
                .bind(&asset.display_name)
                .bind(&asset.original_filename)
                .bind(asset.created_at)
                .bind(now)
                .fetch_one(&mut *tx)
                .await
                .map_err(|err| {
                    if is_unique_violation(&err) {
                        RepositoryError::Duplicate(asset.public_id.clone())
                    } else {
                        RepositoryError::Sqlx(err)
                    }
                })?;
            inserted.push(row);
        }

        tx.commit().await?;
        debug!(count = inserted.len(), "inserted asset batch");
        Ok(inserted)
    }

    async fn delete_by_id(&self, id: i64) -> RepositoryResult<AssetRecord> {
        sqlx::query_as::<_, AssetRecord>(&format!(
            "DELETE FROM assets WHERE id = ? RETURNING {ASSET_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(RepositoryError::NotFound(id))
    }

    async fn query(&self, query: &CatalogQuery) -> RepositoryResult<(Vec<AssetRecord>, i64)> {
        let pattern = query.search.as_deref().map(like_pattern);
        let mut tx = self.db.begin().await?;

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM assets");
        push_search(&mut count, pattern.as_deref());
        let total: i64 = count.build_query_scalar().fetch_one(&mut *tx).await?;

        let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {ASSET_COLUMNS} FROM assets"));
        push_search(&mut builder, pattern.as_deref());
        builder.push(format!(
            " ORDER BY {} {}, id ASC LIMIT ",
            query.sort_by.column(),
            query.sort_order.as_sql()
        ));
        builder.push_bind(i64::from(query.page_size));
        builder.push(" OFFSET ");
        builder.push_bind(query.offset());

        let rows: Vec<AssetRecord> = builder.build_query_as().fetch_all(&mut *tx).await?;
        tx.commit().await?;

        Ok((rows, total))
    }

    async fn get(&self, id: i64) -> RepositoryResult<AssetRecord> {
        sqlx::query_as::<_, AssetRecord>(&format!(
            "SELECT {ASSET_COLUMNS} FROM assets WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(RepositoryError::NotFound(id))
    }

    async fn update(&self, id: i64, update: AssetUpdate) -> RepositoryResult<AssetRecord> {
        sqlx::query_as::<_, AssetRecord>(&format!(
            "UPDATE assets SET
                title = COALESCE(?, title),
                title_folded = COALESCE(?, title_folded),
                alt = COALESCE(?, alt),
                alt_folded = COALESCE(?, alt_folded),
                display_name = COALESCE(?, display_name),
                updated_at = ?
             WHERE id = ?
             RETURNING {ASSET_COLUMNS}"
        ))
        .bind(update.title.clone())
        .bind(update.title.as_deref().map(fold))
        .bind(update.alt.clone())
        .bind(update.alt.as_deref().map(fold))
        .bind(update.display_name)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(RepositoryError::NotFound(id))
    }

    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        Ok(())
    }
}

/// Append the case-insensitive alt/title filter, if any. Matches against the
/// folded columns so non-ASCII text compares the same way on both sides.
fn push_search(builder: &mut QueryBuilder<'_, Sqlite>, pattern: Option<&str>) {
    if let Some(pattern) = pattern {
        builder.push(" WHERE (alt_folded LIKE ");
        builder.push_bind(pattern.to_string());
        builder.push(" ESCAPE '\\' OR title_folded LIKE ");
        builder.push_bind(pattern.to_string());
        builder.push(" ESCAPE '\\')");
    }
}

/// Case folding shared by stored search columns and search terms.
fn fold(text: &str) -> String {
    text.to_lowercase()
}

/// Build a `LIKE` substring pattern that matches `%`, `_` and `\` literally.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in fold(term).chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
