//! Represents a media asset: the descriptor the remote store hands back after
//! an upload, and the durable metadata row we keep for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A persisted asset row.
///
/// Identity fields (`id`, `asset_id`, `public_id`, `version_id`, `signature`)
/// are written once at ingestion and never changed. Only `title`, `alt` and
/// `display_name` may be updated afterwards.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    /// Store-assigned, monotonic internal id.
    pub id: i64,

    /// Human label derived from the public id.
    pub title: String,

    /// Alternative text; may be empty.
    pub alt: String,

    /// Canonical asset id issued by the remote store.
    pub asset_id: String,

    /// Stable remote key, used for URLs and as the deletion key.
    pub public_id: String,

    pub version_id: String,

    /// Integrity signature reported by the remote store.
    pub signature: String,

    pub width: Option<i64>,
    pub height: Option<i64>,

    /// Short format string, e.g. `png`.
    pub format: String,

    /// Resource kind, e.g. `image` or `raw`.
    pub resource_type: String,

    /// Payload size in bytes.
    pub bytes: i64,

    pub url: String,
    pub secure_url: String,

    /// Logical folder the object was uploaded into.
    pub asset_folder: String,

    pub display_name: String,
    pub original_filename: String,

    /// Remote-side creation time.
    pub created_at: DateTime<Utc>,

    /// Refreshed on every mutation of the row.
    pub updated_at: DateTime<Utc>,
}

/// The canonical descriptor returned by the object store on a successful
/// upload. Field names follow the provider's snake_case wire format.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AssetDescriptor {
    pub asset_id: String,
    pub public_id: String,
    pub version_id: String,
    pub signature: String,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub format: String,
    pub resource_type: String,
    #[serde(default)]
    pub bytes: i64,
    pub url: String,
    pub secure_url: String,
    pub asset_folder: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub original_filename: String,
    pub created_at: DateTime<Utc>,
}

/// An asset ready to be inserted; everything but the store-assigned fields.
#[derive(Clone, Debug, PartialEq)]
pub struct NewAsset {
    pub title: String,
    pub alt: String,
    pub asset_id: String,
    pub public_id: String,
    pub version_id: String,
    pub signature: String,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub format: String,
    pub resource_type: String,
    pub bytes: i64,
    pub url: String,
    pub secure_url: String,
    pub asset_folder: String,
    pub display_name: String,
    pub original_filename: String,
    pub created_at: DateTime<Utc>,
}

impl NewAsset {
    /// Map a remote descriptor plus its alt text into the stored shape.
    ///
    /// Pure: no I/O, no clock. The title is the public id segment that
    /// follows the asset folder.
    pub fn from_descriptor(descriptor: AssetDescriptor, alt: String) -> Self {
        let title = title_from_public_id(&descriptor.public_id, &descriptor.asset_folder);
        let display_name = descriptor
            .display_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| descriptor.original_filename.clone());

        Self {
            title,
            alt,
            asset_id: descriptor.asset_id,
            public_id: descriptor.public_id,
            version_id: descriptor.version_id,
            signature: descriptor.signature,
            width: descriptor.width,
            height: descriptor.height,
            format: descriptor.format,
            resource_type: descriptor.resource_type,
            bytes: descriptor.bytes,
            url: descriptor.url,
            secure_url: descriptor.secure_url,
            asset_folder: descriptor.asset_folder,
            display_name,
            original_filename: descriptor.original_filename,
            created_at: descriptor.created_at,
        }
    }
}

/// Descriptive fields that may change after ingestion.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetUpdate {
    pub title: Option<String>,
    pub alt: Option<String>,
    pub display_name: Option<String>,
}

impl AssetUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.alt.is_none() && self.display_name.is_none()
    }
}

/// Derive a human label from a public id.
///
/// `media/sunset_x1y2` uploaded into `media` yields `sunset_x1y2`. Public ids
/// outside the folder fall back to their last path segment.
pub fn title_from_public_id(public_id: &str, folder: &str) -> String {
    let folder = folder.trim_matches('/');
    if !folder.is_empty() {
        if let Some(rest) = public_id
            .strip_prefix(folder)
            .and_then(|rest| rest.strip_prefix('/'))
        {
            if let Some(segment) = rest.split('/').find(|s| !s.is_empty()) {
                return segment.to_string();
            }
        }
    }
    public_id
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or(public_id)
        .to_string()
}

/// Strip the final extension from a filename: `logo.final.png` -> `logo.final`.
///
/// Any client-side directory prefix is dropped first. Dotfiles and names
/// without an extension are returned unchanged.
pub fn alt_from_filename(filename: &str) -> String {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name.to_string(),
    }
}

/// Use the declared alt text when it carries anything, otherwise derive it
/// from the filename.
pub fn normalize_alt(declared: Option<&str>, filename: &str) -> String {
    match declared.map(str::trim) {
        Some(alt) if !alt.is_empty() => alt.to_string(),
        _ => alt_from_filename(filename),
    }
}
