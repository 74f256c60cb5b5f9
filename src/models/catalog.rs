//! Catalog listing parameters and the page-shaped response.

use crate::{errors::LibraryError, models::asset::AssetRecord};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Column a catalog listing is ordered by.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SortBy {
    #[serde(rename = "id")]
    Id,
    #[serde(rename = "filename", alias = "title")]
    Title,
    #[serde(rename = "fileSize")]
    FileSize,
    #[default]
    #[serde(rename = "createdAt")]
    CreatedAt,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::Id => "id",
            SortBy::Title => "filename",
            SortBy::FileSize => "fileSize",
            SortBy::CreatedAt => "createdAt",
        }
    }

    /// SQL column backing this sort key.
    pub fn column(&self) -> &'static str {
        match self {
            SortBy::Id => "id",
            SortBy::Title => "title COLLATE NOCASE",
            SortBy::FileSize => "bytes",
            SortBy::CreatedAt => "created_at",
        }
    }
}

impl FromStr for SortBy {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(SortBy::Id),
            "filename" | "title" => Ok(SortBy::Title),
            "fileSize" => Ok(SortBy::FileSize),
            "createdAt" => Ok(SortBy::CreatedAt),
            other => Err(LibraryError::Validation(format!(
                "unsupported sortBy `{other}` (expected id, filename, fileSize or createdAt)"
            ))),
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(SortOrder::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(SortOrder::Desc)
        } else {
            Err(LibraryError::Validation(format!(
                "unsupported sortOrder `{s}` (expected asc or desc)"
            )))
        }
    }
}

/// A validated catalog request: filter, sort and 1-indexed page.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    pub page: u32,
    pub page_size: u32,
}

impl Default for CatalogQuery {
    fn default() -> Self {
        Self {
            search: None,
            sort_by: SortBy::default(),
            sort_order: SortOrder::default(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl CatalogQuery {
    pub fn page(page: u32, page_size: u32) -> Self {
        Self {
            page,
            page_size,
            ..Self::default()
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn sorted(mut self, sort_by: SortBy, sort_order: SortOrder) -> Self {
        self.sort_by = sort_by;
        self.sort_order = sort_order;
        self
    }

    /// Check paging bounds, trim the search term and clamp the page size.
    ///
    /// An empty search term means "no filter".
    pub fn normalized(mut self) -> Result<Self, LibraryError> {
        if self.page < 1 {
            return Err(LibraryError::Validation("page must be at least 1".into()));
        }
        if self.page_size < 1 {
            return Err(LibraryError::Validation(
                "pageSize must be at least 1".into(),
            ));
        }
        self.page_size = self.page_size.min(MAX_PAGE_SIZE);
        self.search = self
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Ok(self)
    }

    /// Rows to skip before this page starts.
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.page_size)
    }

    /// Build a query from raw request parameters.
    pub fn from_params(params: CatalogParams) -> Result<Self, LibraryError> {
        let sort_by = match params.sort_by.as_deref() {
            Some(raw) if !raw.is_empty() => raw.parse()?,
            _ => SortBy::default(),
        };
        let sort_order = match params.sort_order.as_deref() {
            Some(raw) if !raw.is_empty() => raw.parse()?,
            _ => SortOrder::default(),
        };
        let page = parse_positive("page", params.page.as_deref())?.unwrap_or(1);
        let page_size =
            parse_positive("pageSize", params.page_size.as_deref())?.unwrap_or(DEFAULT_PAGE_SIZE);

        Self {
            search: params.search,
            sort_by,
            sort_order,
            page,
            page_size,
        }
        .normalized()
    }
}

fn parse_positive(name: &str, raw: Option<&str>) -> Result<Option<u32>, LibraryError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    match raw.parse::<u32>() {
        Ok(value) if value >= 1 => Ok(Some(value)),
        _ => Err(LibraryError::Validation(format!(
            "{name} must be a positive integer, got `{raw}`"
        ))),
    }
}

/// Unvalidated listing parameters as they arrive on the query string.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CatalogParams {
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<String>,
    #[serde(alias = "limit")]
    pub page_size: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total_items: i64,
    pub has_next_page: bool,
}

/// One page of the catalog.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CatalogResponse {
    pub data: Vec<AssetRecord>,
    pub pagination: Pagination,
}

impl CatalogResponse {
    pub fn new(data: Vec<AssetRecord>, total_items: i64, page: u32, page_size: u32) -> Self {
        let has_next_page = i64::from(page) * i64::from(page_size) < total_items;
        Self {
            data,
            pagination: Pagination {
                page,
                page_size,
                total_items,
                has_next_page,
            },
        }
    }
}
