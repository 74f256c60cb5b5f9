//! Caller-side accumulation of catalog pages for infinite scrolling.
//!
//! The cache holds every record fetched for one filter/sort signature, in
//! arrival order. A first page starts over and later pages are appended with
//! duplicates dropped by public id. Requests for a new signature always start
//! at page 1 (`next_query`, `request_for`), so a later page carrying some
//! other signature is a late answer to an abandoned request and is dropped.

use crate::models::{
    asset::AssetRecord,
    catalog::{CatalogQuery, CatalogResponse, SortBy, SortOrder},
};
use std::collections::HashSet;
use tracing::debug;

/// Everything about a listing request except the page number.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CatalogSignature {
    pub search: Option<String>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    pub page_size: u32,
}

impl CatalogSignature {
    pub fn of(query: &CatalogQuery) -> Self {
        Self {
            search: query
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            sort_by: query.sort_by,
            sort_order: query.sort_order,
            page_size: query.page_size,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Previous contents were discarded.
    Reset,
    Appended { added: usize, duplicates: usize },
    /// The response belongs to a signature the cache has moved away from.
    Stale,
}

#[derive(Clone, Debug, Default)]
pub struct IncrementalCache {
    signature: Option<CatalogSignature>,
    items: Vec<AssetRecord>,
    seen: HashSet<String>,
    last_page: u32,
    total_items: i64,
    has_next_page: bool,
}

impl IncrementalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the response to `query` into the cache.
    pub fn apply(&mut self, query: &CatalogQuery, response: CatalogResponse) -> MergeOutcome {
        let signature = CatalogSignature::of(query);
        let page = response.pagination.page;

        if page > 1 {
            if let Some(current) = self.signature.as_ref().filter(|c| **c != signature) {
                debug!(page, ?signature, ?current, "dropping stale catalog page");
                return MergeOutcome::Stale;
            }
        }

        self.total_items = response.pagination.total_items;
        self.has_next_page = response.pagination.has_next_page;

        if page <= 1 || self.signature.is_none() {
            debug!(page, ?signature, "resetting catalog cache");
            self.signature = Some(signature);
            self.items.clear();
            self.seen.clear();
            for record in response.data {
                if self.seen.insert(record.public_id.clone()) {
                    self.items.push(record);
                }
            }
            self.last_page = page;
            return MergeOutcome::Reset;
        }

        let mut added = 0;
        let mut duplicates = 0;
        for record in response.data {
            if self.seen.insert(record.public_id.clone()) {
                self.items.push(record);
                added += 1;
            } else {
                duplicates += 1;
            }
        }
        self.last_page = self.last_page.max(page);
        MergeOutcome::Appended { added, duplicates }
    }

    /// The request that continues the current accumulation, or page 1 if
    /// `query` no longer matches it.
    pub fn next_query(&self, query: &CatalogQuery) -> CatalogQuery {
        let mut next = query.clone();
        next.page = if self.follows(query) {
            self.last_page + 1
        } else {
            1
        };
        next
    }

    /// `query` as it should be sent: unchanged under the current signature,
    /// moved to page 1 under any other.
    pub fn request_for(&self, query: &CatalogQuery) -> CatalogQuery {
        let mut request = query.clone();
        if !self.follows(query) {
            request.page = 1;
        }
        request
    }

    fn follows(&self, query: &CatalogQuery) -> bool {
        self.signature.as_ref() == Some(&CatalogSignature::of(query))
    }

    pub fn items(&self) -> &[AssetRecord] {
        &self.items
    }

    pub fn total_items(&self) -> i64 {
        self.total_items
    }

    pub fn has_next_page(&self) -> bool {
        self.has_next_page
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(n: i64, title: &str) -> AssetRecord {
        AssetRecord {
            id: n,
            title: title.to_string(),
            alt: title.to_string(),
            asset_id: format!("{n:032x}"),
            public_id: format!("media/{title}_{n}"),
            version_id: "1".into(),
            signature: "sig".into(),
            width: None,
            height: None,
            format: "png".into(),
            resource_type: "image".into(),
            bytes: 10,
            url: format!("memory://media/{title}_{n}"),
            secure_url: format!("memory://media/{title}_{n}"),
            asset_folder: "media".into(),
            display_name: title.to_string(),
            original_filename: title.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn page_of(query: &CatalogQuery, ids: std::ops::Range<i64>, title: &str, total: i64) -> CatalogResponse {
        let data = ids.map(|n| record(n, title)).collect();
        CatalogResponse::new(data, total, query.page, query.page_size)
    }

    #[test]
    fn appends_consecutive_pages() {
        let mut cache = IncrementalCache::new();
        let q1 = CatalogQuery::page(1, 20);
        assert_eq!(cache.apply(&q1, page_of(&q1, 0..20, "a", 45)), MergeOutcome::Reset);

        let q2 = cache.next_query(&q1);
        assert_eq!(q2.page, 2);
        assert_eq!(
            cache.apply(&q2, page_of(&q2, 20..40, "a", 45)),
            MergeOutcome::Appended { added: 20, duplicates: 0 }
        );
        assert_eq!(cache.len(), 40);
        assert_eq!(cache.total_items(), 45);
        assert!(cache.has_next_page());
        assert_eq!(cache.next_query(&q1).page, 3);
    }

    #[test]
    fn filter_change_replaces_contents() {
        let mut cache = IncrementalCache::new();
        let q1 = CatalogQuery::page(1, 20);
        cache.apply(&q1, page_of(&q1, 0..20, "a", 45));
        let q2 = cache.next_query(&q1);
        cache.apply(&q2, page_of(&q2, 20..40, "a", 45));
        assert_eq!(cache.len(), 40);

        let logo = CatalogQuery::page(1, 20).with_search("logo");
        assert_eq!(cache.next_query(&logo).page, 1);
        assert_eq!(cache.apply(&logo, page_of(&logo, 100..103, "logo", 3)), MergeOutcome::Reset);
        assert_eq!(cache.len(), 3);
        assert!(cache.items().iter().all(|r| r.title == "logo"));
        assert_eq!(cache.total_items(), 3);
        assert!(!cache.has_next_page());
    }

    #[test]
    fn late_page_from_abandoned_signature_is_dropped() {
        let mut cache = IncrementalCache::new();
        let browse = CatalogQuery::page(1, 20);
        cache.apply(&browse, page_of(&browse, 0..20, "a", 45));
        let browse_2 = cache.next_query(&browse);

        let logo = CatalogQuery::page(1, 20).with_search("logo");
        cache.apply(&logo, page_of(&logo, 100..103, "logo", 3));

        // the unfiltered page 2 was in flight when the search changed
        assert_eq!(
            cache.apply(&browse_2, page_of(&browse_2, 20..40, "a", 45)),
            MergeOutcome::Stale
        );
        assert_eq!(cache.len(), 3);
        assert!(cache.items().iter().all(|r| r.title == "logo"));
        assert_eq!(cache.total_items(), 3);
        assert!(!cache.has_next_page());
        assert_eq!(cache.next_query(&logo).page, 2);
    }

    #[test]
    fn later_page_into_empty_cache_starts_accumulation() {
        let mut cache = IncrementalCache::new();
        let q3 = CatalogQuery::page(3, 20);
        assert_eq!(cache.apply(&q3, page_of(&q3, 40..45, "a", 45)), MergeOutcome::Reset);
        assert_eq!(cache.len(), 5);
        assert_eq!(cache.next_query(&q3).page, 4);
    }

    #[test]
    fn request_for_new_signature_starts_at_page_one() {
        let mut cache = IncrementalCache::new();
        let q1 = CatalogQuery::page(1, 20);
        cache.apply(&q1, page_of(&q1, 0..20, "a", 45));

        let same = CatalogQuery::page(2, 20);
        assert_eq!(cache.request_for(&same).page, 2);

        let sorted = CatalogQuery::page(2, 20).sorted(SortBy::Title, SortOrder::Asc);
        let request = cache.request_for(&sorted);
        assert_eq!(request.page, 1);
        assert_eq!(request.sort_by, SortBy::Title);
    }

    #[test]
    fn repeated_page_is_idempotent() {
        let mut cache = IncrementalCache::new();
        let q1 = CatalogQuery::page(1, 20);
        cache.apply(&q1, page_of(&q1, 0..20, "a", 45));
        let q2 = CatalogQuery::page(2, 20);
        cache.apply(&q2, page_of(&q2, 20..40, "a", 45));

        assert_eq!(
            cache.apply(&q2, page_of(&q2, 20..40, "a", 45)),
            MergeOutcome::Appended { added: 0, duplicates: 20 }
        );
        assert_eq!(cache.len(), 40);
    }

    #[test]
    fn first_page_again_replaces() {
        let mut cache = IncrementalCache::new();
        let q1 = CatalogQuery::page(1, 20);
        cache.apply(&q1, page_of(&q1, 0..20, "a", 45));
        let q2 = CatalogQuery::page(2, 20);
        cache.apply(&q2, page_of(&q2, 20..40, "a", 45));

        assert_eq!(cache.apply(&q1, page_of(&q1, 0..20, "a", 45)), MergeOutcome::Reset);
        assert_eq!(cache.len(), 20);
        assert_eq!(cache.next_query(&q1).page, 2);
    }

    #[test]
    fn whitespace_in_search_does_not_change_signature() {
        let a = CatalogQuery::page(1, 20).with_search(" logo ");
        let b = CatalogQuery::page(3, 20).with_search("logo");
        assert_eq!(CatalogSignature::of(&a), CatalogSignature::of(&b));
        assert_ne!(
            CatalogSignature::of(&a),
            CatalogSignature::of(&CatalogQuery::page(1, 10).with_search("logo"))
        );
    }

    #[test]
    fn clear_forgets_everything() {
        let mut cache = IncrementalCache::new();
        let q1 = CatalogQuery::page(1, 20);
        cache.apply(&q1, page_of(&q1, 0..5, "a", 5));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_items(), 0);
        assert_eq!(cache.next_query(&q1).page, 1);
    }
}
