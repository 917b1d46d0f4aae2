use std::sync::Arc;

use time::Duration;
use tracing::{debug, info, warn};

use crate::api::{ApiError, EntriesApi};
use crate::cache::TtlCache;
use crate::geo::Coordinates;
use crate::query::{self, EntryFilters, SortBy};
use crate::time_utils::{system_clock, Clock};
use crate::types::Entry;

const ENTRIES_CACHE_KEY: &str = "entries";

/// Where a successful [`EntriesStore::fetch`] got its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Cache,
    Network,
}

/// Owns the fetched entry collection and the filter state, and derives the
/// map/list, recents and category views from them.
///
/// Mutation goes through `&mut self`, so two fetches can never interleave on
/// the same store.
pub struct EntriesStore<A> {
    api: Arc<A>,
    entries: Vec<Entry>,
    cache: TtlCache<Vec<Entry>>,
    filters: EntryFilters,
    is_loading: bool,
    error: Option<String>,
    update_key: u64,
    filters_revision: u64,
    clock: Clock,
}

impl<A: EntriesApi> EntriesStore<A> {
    pub fn new(api: Arc<A>, cache_ttl: Duration) -> Self {
        Self {
            api,
            entries: Vec::new(),
            cache: TtlCache::new(cache_ttl),
            filters: EntryFilters::default(),
            is_loading: false,
            error: None,
            update_key: 0,
            filters_revision: 0,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Load the collection, from the cache when it is still fresh and
    /// `force_refresh` is false, otherwise from the network. On failure the
    /// previous collection stays in place and `error` is set.
    pub async fn fetch(&mut self, force_refresh: bool) -> Result<FetchSource, ApiError> {
        let now = (self.clock)();
        let purged = self.cache.purge_expired_at(now);
        if purged > 0 {
            debug!(purged, "Purged expired cache entries");
        }

        if !force_refresh {
            if let Some(cached) = self.cache.get_at(ENTRIES_CACHE_KEY, now) {
                debug!(count = cached.len(), "Serving entries from cache");
                self.entries = cached;
                self.is_loading = false;
                self.error = None;
                self.update_key += 1;
                return Ok(FetchSource::Cache);
            }
        }

        self.is_loading = true;
        self.error = None;

        let result = self.api.list_entries().await;
        self.is_loading = false;

        match result {
            Ok(records) => {
                self.entries = records.into_iter().map(|record| record.into_entry()).collect();
                self.cache
                    .insert_at(ENTRIES_CACHE_KEY, self.entries.clone(), (self.clock)());
                self.update_key += 1;
                info!(count = self.entries.len(), "Fetched entries");
                Ok(FetchSource::Network)
            }
            Err(e) => {
                warn!(error = %e, kept = self.entries.len(), "Failed to fetch entries");
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub async fn force_refresh(&mut self) -> Result<FetchSource, ApiError> {
        self.fetch(true).await
    }

    /// Drop an entry locally after it has been deleted on the server. The
    /// cached copy is pruned too so a cache hit cannot resurrect it.
    pub fn remove_entry(&mut self, id: &str) {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.cache
            .update(ENTRIES_CACHE_KEY, |cached| cached.retain(|entry| entry.id != id));
        if self.entries.len() != before {
            self.update_key += 1;
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn filters(&self) -> &EntryFilters {
        &self.filters
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// True when what is on screen may be out of date: the last fetch failed
    /// or the cached collection has expired.
    pub fn is_stale(&self) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        self.error.is_some() || !self.cache.is_fresh_at(ENTRIES_CACHE_KEY, (self.clock)())
    }

    /// Changes whenever the collection or the filters change; use it as a memo
    /// key for derived views.
    pub fn revision(&self) -> (u64, u64) {
        (self.update_key, self.filters_revision)
    }

    pub fn update_key(&self) -> u64 {
        self.update_key
    }

    pub fn filtered_entries(&self, user_id: Option<&str>) -> Vec<Entry> {
        query::filter_entries(&self.entries, &self.filters, user_id, (self.clock)())
    }

    pub fn recently_added(&self) -> Vec<Entry> {
        self.recently_added_by_category(query::ALL_CATEGORIES)
    }

    pub fn recently_added_by_category(&self, category: &str) -> Vec<Entry> {
        query::recently_added_by_category(&self.entries, category)
    }

    pub fn entries_by_category(&self, category: &str) -> Vec<Entry> {
        query::entries_by_category(&self.entries, category)
    }

    pub fn my_entries(&self, user_id: Option<&str>) -> Vec<Entry> {
        let Some(user_id) = user_id else {
            return vec![];
        };
        self.entries
            .iter()
            .filter(|entry| entry.is_owned_by(user_id))
            .cloned()
            .collect()
    }

    pub fn my_favourites(&self, favourites: &[String]) -> Vec<Entry> {
        self.entries
            .iter()
            .filter(|entry| favourites.contains(&entry.id))
            .cloned()
            .collect()
    }

    pub fn all_categories(&self) -> Vec<String> {
        query::all_categories(&self.entries)
    }

    pub fn active_filter_count(&self) -> usize {
        self.filters.active_count()
    }

    fn update_filters(&mut self, f: impl FnOnce(&mut EntryFilters)) {
        f(&mut self.filters);
        self.filters_revision += 1;
    }

    pub fn set_search_query(&mut self, query: impl Into<String>) {
        let query = query.into();
        self.update_filters(|filters| filters.search_query = query);
    }

    pub fn toggle_only_show_my_entries(&mut self) {
        self.update_filters(|filters| filters.only_mine = !filters.only_mine);
    }

    pub fn set_category_filter(&mut self, category: Option<String>) {
        self.update_filters(|filters| filters.category = category);
    }

    pub fn set_added_within_days(&mut self, days: Option<u32>) {
        self.update_filters(|filters| filters.added_within_days = days);
    }

    pub fn toggle_tag_filter(&mut self, tag: &str) {
        self.update_filters(|filters| {
            if let Some(index) = filters.tags.iter().position(|t| t == tag) {
                filters.tags.remove(index);
            } else {
                filters.tags.push(tag.to_string());
            }
        });
    }

    pub fn set_sort_by(&mut self, sort_by: SortBy) {
        self.update_filters(|filters| filters.sort_by = sort_by);
    }

    pub fn set_current_location(&mut self, location: Option<Coordinates>) {
        self.update_filters(|filters| filters.current_location = location);
    }

    /// Reset search and filters; sort goes back to distance. The reference
    /// location is kept.
    pub fn clear_filters(&mut self) {
        self.update_filters(|filters| {
            *filters = EntryFilters {
                current_location: filters.current_location,
                ..Default::default()
            }
        });
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.is_loading = false;
        self.error = None;
        self.update_key = 0;
        self.clear_filters();
        self.clear_cache();
    }
}
