//! Derived views over the entry collection: filtering, duplicate collapsing,
//! distance annotation and sorting. Everything here is pure; the store owns
//! the data and passes it in.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::geo::{haversine_km, round_coordinate, Coordinates};
use crate::types::Entry;

/// Category value that disables category filtering in the recents panel.
pub const ALL_CATEGORIES: &str = "all";
pub const RECENT_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    Name,
    #[default]
    Distance,
    Date,
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "distance" => Ok(Self::Distance),
            "date" => Ok(Self::Date),
            other => Err(format!("unknown sort order: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryFilters {
    pub search_query: String,
    pub only_mine: bool,
    pub category: Option<String>,
    pub added_within_days: Option<u32>,
    /// An entry must carry every listed tag
    pub tags: Vec<String>,
    pub sort_by: SortBy,
    pub current_location: Option<Coordinates>,
}

impl EntryFilters {
    /// Number of narrowing filters in effect; search and sort don't count.
    pub fn active_count(&self) -> usize {
        [
            self.only_mine,
            self.category.is_some(),
            self.added_within_days.is_some_and(|days| days > 0),
            !self.tags.is_empty(),
        ]
        .into_iter()
        .filter(|active| *active)
        .count()
    }
}

/// The map/list view: filter, collapse duplicates, annotate distance, sort.
pub fn filter_entries(
    entries: &[Entry],
    filters: &EntryFilters,
    user_id: Option<&str>,
    now: OffsetDateTime,
) -> Vec<Entry> {
    let query = filters.search_query.to_lowercase();
    let cutoff = filters
        .added_within_days
        .filter(|days| *days > 0)
        .map(|days| now - Duration::days(i64::from(days)));

    let filtered = entries
        .iter()
        .filter(|entry| query.is_empty() || matches_search(entry, &query))
        .filter(|entry| match (filters.only_mine, user_id) {
            (true, Some(user_id)) => entry.is_owned_by(user_id),
            _ => true,
        })
        .filter(|entry| {
            filters
                .category
                .as_deref()
                .map_or(true, |category| entry.category == category)
        })
        .filter(|entry| filters.tags.iter().all(|tag| entry.tags.contains(tag)))
        .filter(|entry| match cutoff {
            Some(cutoff) => entry.created_at.is_some_and(|created| created >= cutoff),
            None => true,
        })
        .filter(|entry| entry.has_valid_location())
        .cloned()
        .collect();

    let mut result = deduplicate(filtered);

    if let Some(origin) = filters.current_location {
        for entry in &mut result {
            entry.distance = entry.coordinates().map(|point| haversine_km(origin, point));
        }
    }

    sort_entries(&mut result, filters.sort_by, filters.current_location.is_some());
    result
}

fn matches_search(entry: &Entry, lowercase_query: &str) -> bool {
    entry.name.to_lowercase().contains(lowercase_query)
        || entry
            .description
            .as_deref()
            .is_some_and(|description| description.to_lowercase().contains(lowercase_query))
}

/// Stable sort. Distance order needs a reference location; without one the
/// input order is kept.
pub fn sort_entries(entries: &mut [Entry], sort_by: SortBy, has_location: bool) {
    match sort_by {
        SortBy::Distance if has_location => entries.sort_by(|a, b| {
            a.distance
                .unwrap_or(0.0)
                .total_cmp(&b.distance.unwrap_or(0.0))
        }),
        SortBy::Distance => {}
        SortBy::Date => entries.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortBy::Name => entries.sort_by(|a, b| locale_cmp(&a.name, &b.name)),
    }
}

/// Case-insensitive ordering with lowercase before uppercase on ties, the way
/// a UI collator orders names.
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| b.cmp(a))
}

/// Heuristic for how much information an entry carries.
pub fn completeness_score(entry: &Entry) -> u32 {
    let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());

    let mut score = 0;
    if !entry.name.is_empty() {
        score += 1;
    }
    if !entry.category.is_empty() {
        score += 1;
    }
    if present(&entry.description) {
        score += 1;
    }
    if present(&entry.address) {
        score += 1;
    }
    if entry.has_valid_location() {
        score += 1;
    }
    if !entry.media.is_empty() {
        score += 1;
    }
    if entry.created_at.is_some() {
        score += 1;
    }
    if entry.external_place_id().is_some() {
        score += 2;
    }
    score
}

/// Whether `candidate` should take the place of `existing` when both describe
/// the same place.
pub fn should_replace(existing: &Entry, candidate: &Entry) -> bool {
    match (
        existing.external_place_id().is_some(),
        candidate.external_place_id().is_some(),
    ) {
        (false, true) => return true,
        (true, false) => return false,
        _ => {}
    }

    let existing_score = i64::from(completeness_score(existing));
    let candidate_score = i64::from(completeness_score(candidate));

    if candidate_score > existing_score + 2 {
        return true;
    }
    if (candidate_score - existing_score).abs() <= 2 {
        return candidate.created_at > existing.created_at;
    }
    false
}

pub fn location_key(point: Coordinates) -> String {
    format!(
        "location_{},{}",
        round_coordinate(point.lat),
        round_coordinate(point.lng)
    )
}

/// The primary identity of an entry: its external place when it has one,
/// otherwise its rounded coordinates.
pub fn dedup_key(entry: &Entry) -> Option<String> {
    match entry.external_place_id() {
        Some(place_id) => Some(format!("place_{place_id}")),
        None => entry.coordinates().map(location_key),
    }
}

/// Every key under which `entry` can collide with another entry, primary first.
fn collision_keys(entry: &Entry) -> Vec<String> {
    let mut keys = Vec::with_capacity(2);
    if let Some(place_id) = entry.external_place_id() {
        keys.push(format!("place_{place_id}"));
    }
    if let Some(point) = entry.coordinates() {
        keys.push(location_key(point));
    }
    keys
}

/// Collapse entries that describe the same physical place: same external place
/// id, or same coordinates at 6 decimal places. Sharing is transitive, so an
/// entry that links two groups merges them.
///
/// The survivor of a group does not depend on input order: members are
/// compared oldest first (id breaks ties) and each one that
/// [`should_replace`]s the current survivor takes over. Groups come out in the
/// order their first member was seen.
pub fn deduplicate(entries: Vec<Entry>) -> Vec<Entry> {
    let mut groups = DisjointSet::new(entries.len());
    let mut key_owners: HashMap<String, usize> = HashMap::new();
    for (index, entry) in entries.iter().enumerate() {
        for key in collision_keys(entry) {
            match key_owners.get(&key) {
                Some(&owner) => groups.union(owner, index),
                None => {
                    key_owners.insert(key, index);
                }
            }
        }
    }

    // Members are pushed in input order, so members[0] is the first seen.
    let mut members: HashMap<usize, Vec<usize>> = HashMap::new();
    for index in 0..entries.len() {
        members.entry(groups.find(index)).or_default().push(index);
    }

    let mut survivors: Vec<(usize, usize)> = members
        .into_values()
        .map(|mut group| {
            let first_seen = group[0];
            group.sort_by(|&a, &b| {
                entries[a]
                    .created_at
                    .cmp(&entries[b].created_at)
                    .then_with(|| entries[a].id.cmp(&entries[b].id))
            });
            let survivor = group
                .into_iter()
                .reduce(|kept, candidate| {
                    if should_replace(&entries[kept], &entries[candidate]) {
                        candidate
                    } else {
                        kept
                    }
                })
                .unwrap_or(first_seen);
            (first_seen, survivor)
        })
        .collect();
    survivors.sort_unstable_by_key(|&(first_seen, _)| first_seen);

    let mut slots: Vec<Option<Entry>> = entries.into_iter().map(Some).collect();
    survivors
        .into_iter()
        .filter_map(|(_, survivor)| slots[survivor].take())
        .collect()
}

/// Union-find over entry indices.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut index: usize) -> usize {
        while self.parent[index] != index {
            self.parent[index] = self.parent[self.parent[index]];
            index = self.parent[index];
        }
        index
    }

    fn union(&mut self, a: usize, b: usize) {
        let (root_a, root_b) = (self.find(a), self.find(b));
        if root_a != root_b {
            self.parent[root_b.max(root_a)] = root_a.min(root_b);
        }
    }
}

/// The recents panel: newest first, capped at [`RECENT_LIMIT`]. Entries without
/// a creation time are left out.
pub fn recently_added_by_category(entries: &[Entry], category: &str) -> Vec<Entry> {
    let mut recent: Vec<Entry> = entries_by_category(entries, category)
        .into_iter()
        .filter(|entry| entry.created_at.is_some())
        .collect();
    recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    recent.truncate(RECENT_LIMIT);
    recent
}

pub fn entries_by_category(entries: &[Entry], category: &str) -> Vec<Entry> {
    entries
        .iter()
        .filter(|entry| category == ALL_CATEGORIES || entry.category == category)
        .cloned()
        .collect()
}

pub fn all_categories(entries: &[Entry]) -> Vec<String> {
    entries
        .iter()
        .filter(|entry| !entry.category.is_empty())
        .map(|entry| entry.category.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-06-15 12:00 UTC);

    fn entry(id: &str, name: &str, lat: f64, lng: f64) -> Entry {
        Entry {
            id: id.to_string(),
            name: name.to_string(),
            category: "food".to_string(),
            lat: Some(lat),
            lng: Some(lng),
            description: None,
            address: None,
            created_at: None,
            updated_at: None,
            user_id: None,
            google_place_id: None,
            is_draft: false,
            media: vec![],
            tags: vec![],
            rating: None,
            review: None,
            distance: None,
        }
    }

    fn ids(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.id.as_str()).collect()
    }

    fn by_name() -> EntryFilters {
        EntryFilters {
            sort_by: SortBy::Name,
            ..Default::default()
        }
    }

    #[test]
    fn search_matches_name_case_insensitively() {
        let entries = vec![
            entry("1", "Corner Cafe", 1.0, 1.0),
            entry("2", "Museum", 2.0, 2.0),
        ];
        let filters = EntryFilters {
            search_query: "cafe".to_string(),
            ..by_name()
        };

        assert_eq!(ids(&filter_entries(&entries, &filters, None, NOW)), ["1"]);
    }

    #[test]
    fn search_matches_description() {
        let mut museum = entry("2", "Museum", 2.0, 2.0);
        museum.description = Some("Has a nice CAFE upstairs".to_string());
        let entries = vec![entry("1", "Park", 1.0, 1.0), museum];
        let filters = EntryFilters {
            search_query: "cafe".to_string(),
            ..by_name()
        };

        assert_eq!(ids(&filter_entries(&entries, &filters, None, NOW)), ["2"]);
    }

    #[test]
    fn owner_filter_needs_a_user() {
        let mut mine = entry("1", "Mine", 1.0, 1.0);
        mine.user_id = Some("u1".to_string());
        let mut theirs = entry("2", "Theirs", 2.0, 2.0);
        theirs.user_id = Some("u2".to_string());
        let entries = vec![mine, theirs];
        let filters = EntryFilters {
            only_mine: true,
            ..by_name()
        };

        assert_eq!(
            ids(&filter_entries(&entries, &filters, Some("u1"), NOW)),
            ["1"]
        );
        assert_eq!(filter_entries(&entries, &filters, None, NOW).len(), 2);
    }

    #[test]
    fn category_and_tag_filters() {
        let mut cafe = entry("1", "Cafe", 1.0, 1.0);
        cafe.tags = vec!["wifi".to_string(), "quiet".to_string()];
        let mut museum = entry("2", "Museum", 2.0, 2.0);
        museum.category = "culture".to_string();
        museum.tags = vec!["wifi".to_string()];
        let entries = vec![cafe, museum];

        let by_category = EntryFilters {
            category: Some("culture".to_string()),
            ..by_name()
        };
        assert_eq!(
            ids(&filter_entries(&entries, &by_category, None, NOW)),
            ["2"]
        );

        let by_tags = EntryFilters {
            tags: vec!["wifi".to_string(), "quiet".to_string()],
            ..by_name()
        };
        assert_eq!(ids(&filter_entries(&entries, &by_tags, None, NOW)), ["1"]);
    }

    #[test]
    fn recency_filter_drops_old_and_undated() {
        let mut fresh = entry("1", "Fresh", 1.0, 1.0);
        fresh.created_at = Some(NOW - Duration::days(2));
        let mut stale = entry("2", "Stale", 2.0, 2.0);
        stale.created_at = Some(NOW - Duration::days(40));
        let undated = entry("3", "Undated", 3.0, 3.0);
        let entries = vec![fresh, stale, undated];
        let filters = EntryFilters {
            added_within_days: Some(7),
            ..by_name()
        };

        assert_eq!(ids(&filter_entries(&entries, &filters, None, NOW)), ["1"]);
    }

    #[test]
    fn entries_without_geometry_never_appear() {
        let mut no_lat = entry("1", "No lat", 0.0, 1.0);
        no_lat.lat = None;
        let mut no_lng = entry("2", "No lng", 1.0, 0.0);
        no_lng.lng = None;
        let mut nan = entry("3", "NaN", 1.0, 1.0);
        nan.lat = Some(f64::NAN);
        let entries = vec![no_lat, no_lng, nan, entry("4", "Ok", 0.0, 0.0)];

        let filters = EntryFilters {
            current_location: Some(Coordinates::new(0.0, 0.0)),
            ..Default::default()
        };
        assert_eq!(ids(&filter_entries(&entries, &filters, None, NOW)), ["4"]);
        assert_eq!(
            ids(&filter_entries(&entries, &by_name(), None, NOW)),
            ["4"]
        );
    }

    #[test]
    fn distance_sort_is_monotonic() {
        let entries = vec![
            entry("far", "Far", 48.8566, 2.3522),
            entry("near", "Near", 51.51, -0.13),
            entry("mid", "Mid", 52.4862, -1.8904),
        ];
        let filters = EntryFilters {
            sort_by: SortBy::Distance,
            current_location: Some(Coordinates::new(51.5074, -0.1278)),
            ..Default::default()
        };

        let sorted = filter_entries(&entries, &filters, None, NOW);
        assert_eq!(ids(&sorted), ["near", "mid", "far"]);
        let distances: Vec<f64> = sorted.iter().map(|e| e.distance.unwrap()).collect();
        assert!(distances.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn distance_sort_without_location_keeps_order() {
        let entries = vec![entry("b", "B", 1.0, 1.0), entry("a", "A", 2.0, 2.0)];
        let sorted = filter_entries(&entries, &EntryFilters::default(), None, NOW);
        assert_eq!(ids(&sorted), ["b", "a"]);
        assert!(sorted.iter().all(|e| e.distance.is_none()));
    }

    #[test]
    fn date_sort_is_newest_first_with_undated_last() {
        let mut old = entry("old", "Old", 1.0, 1.0);
        old.created_at = Some(datetime!(2024-01-01 0:00 UTC));
        let mut new = entry("new", "New", 2.0, 2.0);
        new.created_at = Some(datetime!(2024-06-01 0:00 UTC));
        let undated = entry("undated", "Undated", 3.0, 3.0);
        let filters = EntryFilters {
            sort_by: SortBy::Date,
            ..Default::default()
        };

        let sorted = filter_entries(&[undated, old, new], &filters, None, NOW);
        assert_eq!(ids(&sorted), ["new", "old", "undated"]);
    }

    #[test]
    fn name_sort_ignores_case() {
        let entries = vec![
            entry("1", "banana", 1.0, 1.0),
            entry("2", "Apple", 2.0, 2.0),
            entry("3", "apple", 3.0, 3.0),
        ];
        let sorted = filter_entries(&entries, &by_name(), None, NOW);
        assert_eq!(ids(&sorted), ["3", "2", "1"]);
    }

    #[test]
    fn place_id_entry_beats_location_duplicate() {
        let mut first = entry("1", "Cafe", 51.5007, -0.1246);
        first.google_place_id = Some("g1".to_string());
        first.created_at = Some(datetime!(2024-01-01 0:00 UTC));
        let mut second = entry("2", "Cafe Updated", 51.500700, -0.124600);
        second.created_at = Some(datetime!(2024-06-01 0:00 UTC));

        let deduped = deduplicate(vec![first.clone(), second.clone()]);
        assert_eq!(deduped, vec![first.clone()]);

        let swapped = deduplicate(vec![second, first.clone()]);
        assert_eq!(swapped, vec![first]);
    }

    #[test]
    fn shared_place_id_collapses_distant_pins() {
        let mut a = entry("a", "Cafe", 1.0, 1.0);
        a.google_place_id = Some("g1".to_string());
        a.created_at = Some(datetime!(2024-01-01 0:00 UTC));
        let mut b = entry("b", "Cafe", 1.1, 1.1);
        b.google_place_id = Some("g1".to_string());
        b.created_at = Some(datetime!(2024-02-01 0:00 UTC));

        assert_eq!(ids(&deduplicate(vec![a.clone(), b.clone()])), ["b"]);
        assert_eq!(ids(&deduplicate(vec![b, a])), ["b"]);
    }

    #[test]
    fn much_more_complete_entry_wins_regardless_of_date() {
        let mut sparse = entry("sparse", "Spot", 1.0, 1.0);
        sparse.category = String::new();
        sparse.created_at = Some(datetime!(2024-06-01 0:00 UTC));
        let mut rich = entry("rich", "Spot", 1.0, 1.0);
        rich.description = Some("desc".to_string());
        rich.address = Some("1 High St".to_string());
        rich.media = vec!["img".to_string()];
        rich.created_at = Some(datetime!(2024-01-01 0:00 UTC));

        assert_eq!(completeness_score(&sparse), 3);
        assert_eq!(completeness_score(&rich), 7);
        assert_eq!(ids(&deduplicate(vec![sparse.clone(), rich.clone()])), ["rich"]);
        assert_eq!(ids(&deduplicate(vec![rich, sparse])), ["rich"]);
    }

    #[test]
    fn close_scores_prefer_newer_entry() {
        let mut older = entry("older", "Spot", 1.0, 1.0);
        older.created_at = Some(datetime!(2024-01-01 0:00 UTC));
        let mut newer = entry("newer", "Spot", 1.0000001, 1.0);
        newer.created_at = Some(datetime!(2024-03-01 0:00 UTC));

        assert_eq!(
            ids(&deduplicate(vec![older.clone(), newer.clone()])),
            ["newer"]
        );
        assert_eq!(ids(&deduplicate(vec![newer, older])), ["newer"]);
    }

    #[test]
    fn dedup_keeps_first_seen_order() {
        let a = entry("a", "A", 1.0, 1.0);
        let mut a_newer = entry("a2", "A", 1.0, 1.0);
        a_newer.created_at = Some(datetime!(2024-03-01 0:00 UTC));
        let b = entry("b", "B", 2.0, 2.0);

        assert_eq!(ids(&deduplicate(vec![a, b, a_newer])), ["a2", "b"]);
    }

    #[test]
    fn bridging_entry_merges_groups_in_any_order() {
        let mut pin = entry("A", "Cafe", 1.0, 1.0);
        pin.created_at = Some(datetime!(2024-01-01 0:00 UTC));
        let mut place = entry("B", "Cafe", 2.0, 2.0);
        place.google_place_id = Some("g1".to_string());
        place.created_at = Some(datetime!(2024-02-01 0:00 UTC));
        let mut bridge = entry("C", "Cafe", 1.0, 1.0);
        bridge.google_place_id = Some("g1".to_string());
        bridge.created_at = Some(datetime!(2024-06-01 0:00 UTC));

        let orders = [
            vec![pin.clone(), place.clone(), bridge.clone()],
            vec![bridge.clone(), pin.clone(), place.clone()],
            vec![place.clone(), bridge.clone(), pin.clone()],
            vec![pin, bridge, place],
        ];
        for order in orders {
            assert_eq!(ids(&deduplicate(order)), ["C"]);
        }
    }

    #[test]
    fn same_location_never_appears_twice() {
        let mut a = entry("a", "Spot", 3.0, 3.0);
        a.created_at = Some(datetime!(2024-01-01 0:00 UTC));
        let mut b = entry("b", "Spot", 4.0, 4.0);
        b.google_place_id = Some("g2".to_string());
        let mut c = entry("c", "Spot", 3.0, 3.0);
        c.google_place_id = Some("g2".to_string());
        let d = entry("d", "Other", 5.0, 5.0);

        let deduped = deduplicate(vec![a, d, b, c]);
        let keys: BTreeSet<String> = deduped
            .iter()
            .filter_map(|e| e.coordinates().map(location_key))
            .collect();
        assert_eq!(keys.len(), deduped.len());
        assert_eq!(ids(&deduped).len(), 2);
        assert_eq!(ids(&deduped)[1], "d");
    }

    #[test]
    fn dedup_keys() {
        let mut with_place = entry("1", "A", 51.5007, -0.1246);
        assert_eq!(
            dedup_key(&with_place).as_deref(),
            Some("location_51.5007,-0.1246")
        );
        with_place.google_place_id = Some("g1".to_string());
        assert_eq!(dedup_key(&with_place).as_deref(), Some("place_g1"));
    }

    #[test]
    fn recents_are_capped_and_newest_first() {
        let mut entries: Vec<Entry> = (1..=7)
            .map(|day| {
                let mut e = entry(&day.to_string(), "E", day as f64, 0.0);
                e.created_at = Some(datetime!(2024-06-01 0:00 UTC) + Duration::days(day));
                e
            })
            .collect();
        entries[0].category = "culture".to_string();
        entries.push(entry("undated", "U", 9.0, 9.0));

        let recent = recently_added_by_category(&entries, ALL_CATEGORIES);
        assert_eq!(ids(&recent), ["7", "6", "5", "4", "3"]);

        let culture = recently_added_by_category(&entries, "culture");
        assert_eq!(ids(&culture), ["1"]);
    }

    #[test]
    fn categories_are_unique_and_sorted() {
        let mut museum = entry("2", "Museum", 2.0, 2.0);
        museum.category = "culture".to_string();
        let entries = vec![entry("1", "A", 1.0, 1.0), museum, entry("3", "B", 3.0, 3.0)];
        assert_eq!(all_categories(&entries), ["culture", "food"]);
    }

    #[test]
    fn active_filter_count_ignores_search_and_sort() {
        let filters = EntryFilters {
            search_query: "x".to_string(),
            only_mine: true,
            added_within_days: Some(0),
            tags: vec!["wifi".to_string()],
            sort_by: SortBy::Date,
            ..Default::default()
        };
        assert_eq!(filters.active_count(), 2);
    }

    #[test]
    fn sort_by_parses() {
        assert_eq!("Distance".parse::<SortBy>(), Ok(SortBy::Distance));
        assert!("rating".parse::<SortBy>().is_err());
    }
}
