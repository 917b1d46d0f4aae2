use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use super::dto::{EntryRecord, TokenResponse};
use super::error::{ApiError, Result};
use super::EntriesApi;
use crate::geo::{haversine_km, Coordinates};
use crate::types::{PlaceSuggestion, SubmissionPayload, User};

const DEV_USER_ID: &str = "1";

/// In-memory stand-in for the backend, used by `itg --dev`.
#[derive(Debug, Clone)]
pub struct DevBackend {
    store: Arc<Mutex<Vec<EntryRecord>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for DevBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DevBackend {
    pub fn new() -> Self {
        let seeded = seed_dev_entries();
        let next_id = seeded.len() as u64 + 1;
        Self {
            store: Arc::new(Mutex::new(seeded)),
            next_id: Arc::new(AtomicU64::new(next_id)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<EntryRecord>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn entries(&self) -> Vec<EntryRecord> {
        self.lock().clone()
    }

    pub fn entry(&self, id: &str) -> Option<EntryRecord> {
        self.lock().iter().find(|record| record.id == id).cloned()
    }

    pub fn update(&self, id: &str, payload: &SubmissionPayload) -> Option<EntryRecord> {
        let mut store = self.lock();
        let record = store.iter_mut().find(|record| record.id == id)?;
        apply_payload(record, payload);
        record.updated_at = Some(now_rfc3339());
        Some(record.clone())
    }

    pub fn count_in_radius(&self, lat: f64, lng: f64, radius_m: f64) -> u64 {
        let center = Coordinates::new(lat, lng);
        self.lock()
            .iter()
            .filter_map(|record| Some(Coordinates::new(record.lat?, record.lng?)))
            .filter(|point| haversine_km(center, *point) * 1000.0 <= radius_m)
            .count() as u64
    }

    pub fn suggestions(&self, keyword: &str) -> Vec<PlaceSuggestion> {
        let keyword = keyword.to_lowercase();
        self.lock()
            .iter()
            .filter(|record| {
                record
                    .name
                    .as_deref()
                    .is_some_and(|name| name.to_lowercase().contains(&keyword))
            })
            .filter_map(|record| {
                Some(PlaceSuggestion {
                    place_id: record.google_place_id.clone()?,
                    name: record.name.clone().unwrap_or_default(),
                    vicinity: record.address.clone(),
                    lat: record.lat?,
                    lng: record.lng?,
                    rating: record.rating,
                    types: vec![record.category.clone().unwrap_or_default()],
                })
            })
            .collect()
    }

    pub fn token_response(&self, email: &str) -> TokenResponse {
        TokenResponse {
            token: "dev-token".to_string(),
            user: User {
                id: DEV_USER_ID.to_string(),
                name: "Dev User".to_string(),
                email: email.to_string(),
            },
        }
    }
}

#[async_trait]
impl EntriesApi for DevBackend {
    async fn list_entries(&self) -> Result<Vec<EntryRecord>> {
        Ok(self.entries())
    }

    async fn create_entry(&self, payload: &SubmissionPayload) -> Result<EntryRecord> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut record = EntryRecord {
            id: format!("dev-{id}"),
            created_at: Some(now_rfc3339()),
            user_id: Some(DEV_USER_ID.to_string()),
            ..Default::default()
        };
        apply_payload(&mut record, payload);

        self.lock().push(record.clone());
        Ok(record)
    }

    async fn delete_entry(&self, id: &str) -> Result<()> {
        let mut store = self.lock();
        let before = store.len();
        store.retain(|record| record.id != id);
        if store.len() == before {
            return Err(ApiError::Status {
                call: "DELETE /entries/{id}".to_string(),
                status: 404,
                message: Some(format!("Entry {id} not found")),
            });
        }
        Ok(())
    }
}

fn apply_payload(record: &mut EntryRecord, payload: &SubmissionPayload) {
    record.name = Some(payload.name.clone());
    record.lat = Some(payload.lat);
    record.lng = Some(payload.lng);
    record.description = payload.description.clone();
    record.rating = payload.rating.map(f64::from);
    record.review = payload.review.clone();
    record.tags = payload
        .tags
        .as_ref()
        .map(|tags| Value::from(tags.clone()));
    record.media_base64 = payload
        .media_base64
        .as_ref()
        .map(|media| Value::from(media.clone()));
}

fn now_rfc3339() -> String {
    rfc3339(OffsetDateTime::now_utc())
}

fn rfc3339(dt: OffsetDateTime) -> String {
    dt.format(&Rfc3339).unwrap_or_default()
}

fn seed_dev_entries() -> Vec<EntryRecord> {
    let now = OffsetDateTime::now_utc();

    let entry = |idx: u32,
                 name: &str,
                 category: &str,
                 lat: f64,
                 lng: f64,
                 place_id: Option<&str>,
                 days_ago: i64,
                 owner: &str| EntryRecord {
        id: format!("dev-{idx}"),
        name: Some(name.to_string()),
        category: Some(category.to_string()),
        lat: Some(lat),
        lng: Some(lng),
        description: Some(format!("{name} (seeded)")),
        created_at: Some(rfc3339(now - Duration::days(days_ago))),
        user_id: Some(owner.to_string()),
        google_place_id: place_id.map(str::to_string),
        ..Default::default()
    };

    vec![
        entry(1, "Corner Cafe", "food", 51.5007, -0.1246, Some("g-corner-cafe"), 1, "1"),
        entry(2, "Corner Cafe (old pin)", "food", 51.500700, -0.124600, None, 30, "2"),
        entry(3, "British Museum", "culture", 51.5194, -0.1270, Some("g-museum"), 3, "2"),
        entry(4, "Hyde Park Bench", "outdoors", 51.5073, -0.1657, None, 10, "1"),
        entry(5, "Borough Market", "food", 51.5055, -0.0910, Some("g-borough"), 60, "3"),
        entry(6, "Tate Modern", "culture", 51.5076, -0.0994, Some("g-tate"), 5, "3"),
    ]
}
