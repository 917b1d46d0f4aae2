//! Scriptable in-memory `EntriesApi` for tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use super::dto::EntryRecord;
use super::error::{ApiError, Result};
use super::EntriesApi;
use crate::types::SubmissionPayload;

#[derive(Clone, Default)]
pub struct MockEntriesApi {
    records: Arc<Mutex<Vec<EntryRecord>>>,
    offline: Arc<AtomicBool>,
    failing_names: Arc<Mutex<HashSet<String>>>,
    calls: Arc<Mutex<Vec<String>>>,
    next_id: Arc<AtomicU64>,
    token: Arc<Mutex<Option<String>>>,
}

impl MockEntriesApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(self, records: Vec<Value>) -> Self {
        *self.records.lock().unwrap() = records
            .into_iter()
            .map(|value| serde_json::from_value(value).unwrap())
            .collect();
        self
    }

    /// Every call fails as if the network were down.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Creating an entry with this name fails.
    pub fn fail_create_for(&self, name: &str) {
        self.failing_names.lock().unwrap().insert(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.as_str() == "list")
            .count()
    }

    /// Names passed to `create_entry`, in call order, including failed attempts.
    pub fn create_attempts(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|call| call.strip_prefix("create:").map(str::to_string))
            .collect()
    }

    pub fn token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    fn record_call(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ApiError::Unavailable("network unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EntriesApi for MockEntriesApi {
    async fn list_entries(&self) -> Result<Vec<EntryRecord>> {
        self.record_call("list".to_string());
        self.check_online()?;
        Ok(self.records.lock().unwrap().clone())
    }

    async fn create_entry(&self, payload: &SubmissionPayload) -> Result<EntryRecord> {
        self.record_call(format!("create:{}", payload.name));
        self.check_online()?;
        if self.failing_names.lock().unwrap().contains(&payload.name) {
            return Err(ApiError::Unavailable(format!("create {} failed", payload.name)));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = EntryRecord {
            id: format!("created-{id}"),
            name: Some(payload.name.clone()),
            category: Some("uncategorized".to_string()),
            lat: Some(payload.lat),
            lng: Some(payload.lng),
            description: payload.description.clone(),
            created_at: Some("2024-06-01T12:00:00Z".to_string()),
            ..Default::default()
        };
        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn delete_entry(&self, id: &str) -> Result<()> {
        self.record_call(format!("delete:{id}"));
        self.check_online()?;
        self.records.lock().unwrap().retain(|record| record.id != id);
        Ok(())
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.lock().unwrap() = token;
    }
}
