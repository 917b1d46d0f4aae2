//! Offline submission queue: entry creations that could not be sent are kept
//! in durable storage and replayed in order once the device is back online.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::api::EntriesApi;
use crate::storage::{self, KeyValueStore, StorageError};
use crate::time_utils::unix_millis;
use crate::types::SubmissionPayload;

pub const PENDING_SUBMISSIONS_KEY: &str = "itg-collect-pending-submissions";

const ID_SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSubmission {
    pub id: String,
    pub payload: SubmissionPayload,
    /// Enqueue time, unix milliseconds
    pub created_at: i64,
}

impl PendingSubmission {
    fn new(payload: SubmissionPayload, now: OffsetDateTime) -> Self {
        let millis = unix_millis(now);
        let mut rng = rand::thread_rng();
        let suffix: String = (0..5)
            .map(|_| ID_SUFFIX_ALPHABET[rng.gen_range(0..ID_SUFFIX_ALPHABET.len())] as char)
            .collect();

        Self {
            id: format!("{millis}-{suffix}"),
            payload,
            created_at: millis,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: usize,
    pub remaining: usize,
    /// Submission whose create call failed and stopped the drain
    pub halted_on: Option<String>,
    /// Nothing was attempted: the queue was empty or a drain was already running
    pub skipped: bool,
}

impl SyncReport {
    fn skipped(remaining: usize) -> Self {
        Self {
            remaining,
            skipped: true,
            ..Default::default()
        }
    }

    /// Toast text for a drain that synced something.
    pub fn summary(&self) -> Option<String> {
        match self.synced {
            0 => None,
            1 => Some("1 entry synced successfully".to_string()),
            n => Some(format!("{n} entries synced successfully")),
        }
    }
}

/// Clears the syncing flag when dropped, including when a drain future is
/// cancelled mid-way.
struct SyncGuard(Arc<AtomicBool>);

impl SyncGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncQueue<A> {
    api: Arc<A>,
    storage: Arc<dyn KeyValueStore>,
    pending: Vec<PendingSubmission>,
    syncing: Arc<AtomicBool>,
}

impl<A: EntriesApi> SyncQueue<A> {
    /// Create the queue and restore whatever was persisted. Corrupt stored
    /// data is treated as an empty queue.
    pub fn new(api: Arc<A>, storage: Arc<dyn KeyValueStore>) -> Self {
        let pending: Vec<PendingSubmission> =
            storage::load_json(storage.as_ref(), PENDING_SUBMISSIONS_KEY).unwrap_or_default();
        if !pending.is_empty() {
            info!(count = pending.len(), "Restored pending submissions");
        }

        Self {
            api,
            storage,
            pending,
            syncing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pending(&self) -> &[PendingSubmission] {
        &self.pending
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    fn persist(&self) -> Result<(), StorageError> {
        storage::save_json(self.storage.as_ref(), PENDING_SUBMISSIONS_KEY, &self.pending)
    }

    /// Append a submission and persist the whole queue. If persisting fails
    /// the submission is still queued in memory.
    pub fn queue_submission(
        &mut self,
        payload: SubmissionPayload,
    ) -> Result<PendingSubmission, StorageError> {
        let submission = PendingSubmission::new(payload, OffsetDateTime::now_utc());
        info!(id = %submission.id, name = %submission.payload.name, "Queued submission");
        self.pending.push(submission.clone());
        self.persist()?;
        Ok(submission)
    }

    /// Replay queued submissions oldest first, one at a time. The first failure
    /// stops the drain; it and everything after it stay queued for the next
    /// attempt.
    pub async fn process_pending_submissions(&mut self) -> SyncReport {
        if self.pending.is_empty() {
            return SyncReport::skipped(0);
        }
        let Some(_guard) = SyncGuard::acquire(&self.syncing) else {
            debug!("Drain already in progress");
            return SyncReport::skipped(self.pending.len());
        };

        let mut succeeded: Vec<String> = Vec::new();
        let mut halted_on = None;

        for submission in &self.pending {
            match self.api.create_entry(&submission.payload).await {
                Ok(created) => {
                    debug!(id = %submission.id, entry_id = %created.id, "Synced submission");
                    succeeded.push(submission.id.clone());
                }
                Err(e) => {
                    warn!(id = %submission.id, error = %e, "Failed to sync submission, stopping");
                    halted_on = Some(submission.id.clone());
                    break;
                }
            }
        }

        if !succeeded.is_empty() {
            self.pending
                .retain(|submission| !succeeded.contains(&submission.id));
            if let Err(e) = self.persist() {
                warn!(error = %e, "Failed to persist pending submissions after sync");
            }
            info!(
                synced = succeeded.len(),
                remaining = self.pending.len(),
                "Synced pending submissions"
            );
        }

        SyncReport {
            synced: succeeded.len(),
            remaining: self.pending.len(),
            halted_on,
            skipped: false,
        }
    }

    /// Drop every queued submission, in memory and on disk.
    pub fn reset(&mut self) -> Result<(), StorageError> {
        self.pending.clear();
        self.storage.remove(PENDING_SUBMISSIONS_KEY)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    CameOnline,
    WentOffline,
    Unchanged,
}

/// Tracks the host's online signal and reports edges, so a drain runs once per
/// offline-to-online transition rather than on every "still online" update.
#[derive(Debug, Clone)]
pub struct Connectivity {
    online: bool,
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        Self { online }
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn update(&mut self, online: bool) -> Transition {
        let transition = match (self.online, online) {
            (false, true) => Transition::CameOnline,
            (true, false) => Transition::WentOffline,
            _ => Transition::Unchanged,
        };
        self.online = online;
        transition
    }
}
