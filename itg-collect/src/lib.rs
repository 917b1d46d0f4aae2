//! Client-side core for ITG Collect: entry cache and query pipeline, offline
//! submission queue, wizard drafts and the user session, all persisted through
//! a pluggable key-value store.

pub mod api;
pub mod app;
pub mod cache;
pub mod config;
pub mod drafts;
pub mod entries_store;
pub mod geo;
pub mod install_prompt;
pub mod query;
pub mod session;
pub mod storage;
pub mod sync_queue;
pub mod time_utils;
pub mod types;

pub use api::{ApiClient, ApiError, DevBackend, EntriesApi};
pub use app::{AppState, Collect, CollectError, SubmitOutcome, Theme};
pub use config::CollectConfig;
pub use drafts::{Draft, DraftsStore};
pub use entries_store::{EntriesStore, FetchSource};
pub use install_prompt::{InstallOutcome, InstallPrompt};
pub use query::{EntryFilters, SortBy};
pub use session::UserSession;
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use sync_queue::{Connectivity, PendingSubmission, SyncQueue, SyncReport, Transition};
pub use types::{Entry, PlaceSuggestion, SubmissionPayload, Toast, ToastKind, User};
