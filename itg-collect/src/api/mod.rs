mod client;
mod dev_backend;
pub mod dto;
mod error;
#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;

pub use client::ApiClient;
pub use dev_backend::DevBackend;
pub use dto::{EntryRecord, TokenResponse};
pub use error::{ApiError, Result};

use crate::types::SubmissionPayload;

/// The entry endpoints the cache and the submission queue depend on.
#[async_trait]
pub trait EntriesApi: Send + Sync {
    /// `GET /entries`
    async fn list_entries(&self) -> Result<Vec<EntryRecord>>;

    /// `POST /entries`, returning the created record with its assigned id.
    async fn create_entry(&self, payload: &SubmissionPayload) -> Result<EntryRecord>;

    /// `DELETE /entries/{id}`
    async fn delete_entry(&self, id: &str) -> Result<()>;

    /// Bearer token for later calls. Backends without auth ignore it.
    fn set_token(&self, _token: Option<String>) {}
}
