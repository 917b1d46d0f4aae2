use std::sync::Arc;

use time::Duration;
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError, EntriesApi};
use crate::drafts::DraftsStore;
use crate::entries_store::EntriesStore;
use crate::install_prompt::InstallPrompt;
use crate::session::UserSession;
use crate::storage::{KeyValueStore, StorageError};
use crate::sync_queue::{Connectivity, SyncQueue, SyncReport, Transition};
use crate::types::{Entry, SubmissionPayload, Toast};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// UI-wide state: theme, the last known online flag and queued toasts.
#[derive(Debug, Clone)]
pub struct AppState {
    pub theme: Theme,
    pub is_online: bool,
    notifications: Vec<Toast>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            is_online: true,
            notifications: Vec::new(),
        }
    }
}

impl AppState {
    pub fn toggle_theme(&mut self) {
        self.theme = match self.theme {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        };
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }

    pub fn push_notification(&mut self, toast: Toast) {
        self.notifications.push(toast);
    }

    pub fn remove_notification(&mut self, index: usize) -> Option<Toast> {
        (index < self.notifications.len()).then(|| self.notifications.remove(index))
    }

    pub fn clear_notifications(&mut self) {
        self.notifications.clear();
    }

    pub fn notifications(&self) -> &[Toast] {
        &self.notifications
    }

    pub fn notification_count(&self) -> usize {
        self.notifications.len()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("No draft in progress")]
    NoDraft,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The backend accepted the entry.
    Created(Entry),
    /// The entry was saved to the offline queue. `reason` is set when a send
    /// was attempted and failed.
    Queued { id: String, reason: Option<String> },
}

/// Root store: owns the API client and every state container, and runs the
/// flows that cross them (submitting, syncing on reconnect, deleting,
/// signing out). `P` is the host's install-prompt handle; hosts without one
/// leave it as `()`.
pub struct Collect<A, P = ()> {
    api: Arc<A>,
    pub app: AppState,
    pub session: UserSession,
    pub entries: EntriesStore<A>,
    pub sync: SyncQueue<A>,
    pub drafts: DraftsStore,
    pub install: InstallPrompt<P>,
    connectivity: Connectivity,
}

impl<A: EntriesApi, P> Collect<A, P> {
    /// Restore persisted state and hand the stored token to the API client.
    pub fn new(api: Arc<A>, storage: Arc<dyn KeyValueStore>, cache_ttl: Duration) -> Self {
        let session = UserSession::load(storage.clone());
        api.set_token(session.token().map(str::to_string));

        Self {
            entries: EntriesStore::new(api.clone(), cache_ttl),
            sync: SyncQueue::new(api.clone(), storage.clone()),
            drafts: DraftsStore::new(storage),
            session,
            app: AppState::default(),
            install: InstallPrompt::new(),
            connectivity: Connectivity::default(),
            api,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Feed the host's connectivity signal. Only an offline-to-online edge
    /// drains the queue; the report of that drain is returned.
    pub async fn set_online(&mut self, online: bool) -> Option<SyncReport> {
        self.app.is_online = online;
        match self.connectivity.update(online) {
            Transition::CameOnline => {
                info!(pending = self.sync.pending_count(), "Back online");
                Some(self.sync_now().await)
            }
            Transition::WentOffline => {
                info!("Went offline");
                None
            }
            Transition::Unchanged => None,
        }
    }

    /// Drain the offline queue. When anything synced a toast is shown and the
    /// entry collection is refetched.
    pub async fn sync_now(&mut self) -> SyncReport {
        let report = self.sync.process_pending_submissions().await;
        if let Some(summary) = report.summary() {
            self.app.push_notification(Toast::success(summary));
            if let Err(e) = self.entries.force_refresh().await {
                warn!(error = %e, "Failed to refresh entries after sync");
            }
        }
        report
    }

    /// Create an entry, or queue it when offline or when the backend cannot
    /// be reached. Other API errors are returned and nothing is queued.
    pub async fn submit_entry(
        &mut self,
        payload: SubmissionPayload,
    ) -> Result<SubmitOutcome, CollectError> {
        if !self.connectivity.is_online() {
            return self.queue(payload, None);
        }

        match self.api.create_entry(&payload).await {
            Ok(record) => {
                let entry = record.into_entry();
                info!(id = %entry.id, name = %entry.name, "Entry created");
                self.app
                    .push_notification(Toast::success("Entry saved successfully!"));
                if let Err(e) = self.entries.force_refresh().await {
                    warn!(error = %e, "Failed to refresh entries after submit");
                }
                Ok(SubmitOutcome::Created(entry))
            }
            Err(e) if e.is_connectivity() => {
                warn!(error = %e, "Create failed, queueing for later");
                self.queue(payload, Some(e.to_string()))
            }
            Err(e) => {
                self.app
                    .push_notification(Toast::error("Failed to create entry. Please try again."));
                Err(e.into())
            }
        }
    }

    fn queue(
        &mut self,
        payload: SubmissionPayload,
        reason: Option<String>,
    ) -> Result<SubmitOutcome, CollectError> {
        let queued = self.sync.queue_submission(payload)?;
        self.app.push_notification(Toast::info(
            "Saved offline. It will sync when you are back online.",
        ));
        Ok(SubmitOutcome::Queued {
            id: queued.id,
            reason,
        })
    }

    /// Submit the draft being edited. It is removed once the entry is created
    /// or safely queued; on error it stays for another try.
    pub async fn submit_current_draft(&mut self) -> Result<SubmitOutcome, CollectError> {
        let payload = self.drafts.to_submission().ok_or(CollectError::NoDraft)?;
        let outcome = self.submit_entry(payload).await?;
        self.drafts.remove_current_draft()?;
        Ok(outcome)
    }

    /// Delete on the server, then drop the entry locally.
    pub async fn delete_entry(&mut self, id: &str) -> Result<(), CollectError> {
        self.api.delete_entry(id).await?;
        self.entries.remove_entry(id);
        info!(id, "Entry deleted");
        Ok(())
    }

    pub fn filtered_entries(&self) -> Vec<Entry> {
        self.entries.filtered_entries(self.session.user_id())
    }

    pub fn my_entries(&self) -> Vec<Entry> {
        self.entries.my_entries(self.session.user_id())
    }

    pub fn my_favourites(&self) -> Vec<Entry> {
        self.entries.my_favourites(self.session.favourites())
    }

    /// Sign out and drop everything tied to the account: pending submissions,
    /// loaded entries, in-memory drafts and toasts.
    pub fn logout(&mut self) -> Result<(), CollectError> {
        self.session.logout()?;
        self.api.set_token(None);
        self.sync.reset()?;
        self.entries.reset();
        self.drafts.reset();
        self.app.reset();
        self.app.is_online = self.connectivity.is_online();
        info!("Signed out");
        Ok(())
    }
}

impl<P> Collect<ApiClient, P> {
    pub async fn login(&mut self, email: &str, password: &str) -> Result<(), CollectError> {
        let response = self.api.login(email, password).await?;
        self.api.set_token(Some(response.token.clone()));
        info!(user_id = %response.user.id, "Signed in");
        self.session.sign_in(response)?;
        Ok(())
    }

    pub async fn register(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
        password_confirmation: &str,
    ) -> Result<(), CollectError> {
        let response = self
            .api
            .register(name, email, password, password_confirmation)
            .await?;
        self.api.set_token(Some(response.token.clone()));
        info!(user_id = %response.user.id, "Registered");
        self.session.sign_in(response)?;
        Ok(())
    }
}
