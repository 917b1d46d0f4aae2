use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::TokenResponse;
use crate::storage::{self, KeyValueStore, StorageError};
use crate::types::{Entry, User};

pub const TOKEN_KEY: &str = "apiToken";
pub const USER_KEY: &str = "user";
pub const FAVOURITES_KEY: &str = "favourites";

/// Signed-in user, their API token and their favourite entry ids. Everything
/// is persisted so a restart keeps the user signed in.
pub struct UserSession {
    storage: Arc<dyn KeyValueStore>,
    user: Option<User>,
    token: Option<String>,
    favourites: Vec<String>,
}

impl UserSession {
    pub fn load(storage: Arc<dyn KeyValueStore>) -> Self {
        let user: Option<User> = storage::load_json(storage.as_ref(), USER_KEY);
        let token = match storage.get(TOKEN_KEY) {
            Ok(token) => token
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read stored token");
                None
            }
        };
        let favourites = storage::load_json(storage.as_ref(), FAVOURITES_KEY).unwrap_or_default();

        debug!(
            user = user.is_some(),
            token = token.is_some(),
            "Loaded session from storage"
        );

        Self {
            storage,
            user,
            token,
            favourites,
        }
    }

    pub fn sign_in(&mut self, response: TokenResponse) -> Result<(), StorageError> {
        self.storage.set(TOKEN_KEY, &response.token)?;
        storage::save_json(self.storage.as_ref(), USER_KEY, &response.user)?;
        self.token = Some(response.token);
        self.user = Some(response.user);
        Ok(())
    }

    /// Forget the user and token. Favourites are kept.
    pub fn logout(&mut self) -> Result<(), StorageError> {
        self.user = None;
        self.token = None;
        self.storage.remove(TOKEN_KEY)?;
        self.storage.remove(USER_KEY)
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some() && self.user.is_some()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.id.as_str())
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn display_name(&self) -> &str {
        match &self.user {
            Some(user) if !user.name.is_empty() => &user.name,
            _ => "Guest",
        }
    }

    pub fn favourites(&self) -> &[String] {
        &self.favourites
    }

    pub fn is_favourite(&self, entry_id: &str) -> bool {
        self.favourites.iter().any(|id| id == entry_id)
    }

    /// Add or remove a favourite. Returns whether the entry is now a favourite.
    pub fn toggle_favourite(&mut self, entry_id: &str) -> Result<bool, StorageError> {
        let now_favourite = if self.is_favourite(entry_id) {
            self.favourites.retain(|id| id != entry_id);
            false
        } else {
            self.favourites.push(entry_id.to_string());
            true
        };
        storage::save_json(self.storage.as_ref(), FAVOURITES_KEY, &self.favourites)?;
        Ok(now_favourite)
    }

    pub fn is_my_entry(&self, entry: &Entry) -> bool {
        self.user_id().is_some_and(|id| entry.is_owned_by(id))
    }
}
