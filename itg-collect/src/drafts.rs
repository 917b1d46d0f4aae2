use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::storage::{self, KeyValueStore, StorageError};
use crate::time_utils::{system_clock, unix_millis, Clock};
use crate::types::SubmissionPayload;

pub const DRAFTS_KEY: &str = "@itg_collect_drafts";
pub const FIRST_SCREEN: &str = "/create-entry/map-select";

fn first_screen() -> String {
    FIRST_SCREEN.to_string()
}

/// An entry being composed in the creation wizard, saved locally after every
/// edit so it survives restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub draft_id: String,
    #[serde(default)]
    pub guid: Option<String>,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lng: f64,
    #[serde(default)]
    pub google_place: Option<Value>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub media: Vec<String>,
    #[serde(default)]
    pub media_captions: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub rating: u8,
    #[serde(default)]
    pub review: String,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default = "first_screen")]
    pub current_screen: String,
}

impl Draft {
    fn blank(draft_id: String, created_at: OffsetDateTime) -> Self {
        Self {
            draft_id,
            guid: None,
            lat: 0.0,
            lng: 0.0,
            google_place: None,
            name: String::new(),
            description: String::new(),
            category: String::new(),
            categories: Vec::new(),
            tags: Vec::new(),
            media: Vec::new(),
            media_captions: Vec::new(),
            created_at,
            rating: 0,
            review: String::new(),
            comments: String::new(),
            price: None,
            current_screen: first_screen(),
        }
    }

    /// Pad captions with empty strings, or cut them, so there is exactly one
    /// per media item. Returns whether anything changed.
    fn align_captions(&mut self) -> bool {
        if self.media_captions.len() == self.media.len() {
            return false;
        }
        self.media_captions.resize(self.media.len(), String::new());
        true
    }

    /// Build the create-entry request for this draft. Empty optional fields are
    /// left out of the payload.
    pub fn to_submission(&self) -> SubmissionPayload {
        let non_empty = |s: &str| {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        };

        let mut payload = SubmissionPayload::new(self.lat, self.lng, self.name.trim());
        payload.description = non_empty(&self.description);
        payload.review = non_empty(&self.review);
        payload.rating = (self.rating > 0).then_some(self.rating);
        payload.tags = (!self.tags.is_empty()).then(|| self.tags.clone());
        payload.media_base64 = (!self.media.is_empty()).then(|| self.media.clone());
        payload
    }
}

pub struct DraftsStore {
    storage: Arc<dyn KeyValueStore>,
    drafts: Vec<Draft>,
    current: Option<Draft>,
    error: Option<String>,
    clock: Clock,
}

impl DraftsStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        let mut store = Self {
            storage,
            drafts: Vec::new(),
            current: None,
            error: None,
            clock: system_clock(),
        };
        store.load_drafts();
        store
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn drafts(&self) -> &[Draft] {
        &self.drafts
    }

    pub fn current(&self) -> Option<&Draft> {
        self.current.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Reload every saved draft. Unreadable data leaves an empty list and an
    /// error message.
    pub fn load_drafts(&mut self) {
        self.error = None;
        let raw = match self.storage.get(DRAFTS_KEY) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to read drafts");
                self.drafts.clear();
                self.error = Some("Failed to load drafts".to_string());
                return;
            }
        };

        self.drafts = match raw.map(|raw| serde_json::from_str::<Vec<Draft>>(&raw)) {
            None => Vec::new(),
            Some(Ok(drafts)) => drafts,
            Some(Err(e)) => {
                warn!(error = %e, "Ignoring corrupt drafts");
                self.error = Some("Failed to load drafts".to_string());
                Vec::new()
            }
        };
        debug!(count = self.drafts.len(), "Loaded drafts");
    }

    fn persist(&self) -> Result<(), StorageError> {
        storage::save_json(self.storage.as_ref(), DRAFTS_KEY, &self.drafts)
    }

    /// Start a fresh draft and save it. The id is the creation time in epoch
    /// milliseconds, bumped when another draft already has that id.
    pub fn reset_draft(&mut self) -> Result<Draft, StorageError> {
        let now = (self.clock)();
        let mut millis = unix_millis(now);
        while self
            .drafts
            .iter()
            .any(|draft| draft.draft_id == millis.to_string())
        {
            millis += 1;
        }

        let draft = Draft::blank(millis.to_string(), now);
        self.current = Some(draft.clone());
        self.save_current_draft_locally()?;
        Ok(draft)
    }

    /// Make a saved draft current. Unknown ids leave the current draft as is.
    pub fn load_draft(&mut self, draft_id: &str) -> Result<bool, StorageError> {
        let Some(draft) = self.drafts.iter().find(|d| d.draft_id == draft_id) else {
            return Ok(false);
        };
        let mut draft = draft.clone();
        let changed = draft.align_captions();
        self.current = Some(draft);
        if changed {
            self.save_current_draft_locally()?;
        }
        Ok(true)
    }

    /// Upsert the current draft into the saved list and persist the list.
    pub fn save_current_draft_locally(&mut self) -> Result<(), StorageError> {
        let Some(current) = &self.current else {
            return Ok(());
        };

        match self
            .drafts
            .iter_mut()
            .find(|d| d.draft_id == current.draft_id)
        {
            Some(saved) => *saved = current.clone(),
            None => self.drafts.push(current.clone()),
        }
        self.persist()
    }

    pub fn delete_draft(&mut self, draft_id: &str) -> Result<bool, StorageError> {
        let Some(index) = self.drafts.iter().position(|d| d.draft_id == draft_id) else {
            return Ok(false);
        };
        self.drafts.remove(index);
        if self
            .current
            .as_ref()
            .is_some_and(|current| current.draft_id == draft_id)
        {
            self.current = None;
        }
        self.persist()?;
        Ok(true)
    }

    pub fn remove_current_draft(&mut self) -> Result<(), StorageError> {
        if let Some(current) = self.current.take() {
            self.delete_draft(&current.draft_id)?;
        }
        Ok(())
    }

    /// Apply an edit to the current draft and save it. A no-op when there is
    /// no current draft.
    pub fn edit(&mut self, f: impl FnOnce(&mut Draft)) -> Result<(), StorageError> {
        let Some(current) = self.current.as_mut() else {
            return Ok(());
        };
        f(current);
        self.save_current_draft_locally()
    }

    pub fn set_lat(&mut self, lat: f64) -> Result<(), StorageError> {
        self.edit(|d| d.lat = lat)
    }

    pub fn set_lng(&mut self, lng: f64) -> Result<(), StorageError> {
        self.edit(|d| d.lng = lng)
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), StorageError> {
        self.edit(|d| d.name = name.into())
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> Result<(), StorageError> {
        self.edit(|d| d.description = description.into())
    }

    pub fn set_category(&mut self, category: impl Into<String>) -> Result<(), StorageError> {
        self.edit(|d| d.category = category.into())
    }

    pub fn set_categories(&mut self, categories: Vec<String>) -> Result<(), StorageError> {
        self.edit(|d| d.categories = categories)
    }

    pub fn set_tags(&mut self, tags: Vec<String>) -> Result<(), StorageError> {
        self.edit(|d| d.tags = tags)
    }

    /// Replace the media list. Captions follow its length.
    pub fn set_media(&mut self, media: Vec<String>) -> Result<(), StorageError> {
        self.edit(|d| {
            d.media = media;
            d.align_captions();
        })
    }

    pub fn set_media_captions(&mut self, captions: Vec<String>) -> Result<(), StorageError> {
        self.edit(|d| d.media_captions = captions)
    }

    pub fn set_rating(&mut self, rating: u8) -> Result<(), StorageError> {
        self.edit(|d| d.rating = rating.min(5))
    }

    pub fn set_review(&mut self, review: impl Into<String>) -> Result<(), StorageError> {
        self.edit(|d| d.review = review.into())
    }

    pub fn set_comments(&mut self, comments: impl Into<String>) -> Result<(), StorageError> {
        self.edit(|d| d.comments = comments.into())
    }

    pub fn set_price(&mut self, price: Option<f64>) -> Result<(), StorageError> {
        self.edit(|d| d.price = price)
    }

    pub fn set_current_screen(&mut self, screen: impl Into<String>) -> Result<(), StorageError> {
        self.edit(|d| d.current_screen = screen.into())
    }

    pub fn to_submission(&self) -> Option<SubmissionPayload> {
        self.current.as_ref().map(Draft::to_submission)
    }

    /// Forget in-memory state. Saved drafts stay on disk.
    pub fn reset(&mut self) {
        self.drafts.clear();
        self.current = None;
        self.error = None;
    }
}
