use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::api::dto::lenient;
use crate::geo::Coordinates;

/// A point-of-interest record, normalized from the backend's wire shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    pub name: String,
    pub category: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub description: Option<String>,
    pub address: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    pub user_id: Option<String>,
    pub google_place_id: Option<String>,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(default)]
    pub media: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub rating: Option<f64>,
    pub review: Option<String>,
    /// Kilometers from the reference location; only set by the query pipeline
    pub distance: Option<f64>,
}

impl Entry {
    /// Both coordinates, if present and finite.
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => {
                Some(Coordinates::new(lat, lng))
            }
            _ => None,
        }
    }

    pub fn has_valid_location(&self) -> bool {
        self.coordinates().is_some()
    }

    pub fn external_place_id(&self) -> Option<&str> {
        self.google_place_id
            .as_deref()
            .filter(|place_id| !place_id.is_empty())
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id.as_deref() == Some(user_id)
    }
}

/// Body of an entry-create request. Also the payload persisted for queued
/// submissions, so its shape must stay stable across releases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionPayload {
    pub lat: f64,
    pub lng: f64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_base64: Option<Vec<String>>,
}

impl SubmissionPayload {
    pub fn new(lat: f64, lng: f64, name: impl Into<String>) -> Self {
        Self {
            lat,
            lng,
            name: name.into(),
            description: None,
            rating: None,
            review: None,
            tags: None,
            media_base64: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// A nearby place proposed while naming a new entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceSuggestion {
    pub place_id: String,
    pub name: String,
    pub vicinity: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub rating: Option<f64>,
    pub types: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub message: String,
    pub kind: ToastKind,
}

impl Toast {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ToastKind::Success,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ToastKind::Error,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ToastKind::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_omits_absent_optionals() {
        let payload = SubmissionPayload::new(51.5, -0.12, "Corner Cafe");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"lat": 51.5, "lng": -0.12, "name": "Corner Cafe"})
        );
    }

    #[test]
    fn user_accepts_numeric_id() {
        let user: User =
            serde_json::from_str(r#"{"id": 42, "name": "Sam", "email": "sam@example.com"}"#)
                .unwrap();
        assert_eq!(user.id, "42");
    }
}
