use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::time_utils::parse_timestamp;
use crate::types::{Entry, PlaceSuggestion, User};

/// An entry as the backend sends it. Field names arrive in both snake_case and
/// camelCase, coordinates may be strings and media may be a JSON-encoded
/// string, so everything loose is captured here and normalized by
/// [`EntryRecord::into_entry`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryRecord {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient::coordinate")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient::coordinate")]
    pub lng: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, rename = "createdAt")]
    pub created_at_camel: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default, rename = "updatedAt")]
    pub updated_at_camel: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub user_id: Option<String>,
    #[serde(default, rename = "userId", deserialize_with = "lenient::opt_string")]
    pub user_id_camel: Option<String>,
    #[serde(default)]
    pub google_place_id: Option<String>,
    #[serde(default, rename = "googlePlaceId")]
    pub google_place_id_camel: Option<String>,
    #[serde(default)]
    pub draft: Option<Value>,
    #[serde(default, rename = "isDraft")]
    pub is_draft: Option<bool>,
    #[serde(default)]
    pub media_base64: Option<Value>,
    #[serde(default)]
    pub tags: Option<Value>,
    #[serde(default, deserialize_with = "lenient::coordinate")]
    pub rating: Option<f64>,
    #[serde(default)]
    pub review: Option<String>,
}

fn first_non_empty(primary: Option<String>, fallback: Option<String>) -> Option<String> {
    primary
        .filter(|value| !value.is_empty())
        .or(fallback.filter(|value| !value.is_empty()))
}

/// Read a list of strings that may be a native array, a JSON-encoded array or
/// absent. Anything unparseable becomes an empty list.
fn string_list(value: Option<Value>, field: &str, entry_id: &str) -> Vec<String> {
    match value {
        None | Some(Value::Null) => vec![],
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        Some(Value::String(encoded)) if encoded.trim().is_empty() => vec![],
        Some(Value::String(encoded)) => match serde_json::from_str::<Vec<String>>(&encoded) {
            Ok(items) => items,
            Err(e) => {
                warn!(entry_id, field, error = %e, "Failed to parse JSON-encoded list");
                vec![]
            }
        },
        Some(other) => {
            warn!(entry_id, field, kind = ?other, "Unexpected list value");
            vec![]
        }
    }
}

fn is_truthy_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() == Some(1),
        Value::String(s) => s == "1" || s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

impl EntryRecord {
    pub fn into_entry(self) -> Entry {
        let media = string_list(self.media_base64, "media_base64", &self.id);
        let tags = string_list(self.tags, "tags", &self.id);
        let created_at = first_non_empty(self.created_at, self.created_at_camel);
        let updated_at = first_non_empty(self.updated_at, self.updated_at_camel);

        Entry {
            name: self.name.unwrap_or_default(),
            category: self.category.unwrap_or_default(),
            lat: self.lat,
            lng: self.lng,
            description: self.description,
            address: self.address,
            created_at: created_at.as_deref().and_then(parse_timestamp),
            updated_at: updated_at.as_deref().and_then(parse_timestamp),
            user_id: first_non_empty(self.user_id, self.user_id_camel),
            google_place_id: first_non_empty(self.google_place_id, self.google_place_id_camel),
            is_draft: self.draft.as_ref().is_some_and(is_truthy_flag)
                || self.is_draft == Some(true),
            media,
            tags,
            rating: self.rating,
            review: self.review,
            distance: None,
            id: self.id,
        }
    }
}

#[derive(Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub device_name: &'a str,
}

#[derive(Serialize)]
pub struct RegisterRequest<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub password_confirmation: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    pub user: User,
}

#[derive(Serialize)]
pub struct SuggestionRequest<'a> {
    pub lat: f64,
    pub lng: f64,
    pub keyword: &'a str,
}

#[derive(Deserialize)]
pub struct SuggestionsResponse {
    #[serde(default)]
    pub results: Vec<PlaceDto>,
}

#[derive(Deserialize)]
pub struct PlaceDto {
    pub place_id: String,
    pub name: String,
    #[serde(default)]
    pub vicinity: Option<String>,
    pub geometry: GeometryDto,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub types: Vec<String>,
}

#[derive(Deserialize)]
pub struct GeometryDto {
    pub location: LatLngDto,
}

#[derive(Deserialize)]
pub struct LatLngDto {
    pub lat: f64,
    pub lng: f64,
}

impl From<PlaceDto> for PlaceSuggestion {
    fn from(place: PlaceDto) -> Self {
        Self {
            place_id: place.place_id,
            name: place.name,
            vicinity: place.vicinity,
            lat: place.geometry.location.lat,
            lng: place.geometry.location.lng,
            rating: place.rating,
            types: place.types,
        }
    }
}

#[derive(Serialize)]
pub struct CountInRadiusRequest {
    pub lat: f64,
    pub lng: f64,
    pub radius: f64,
}

#[derive(Debug, Deserialize)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Serialize)]
pub struct FeedbackRequest<'a> {
    pub feedback: &'a str,
    pub media_base64: Option<&'a [String]>,
}

#[derive(Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

/// Deserializers for fields the backend is inconsistent about.
pub(crate) mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn value_to_string(value: Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// A string or number, rendered as a string.
    pub fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        let value = Value::deserialize(deserializer)?;
        value_to_string(value)
            .ok_or_else(|| serde::de::Error::custom("expected a string or number identifier"))
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        Ok(value_to_string(Value::deserialize(deserializer)?))
    }

    /// A number or a numeric string. Unparseable and non-finite values are `None`.
    pub fn coordinate<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<f64>, D::Error> {
        let parsed = match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        Ok(parsed.filter(|value| value.is_finite()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    fn record(value: Value) -> EntryRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn normalizes_snake_case_record() {
        let entry = record(json!({
            "id": 7,
            "name": "Corner Cafe",
            "category": "food",
            "lat": "51.5007",
            "lng": "-0.1246",
            "created_at": "2024-06-01 09:00:00",
            "user_id": 3,
            "google_place_id": "g1",
            "draft": 1,
            "media_base64": "[\"aGVsbG8=\"]"
        }))
        .into_entry();

        assert_eq!(entry.id, "7");
        assert_eq!(entry.lat, Some(51.5007));
        assert_eq!(entry.lng, Some(-0.1246));
        assert_eq!(entry.created_at, Some(datetime!(2024-06-01 09:00 UTC)));
        assert_eq!(entry.user_id.as_deref(), Some("3"));
        assert_eq!(entry.external_place_id(), Some("g1"));
        assert!(entry.is_draft);
        assert_eq!(entry.media, vec!["aGVsbG8=".to_string()]);
    }

    #[test]
    fn camel_case_fields_fill_in_when_snake_case_missing() {
        let entry = record(json!({
            "id": "a",
            "name": "Museum",
            "category": "culture",
            "lat": 1.0,
            "lng": 2.0,
            "createdAt": "2024-01-01",
            "userId": "u1",
            "googlePlaceId": "",
            "isDraft": false,
            "media_base64": ["x", "y"]
        }))
        .into_entry();

        assert_eq!(entry.created_at, Some(datetime!(2024-01-01 0:00 UTC)));
        assert_eq!(entry.user_id.as_deref(), Some("u1"));
        assert_eq!(entry.external_place_id(), None);
        assert!(!entry.is_draft);
        assert_eq!(entry.media.len(), 2);
    }

    #[test]
    fn malformed_media_becomes_empty() {
        let entry = record(json!({
            "id": "a",
            "name": "Broken",
            "category": "misc",
            "lat": 1.0,
            "lng": 2.0,
            "media_base64": "[not json"
        }))
        .into_entry();

        assert!(entry.media.is_empty());
        assert_eq!(entry.name, "Broken");
    }

    #[test]
    fn missing_or_bad_coordinates_are_none() {
        let entry = record(json!({
            "id": "a",
            "name": "Nowhere",
            "category": "misc",
            "lat": null,
            "lng": "abc"
        }))
        .into_entry();

        assert_eq!(entry.lat, None);
        assert_eq!(entry.lng, None);
        assert!(!entry.has_valid_location());
    }

    #[test]
    fn place_dto_flattens_geometry() {
        let dto: PlaceDto = serde_json::from_value(json!({
            "place_id": "g1",
            "name": "Corner Cafe",
            "vicinity": "1 High St",
            "geometry": {"location": {"lat": 51.5, "lng": -0.12}},
            "types": ["cafe"]
        }))
        .unwrap();

        let suggestion = PlaceSuggestion::from(dto);
        assert_eq!(suggestion.lat, 51.5);
        assert_eq!(suggestion.types, vec!["cafe".to_string()]);
        assert!(suggestion.rating.is_none());
    }

    #[test]
    fn count_response_requires_numeric_count() {
        let parsed: CountResponse = serde_json::from_value(json!({"count": 4})).unwrap();
        assert_eq!(parsed.count, 4);

        assert!(serde_json::from_value::<CountResponse>(json!({"total": 4})).is_err());
        assert!(serde_json::from_value::<CountResponse>(json!({"count": "many"})).is_err());
    }
}
