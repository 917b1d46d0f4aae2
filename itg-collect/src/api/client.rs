use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::dev_backend::DevBackend;
use super::dto::{
    CountInRadiusRequest, CountResponse, EntryRecord, ErrorBody, FeedbackRequest, LoginRequest, RegisterRequest,
    SuggestionRequest, SuggestionsResponse, TokenResponse,
};
use super::error::{ApiError, Result};
use super::EntriesApi;
use crate::types::{PlaceSuggestion, SubmissionPayload};

const DEVICE_NAME: &str = "itg-collect-cli";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const UNAUTH_RELOGIN: &str = "Session expired or invalid. Run `itg login` to authenticate.";

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
    dev_backend: Option<DevBackend>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|_| ApiError::InvalidUrl(base_url.clone()))?;

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ApiError::Client)?;

        Ok(Self {
            client,
            base_url,
            token: Arc::new(RwLock::new(token)),
            dev_backend: None,
        })
    }

    /// A client that serves every call from a seeded in-memory backend.
    pub fn dev() -> Result<Self> {
        let client = Client::builder().build().map_err(ApiError::Client)?;
        Ok(Self {
            client,
            base_url: "http://localhost".to_string(),
            token: Arc::new(RwLock::new(None)),
            dev_backend: Some(DevBackend::new()),
        })
    }

    pub fn is_dev(&self) -> bool {
        self.dev_backend.is_some()
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn entry_endpoint(&self, id: &str) -> String {
        self.endpoint(&format!("/entries/{}", urlencoding::encode(id)))
    }

    async fn send(&self, request: RequestBuilder, call_name: &str) -> Result<Response> {
        let request = match self.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        debug!(call = call_name, "Calling ITG Collect API");
        let response = request
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                call: call_name.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.message);

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(ApiError::Unauthorized(
                message.unwrap_or_else(|| UNAUTH_RELOGIN.to_string()),
            ));
        }

        Err(ApiError::Status {
            call: call_name.to_string(),
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        call_name: &str,
    ) -> Result<T> {
        let response = self.send(request, call_name).await?;
        response.json::<T>().await.map_err(|source| ApiError::Decode {
            call: call_name.to_string(),
            source,
        })
    }

    async fn send_without_body(&self, request: RequestBuilder, call_name: &str) -> Result<()> {
        let response = self.send(request, call_name).await?;
        let _ = response.bytes().await;
        Ok(())
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse> {
        if let Some(dev) = &self.dev_backend {
            return Ok(dev.token_response(email));
        }

        self.get_json(
            self.client.post(self.endpoint("/token")).json(&LoginRequest {
                email,
                password,
                device_name: DEVICE_NAME,
            }),
            "POST /token",
        )
        .await
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        password_confirmation: &str,
    ) -> Result<TokenResponse> {
        if let Some(dev) = &self.dev_backend {
            return Ok(dev.token_response(email));
        }

        self.get_json(
            self.client
                .post(self.endpoint("/register"))
                .json(&RegisterRequest {
                    name,
                    email,
                    password,
                    password_confirmation,
                }),
            "POST /register",
        )
        .await
    }

    pub async fn get_recent(&self) -> Result<Vec<EntryRecord>> {
        if let Some(dev) = &self.dev_backend {
            return Ok(dev.entries());
        }

        self.get_json(
            self.client.get(self.endpoint("/entries/recent")),
            "GET /entries/recent",
        )
        .await
    }

    pub async fn get_entry(&self, id: &str) -> Result<EntryRecord> {
        if let Some(dev) = &self.dev_backend {
            return dev
                .entry(id)
                .ok_or_else(|| ApiError::Status {
                    call: "GET /entries/{id}".to_string(),
                    status: 404,
                    message: Some(format!("Entry {id} not found")),
                });
        }

        self.get_json(self.client.get(self.entry_endpoint(id)), "GET /entries/{id}")
            .await
    }

    pub async fn update_entry(&self, id: &str, payload: &SubmissionPayload) -> Result<EntryRecord> {
        if let Some(dev) = &self.dev_backend {
            return dev.update(id, payload).ok_or_else(|| ApiError::Status {
                call: "PUT /entries/{id}".to_string(),
                status: 404,
                message: Some(format!("Entry {id} not found")),
            });
        }

        self.get_json(
            self.client.put(self.entry_endpoint(id)).json(payload),
            "PUT /entries/{id}",
        )
        .await
    }

    /// Number of entries within `radius` meters of a point.
    pub async fn count_in_radius(&self, lat: f64, lng: f64, radius: f64) -> Result<u64> {
        if let Some(dev) = &self.dev_backend {
            return Ok(dev.count_in_radius(lat, lng, radius));
        }

        let response: CountResponse = self
            .get_json(
                self.client
                    .post(self.endpoint("/entries/count-in-radius"))
                    .json(&CountInRadiusRequest { lat, lng, radius }),
                "POST /entries/count-in-radius",
            )
            .await?;

        Ok(response.count)
    }

    pub async fn location_suggestions(
        &self,
        lat: f64,
        lng: f64,
        keyword: &str,
    ) -> Result<Vec<PlaceSuggestion>> {
        self.place_search("/location-suggestions", lat, lng, keyword)
            .await
    }

    pub async fn did_you_mean(
        &self,
        lat: f64,
        lng: f64,
        keyword: &str,
    ) -> Result<Vec<PlaceSuggestion>> {
        self.place_search("/did-you-mean", lat, lng, keyword).await
    }

    async fn place_search(
        &self,
        path: &str,
        lat: f64,
        lng: f64,
        keyword: &str,
    ) -> Result<Vec<PlaceSuggestion>> {
        if let Some(dev) = &self.dev_backend {
            return Ok(dev.suggestions(keyword));
        }

        let call_name = format!("POST {path}");
        let response: SuggestionsResponse = self
            .get_json(
                self.client
                    .post(self.endpoint(path))
                    .json(&SuggestionRequest { lat, lng, keyword }),
                &call_name,
            )
            .await?;

        Ok(response
            .results
            .into_iter()
            .map(PlaceSuggestion::from)
            .collect())
    }

    pub async fn submit_feedback(&self, feedback: &str, media: &[String]) -> Result<()> {
        if self.dev_backend.is_some() {
            return Ok(());
        }

        self.send_without_body(
            self.client
                .post(self.endpoint("/feedback"))
                .json(&FeedbackRequest {
                    feedback,
                    media_base64: (!media.is_empty()).then_some(media),
                }),
            "POST /feedback",
        )
        .await
    }
}

#[async_trait]
impl EntriesApi for ApiClient {
    async fn list_entries(&self) -> Result<Vec<EntryRecord>> {
        if let Some(dev) = &self.dev_backend {
            return dev.list_entries().await;
        }

        self.get_json(self.client.get(self.endpoint("/entries")), "GET /entries")
            .await
    }

    async fn create_entry(&self, payload: &SubmissionPayload) -> Result<EntryRecord> {
        if let Some(dev) = &self.dev_backend {
            return dev.create_entry(payload).await;
        }

        self.get_json(
            self.client.post(self.endpoint("/entries")).json(payload),
            "POST /entries",
        )
        .await
    }

    async fn delete_entry(&self, id: &str) -> Result<()> {
        if let Some(dev) = &self.dev_backend {
            return dev.delete_entry(id).await;
        }

        self.send_without_body(
            self.client.delete(self.entry_endpoint(id)),
            "DELETE /entries/{id}",
        )
        .await
    }

    fn set_token(&self, token: Option<String>) {
        ApiClient::set_token(self, token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_base_url() {
        assert!(matches!(
            ApiClient::new("not a url", None),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn endpoints_keep_api_prefix() {
        let client = ApiClient::new("https://example.com/api/", None).unwrap();
        assert_eq!(client.endpoint("/entries"), "https://example.com/api/entries");
        assert_eq!(
            client.entry_endpoint("a b"),
            "https://example.com/api/entries/a%20b"
        );
    }

    #[tokio::test]
    async fn dev_client_serves_seeded_entries() {
        let client = ApiClient::dev().unwrap();
        let entries = client.list_entries().await.unwrap();
        assert!(!entries.is_empty());

        let created = client
            .create_entry(&SubmissionPayload::new(51.5, -0.12, "Test Spot"))
            .await
            .unwrap();
        assert_eq!(client.list_entries().await.unwrap().len(), entries.len() + 1);

        client.delete_entry(&created.id).await.unwrap();
        assert_eq!(client.list_entries().await.unwrap().len(), entries.len());
    }

    #[tokio::test]
    async fn dev_client_reads_single_and_recent_entries() {
        let client = ApiClient::dev().unwrap();

        let recent = client.get_recent().await.unwrap();
        assert_eq!(recent.len(), client.list_entries().await.unwrap().len());

        let museum = client.get_entry("dev-3").await.unwrap().into_entry();
        assert_eq!(museum.name, "British Museum");

        assert!(matches!(
            client.get_entry("missing").await,
            Err(ApiError::Status { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn dev_client_updates_entries() {
        let client = ApiClient::dev().unwrap();
        let mut payload = SubmissionPayload::new(51.5194, -0.1270, "The British Museum");
        payload.rating = Some(5);

        let updated = client.update_entry("dev-3", &payload).await.unwrap().into_entry();
        assert_eq!(updated.name, "The British Museum");
        assert_eq!(updated.rating, Some(5.0));
        assert!(updated.updated_at.is_some());

        let reread = client.get_entry("dev-3").await.unwrap().into_entry();
        assert_eq!(reread.name, "The British Museum");

        assert!(matches!(
            client.update_entry("missing", &payload).await,
            Err(ApiError::Status { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn dev_client_counts_entries_in_radius() {
        let client = ApiClient::dev().unwrap();

        // Corner Cafe and its old pin share a point; every other seed is over 1 km away.
        assert_eq!(client.count_in_radius(51.5007, -0.1246, 500.0).await.unwrap(), 2);
        assert_eq!(client.count_in_radius(51.5007, -0.1246, 50_000.0).await.unwrap(), 6);
        assert_eq!(client.count_in_radius(0.0, 0.0, 100.0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dev_client_suggests_place_names() {
        let client = ApiClient::dev().unwrap();

        let matches = client.did_you_mean(51.5, -0.12, "museum").await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].place_id, "g-museum");

        // Pins without a place id are never suggested.
        let nearby = client.location_suggestions(51.5, -0.12, "corner").await.unwrap();
        assert_eq!(nearby.len(), 1);
        assert_eq!(nearby[0].name, "Corner Cafe");
    }
}
