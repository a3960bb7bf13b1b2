//! HTTP client for the dashboard REST API.
//!
//! Only the suggested-prompts endpoint is used by the chat surface.

use dhan_saathi_core::UserId;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, Url};

use crate::profile::{Profile, GUEST_USER_ID};
use crate::types::{ApiErrorResponse, SuggestionsResponse};

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// `error` field of the body, if any.
        message: String,
    },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// The base URL cannot carry a path.
    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Client for the dashboard REST API.
#[derive(Debug, Clone)]
pub struct DashboardClient {
    client: Client,
    base_url: String,
}

impl DashboardClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the API (e.g., "http://localhost:5000")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    /// Build `{base}/api/{segments...}` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| ClientError::InvalidBaseUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidBaseUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    /// Handle API error responses.
    async fn handle_error(response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();
        let message = match response.json::<ApiErrorResponse>().await {
            Ok(err) => err.error,
            Err(_) => "Unknown error".to_string(),
        };
        ClientError::Api { status, message }
    }

    // =========================================================================
    // Suggestions
    // =========================================================================

    /// Fetch suggested prompts for a user.
    ///
    /// A missing `suggestions` field yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the API answers with a non-2xx
    /// status, or the body is not the expected JSON.
    pub async fn suggestions(&self, user_id: &UserId) -> Result<Vec<String>, ClientError> {
        self.suggestions_for(user_id.as_str()).await
    }

    /// Fetch suggested prompts for the user of `profile`, or for the guest
    /// user when signed out.
    ///
    /// # Errors
    ///
    /// See [`DashboardClient::suggestions`].
    pub async fn suggestions_for_profile(&self, profile: &Profile) -> Result<Vec<String>, ClientError> {
        let user = profile.user_id.as_ref().map_or(GUEST_USER_ID, UserId::as_str);
        self.suggestions_for(user).await
    }

    async fn suggestions_for(&self, user: &str) -> Result<Vec<String>, ClientError> {
        let url = self.endpoint(&["ai-suggestions", user])?;
        tracing::debug!(%url, "Fetching suggestions");

        let response = self.client.get(url).headers(Self::headers()).send().await?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        let body: SuggestionsResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))?;

        Ok(body.suggestions)
    }
}
