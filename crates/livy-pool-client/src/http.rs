//! Minimal JSON-over-HTTP transport.
//!
//! Every call is exactly one round trip. Only 200 and 201 count as success;
//! the body is read as text and parsed as JSON so that transport, status and
//! parse failures stay distinguishable.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ClientError, Result};

/// Header the control plane requires on mutating requests (CSRF protection).
pub const REQUESTED_BY_HEADER: &str = "x-requested-by";

/// Settings for [`JsonHttpClient`].
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Value sent in the `X-Requested-By` header.
    pub requested_by: String,
    /// Overall timeout for one request.
    pub request_timeout: Duration,
    /// Timeout for establishing the connection.
    pub connect_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            requested_by: "user".to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// GET/POST client that speaks JSON and nothing else.
#[derive(Debug, Clone)]
pub struct JsonHttpClient {
    client: reqwest::Client,
    headers: HeaderMap,
}

impl JsonHttpClient {
    /// Build a client with the standard control-plane headers.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Transport` if the underlying HTTP client cannot be
    /// built, or `ClientError::Parse` if `requested_by` is not a valid header value.
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|e| ClientError::Transport(format!("failed to create HTTP client: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let requested_by = HeaderValue::from_str(&settings.requested_by)
            .map_err(|e| ClientError::Parse(format!("invalid X-Requested-By value: {e}")))?;
        headers.insert(HeaderName::from_static(REQUESTED_BY_HEADER), requested_by);

        Ok(Self { client, headers })
    }

    /// Headers sent with every request.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// `GET url` and parse the response as JSON.
    ///
    /// # Errors
    ///
    /// Returns `Transport`, `Status` or `Parse` errors as described on [`ClientError`].
    pub async fn get(&self, url: &str) -> Result<Value> {
        tracing::trace!(url = %url, "GET");
        let response = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await?;
        Self::read_json(response).await
    }

    /// `POST url` with a JSON body and parse the response as JSON.
    ///
    /// # Errors
    ///
    /// Returns `Transport`, `Status` or `Parse` errors as described on [`ClientError`].
    pub async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Value> {
        let payload = serde_json::to_vec(body)
            .map_err(|e| ClientError::Parse(format!("failed to encode request: {e}")))?;
        tracing::trace!(url = %url, bytes = payload.len(), "POST");
        let response = self
            .client
            .post(url)
            .headers(self.headers.clone())
            .body(payload)
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn read_json(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| ClientError::Parse(e.to_string()))
    }
}

/// Decode a JSON value into a typed response, naming `what` on failure.
pub(crate) fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value).map_err(|e| ClientError::Parse(format!("invalid {what}: {e}")))
}
