//! REST API seam.
//!
//! [`CallApi`] is the only way the session runtime talks to the backend, so
//! tests can substitute a recording mock. [`HttpCallApi`] is the `reqwest`
//! implementation.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use seance_core::{RequestId, SessionId};
use seance_protocol::{AcceptData, ApiEnvelope, RawCallDetails, StatusData, SyncTimerData};

use crate::config::ClientConfig;
use crate::error::ApiError;

/// Call endpoints used by the session runtime.
#[async_trait]
pub trait CallApi: Send + Sync {
    /// `GET /active-call`
    async fn active_call(&self) -> Result<RawCallDetails, ApiError>;

    /// `GET <path>` for one expanded call-detail template.
    async fn call_details(&self, path: &str) -> Result<RawCallDetails, ApiError>;

    /// `GET /sync-timer/{sessionId}`
    async fn sync_timer(&self, session_id: &SessionId) -> Result<SyncTimerData, ApiError>;

    /// `GET /status/{sessionId}`
    async fn status(&self, session_id: &SessionId) -> Result<StatusData, ApiError>;

    /// `POST /accept/{requestId}`
    async fn accept(&self, request_id: &RequestId) -> Result<AcceptData, ApiError>;

    /// `POST /reject/{requestId}`
    async fn reject(&self, request_id: &RequestId) -> Result<(), ApiError>;

    /// `POST /end/{sessionId}`
    async fn end(&self, session_id: &SessionId) -> Result<(), ApiError>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// `reqwest`-backed [`CallApi`].
#[derive(Clone)]
pub struct HttpCallApi {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpCallApi {
    /// Builds a client with the configured timeout and credentials.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Transient` if the TLS backend cannot be initialized.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::Transient(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        path: &str,
    ) -> Result<ApiEnvelope<T>, ApiError> {
        let response = self.authorize(request).send().await.map_err(|e| {
            debug!(path, error = %e, "Request failed");
            ApiError::from(e)
        })?;

        let status = response.status();
        if let Some(err) = classify_status(status) {
            debug!(path, status = status.as_u16(), "Request returned error status");
            return Err(err);
        }

        response.json::<ApiEnvelope<T>>().await.map_err(|e| {
            warn!(path, error = %e, "Failed to decode response body");
            ApiError::Decode(e.to_string())
        })
    }

    async fn get_data<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let envelope = self.send(self.client.get(self.url(path)), path).await?;
        Ok(envelope.into_data()?)
    }

    async fn post_data<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let envelope = self.send(self.client.post(self.url(path)), path).await?;
        Ok(envelope.into_data()?)
    }

    async fn post_ack(&self, path: &str) -> Result<(), ApiError> {
        let envelope: ApiEnvelope<serde_json::Value> =
            self.send(self.client.post(self.url(path)), path).await?;
        Ok(envelope.into_ack()?)
    }
}

/// Maps an HTTP status to the error taxonomy. `None` for 2xx.
pub fn classify_status(status: StatusCode) -> Option<ApiError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::NOT_FOUND => ApiError::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized,
        s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT || s == StatusCode::TOO_MANY_REQUESTS => {
            ApiError::Transient(format!("HTTP {}", s.as_u16()))
        }
        s => ApiError::Rejected {
            message: Some(format!("HTTP {}", s.as_u16())),
        },
    })
}

#[async_trait]
impl CallApi for HttpCallApi {
    async fn active_call(&self) -> Result<RawCallDetails, ApiError> {
        self.get_data("/active-call").await
    }

    async fn call_details(&self, path: &str) -> Result<RawCallDetails, ApiError> {
        self.get_data(path).await
    }

    async fn sync_timer(&self, session_id: &SessionId) -> Result<SyncTimerData, ApiError> {
        self.get_data(&format!("/sync-timer/{session_id}")).await
    }

    async fn status(&self, session_id: &SessionId) -> Result<StatusData, ApiError> {
        self.get_data(&format!("/status/{session_id}")).await
    }

    async fn accept(&self, request_id: &RequestId) -> Result<AcceptData, ApiError> {
        self.post_data(&format!("/accept/{request_id}")).await
    }

    async fn reject(&self, request_id: &RequestId) -> Result<(), ApiError> {
        self.post_ack(&format!("/reject/{request_id}")).await
    }

    async fn end(&self, session_id: &SessionId) -> Result<(), ApiError> {
        self.post_ack(&format!("/end/{session_id}")).await
    }
}
