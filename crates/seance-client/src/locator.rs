//! Session locator.
//!
//! Resolves the authoritative call from an optional request id by trying a
//! prioritized list of endpoints. Individual failures are logged and skipped;
//! only the exhaustion of every candidate is an error.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use seance_core::{CallSnapshot, RequestId};
use seance_protocol::RawCallDetails;

use crate::api::CallApi;
use crate::config::ClientConfig;
use crate::error::ApiError;

/// Why a lookup produced nothing.
#[derive(Debug, Clone, Error)]
pub enum LocateError {
    /// No endpoint yielded a usable call.
    #[error("No call found")]
    NotFound,

    /// The API rejected our credentials.
    #[error("Authentication required")]
    Unauthorized,
}

/// Read-only resolver for the initial call snapshot.
pub struct SessionLocator {
    api: Arc<dyn CallApi>,
    detail_paths: Vec<String>,
}

impl SessionLocator {
    pub fn new(api: Arc<dyn CallApi>, config: &ClientConfig) -> Self {
        Self {
            api,
            detail_paths: config.detail_paths.clone(),
        }
    }

    /// Locates the call.
    ///
    /// Without a request id, `/active-call` supplies the lookup id. Detail
    /// endpoints are then tried in order and the first success wins. If all
    /// of them fail, a usable `/active-call` payload is used instead.
    ///
    /// # Errors
    ///
    /// `LocateError::NotFound` when every candidate failed,
    /// `LocateError::Unauthorized` when any candidate answered 401.
    pub async fn locate(&self, request_id: Option<&RequestId>) -> Result<CallSnapshot, LocateError> {
        let mut unauthorized = false;
        let mut active: Option<RawCallDetails> = None;

        let lookup_id = match request_id {
            Some(id) => id.as_str().to_string(),
            None => match self.api.active_call().await {
                Ok(raw) => match raw.lookup_id() {
                    Some(id) => {
                        let id = id.to_string();
                        active = Some(raw);
                        id
                    }
                    None => {
                        info!("No active call");
                        return Err(LocateError::NotFound);
                    }
                },
                Err(ApiError::Unauthorized) => return Err(LocateError::Unauthorized),
                Err(e) => {
                    warn!(error = %e, "Active-call lookup failed");
                    return Err(LocateError::NotFound);
                }
            },
        };

        for template in &self.detail_paths {
            let path = ClientConfig::detail_path(template, &lookup_id);
            match self.api.call_details(&path).await {
                Ok(raw) if raw.is_usable() => {
                    debug!(%path, "Call details resolved");
                    return Ok(raw.normalize(request_id));
                }
                Ok(_) => {
                    debug!(%path, "Call details carried no identifiers, trying next");
                }
                Err(ApiError::Unauthorized) => {
                    unauthorized = true;
                    debug!(%path, "Call details unauthorized, trying next");
                }
                Err(e) => {
                    debug!(%path, error = %e, "Call details failed, trying next");
                }
            }
        }

        if let Some(raw) = active {
            info!(lookup_id = %lookup_id, "Detail endpoints exhausted, using active-call payload");
            return Ok(raw.normalize(request_id));
        }

        warn!(lookup_id = %lookup_id, "Call could not be located");
        if unauthorized {
            Err(LocateError::Unauthorized)
        } else {
            Err(LocateError::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use seance_core::{CallStatus, SessionId};
    use seance_protocol::{AcceptData, StatusData, SyncTimerData};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned detail responses keyed by path and records lookups.
    #[derive(Default)]
    struct DetailApi {
        active: Option<RawCallDetails>,
        details: HashMap<String, Result<RawCallDetails, ApiError>>,
        requested: Mutex<Vec<String>>,
    }

    fn details(json: &str) -> RawCallDetails {
        serde_json::from_str(json).unwrap()
    }

    #[async_trait]
    impl CallApi for DetailApi {
        async fn active_call(&self) -> Result<RawCallDetails, ApiError> {
            self.active.clone().ok_or(ApiError::NotFound)
        }

        async fn call_details(&self, path: &str) -> Result<RawCallDetails, ApiError> {
            self.requested.lock().unwrap().push(path.to_string());
            self.details
                .get(path)
                .cloned()
                .unwrap_or(Err(ApiError::NotFound))
        }

        async fn sync_timer(&self, _: &SessionId) -> Result<SyncTimerData, ApiError> {
            Err(ApiError::NotFound)
        }

        async fn status(&self, _: &SessionId) -> Result<StatusData, ApiError> {
            Err(ApiError::NotFound)
        }

        async fn accept(&self, _: &RequestId) -> Result<AcceptData, ApiError> {
            Err(ApiError::NotFound)
        }

        async fn reject(&self, _: &RequestId) -> Result<(), ApiError> {
            Ok(())
        }

        async fn end(&self, _: &SessionId) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn locator(api: DetailApi) -> (SessionLocator, Arc<DetailApi>) {
        let api = Arc::new(api);
        let locator = SessionLocator::new(api.clone(), &ClientConfig::default());
        (locator, api)
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let mut api = DetailApi::default();
        api.details.insert(
            "/call-details/r1".to_string(),
            Err(ApiError::Transient("timeout".to_string())),
        );
        api.details.insert(
            "/call-sessions/r1".to_string(),
            Ok(details(r#"{"sessionId": "s1", "status": "pending"}"#)),
        );
        let (locator, api) = locator(api);

        let snapshot = locator.locate(Some(&RequestId::new("r1"))).await.unwrap();

        assert_eq!(snapshot.session_id, Some(SessionId::new("s1")));
        assert_eq!(snapshot.request_id, Some(RequestId::new("r1")));
        assert_eq!(snapshot.status, Some(CallStatus::Pending));
        // Third candidate never tried
        assert_eq!(api.requested.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_all_candidates_fail() {
        let (locator, api) = locator(DetailApi::default());
        let result = locator.locate(Some(&RequestId::new("r1"))).await;
        assert!(matches!(result, Err(LocateError::NotFound)));
        assert_eq!(api.requested.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_active_call_supplies_lookup_id() {
        let mut api = DetailApi {
            active: Some(details(r#"{"sessionId": "s9", "requestId": "r9"}"#)),
            ..Default::default()
        };
        api.details.insert(
            "/call-details/s9".to_string(),
            Ok(details(r#"{"sessionId": "s9", "status": "in-progress", "elapsedSeconds": 4}"#)),
        );
        let (locator, _) = locator(api);

        let snapshot = locator.locate(None).await.unwrap();
        assert_eq!(snapshot.session_id, Some(SessionId::new("s9")));
        assert_eq!(snapshot.elapsed_seconds, 4);
    }

    #[tokio::test]
    async fn test_active_call_payload_as_fallback() {
        let api = DetailApi {
            active: Some(details(
                r#"{"sessionId": "s2", "status": "ringing", "roomName": "room-2"}"#,
            )),
            ..Default::default()
        };
        let (locator, _) = locator(api);

        let snapshot = locator.locate(None).await.unwrap();
        assert_eq!(snapshot.session_id, Some(SessionId::new("s2")));
        assert_eq!(snapshot.room_name.as_deref(), Some("room-2"));
    }

    #[tokio::test]
    async fn test_no_active_call() {
        let (locator, api) = locator(DetailApi::default());
        assert!(matches!(locator.locate(None).await, Err(LocateError::NotFound)));
        assert!(api.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_surfaces() {
        let mut api = DetailApi::default();
        for template in ClientConfig::default().detail_paths {
            api.details.insert(
                ClientConfig::detail_path(&template, "r1"),
                Err(ApiError::Unauthorized),
            );
        }
        let (locator, _) = locator(api);
        assert!(matches!(
            locator.locate(Some(&RequestId::new("r1"))).await,
            Err(LocateError::Unauthorized)
        ));
    }
}
