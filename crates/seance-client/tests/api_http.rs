//! HttpCallApi and SessionLocator against a fake HTTP server.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use seance_client::{ApiError, CallApi, ClientConfig, HttpCallApi, LocateError, SessionLocator};
use seance_core::{CallStatus, Money, RequestId, SessionId};

fn api_for(server: &MockServer, token: Option<&str>) -> HttpCallApi {
    let config = ClientConfig {
        api_base_url: format!("{}/api", server.uri()),
        auth_token: token.map(str::to_string),
        ..Default::default()
    };
    HttpCallApi::new(&config).unwrap()
}

#[tokio::test]
async fn test_sync_timer_unwraps_envelope_with_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sync-timer/s-1"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "status": "in-progress", "elapsedSeconds": "42", "creditsUsed": 2.1 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_for(&server, Some("secret"));
    let data = api.sync_timer(&SessionId::new("s-1")).await.unwrap();

    assert_eq!(data.elapsed_seconds, Some(42));
    assert_eq!(data.credits_used, Some(Money::from_cents(210)));
    assert_eq!(data.status.as_deref(), Some("in-progress"));
}

#[tokio::test]
async fn test_error_statuses_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/status/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/status/locked"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/status/busy"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let api = api_for(&server, None);
    assert!(matches!(
        api.status(&SessionId::new("gone")).await,
        Err(ApiError::NotFound)
    ));
    assert!(matches!(
        api.status(&SessionId::new("locked")).await,
        Err(ApiError::Unauthorized)
    ));
    let busy = api.status(&SessionId::new("busy")).await.unwrap_err();
    assert!(busy.is_transient(), "expected transient, got {busy:?}");
}

#[tokio::test]
async fn test_unsuccessful_envelope_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/accept/r-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "Request already handled"
        })))
        .mount(&server)
        .await;

    let api = api_for(&server, None);
    match api.accept(&RequestId::new("r-1")).await {
        Err(ApiError::Rejected { message }) => {
            assert_eq!(message.as_deref(), Some("Request already handled"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_end_acknowledges_without_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/end/s-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_for(&server, None);
    api.end(&SessionId::new("s-1")).await.unwrap();
}

#[tokio::test]
async fn test_locator_falls_through_detail_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/call-details/r-7"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/call-sessions/r-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "_id": "s-7",
                "status": "in_progress",
                "roomName": "room-7",
                "elapsed": 65,
                "ratePerMinute": "4.50",
                "client": { "name": "Ada" }
            }
        })))
        .mount(&server)
        .await;

    let config = ClientConfig {
        api_base_url: format!("{}/api", server.uri()),
        ..Default::default()
    };
    let api: Arc<dyn CallApi> = Arc::new(HttpCallApi::new(&config).unwrap());
    let locator = SessionLocator::new(api, &config);

    let snapshot = locator.locate(Some(&RequestId::new("r-7"))).await.unwrap();
    assert_eq!(snapshot.session_id, Some(SessionId::new("s-7")));
    assert_eq!(snapshot.request_id, Some(RequestId::new("r-7")));
    assert_eq!(snapshot.status, Some(CallStatus::InProgress));
    assert_eq!(snapshot.elapsed_seconds, 65);
    assert_eq!(snapshot.rate_per_min, Money::from_cents(450));
    assert_eq!(snapshot.counterpart.display_name.as_deref(), Some("Ada"));
}

#[tokio::test]
async fn test_locator_reports_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = ClientConfig {
        api_base_url: format!("{}/api", server.uri()),
        ..Default::default()
    };
    let api: Arc<dyn CallApi> = Arc::new(HttpCallApi::new(&config).unwrap());
    let locator = SessionLocator::new(api, &config);

    assert!(matches!(
        locator.locate(Some(&RequestId::new("r-8"))).await,
        Err(LocateError::NotFound)
    ));
}
