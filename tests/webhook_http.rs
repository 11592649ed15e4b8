// tests/webhook_http.rs
//
// Webhook endpoints end to end through the Router: the verification
// handshake status contract and provider event normalization into the hub.

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::json;
use tower::ServiceExt as _;

use social_alert_relay::api::{create_router, AppState};
use social_alert_relay::config::AppConfig;

const BODY_LIMIT: usize = 1024 * 1024;

fn test_app() -> (Router, AppState) {
    let config = AppConfig {
        instagram_verify_token: Some("ig-secret".to_string()),
        // facebook_verify_token deliberately left unset
        linkedin_verify_token: Some("li-secret".to_string()),
        ..AppConfig::default()
    };
    let state = AppState::new(config);
    (create_router(state.clone()), state)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build GET request")
}

fn post_json(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .expect("build POST request")
}

async fn body_string(resp: axum::response::Response) -> String {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

// --- verification handshake ---

#[tokio::test]
async fn handshake_echoes_challenge_on_valid_token() {
    let (app, _state) = test_app();
    let uri = "/webhooks/instagram?hub.mode=subscribe&hub.verify_token=ig-secret&hub.challenge=1158201444";

    let resp = app.oneshot(get(uri)).await.expect("oneshot verify");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "1158201444");
}

#[tokio::test]
async fn handshake_rejects_mismatched_token_with_403() {
    let (app, _state) = test_app();
    let uri = "/webhooks/instagram?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=1";

    let resp = app.oneshot(get(uri)).await.expect("oneshot verify");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn handshake_rejects_missing_mode_or_token_with_400() {
    let (app, _state) = test_app();

    let resp = app
        .clone()
        .oneshot(get("/webhooks/instagram?hub.verify_token=ig-secret&hub.challenge=1"))
        .await
        .expect("oneshot verify");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .oneshot(get("/webhooks/instagram?hub.mode=subscribe&hub.challenge=1"))
        .await
        .expect("oneshot verify");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn handshake_fails_closed_when_no_secret_is_configured() {
    let (app, _state) = test_app();
    // Facebook has no secret configured; any token must be forbidden.
    let uri = "/webhooks/facebook?hub.mode=subscribe&hub.verify_token=anything&hub.challenge=1";

    let resp = app.oneshot(get(uri)).await.expect("oneshot verify");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_provider_is_404() {
    let (app, _state) = test_app();
    let resp = app
        .clone()
        .oneshot(get("/webhooks/myspace?hub.mode=subscribe&hub.verify_token=x&hub.challenge=1"))
        .await
        .expect("oneshot verify");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .oneshot(post_json("/webhooks/myspace", "{}".to_string()))
        .await
        .expect("oneshot receive");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- event delivery ---

#[tokio::test]
async fn instagram_media_event_publishes_normalized_alert() {
    let (app, state) = test_app();
    let payload = json!({
        "object": "instagram",
        "entry": [{
            "time": 1700000000,
            "changes": [{
                "field": "media",
                "value": {"media_id": "m1", "media_type": "IMAGE"}
            }]
        }]
    });

    let resp = app
        .oneshot(post_json("/webhooks/instagram", payload.to_string()))
        .await
        .expect("oneshot receive");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "OK");

    let hist = state.hub.history(Some(10));
    assert_eq!(hist.len(), 1);
    assert_eq!(hist[0].platform, "instagram");
    assert_eq!(hist[0].kind, "new_post");
    assert_eq!(hist[0].data["mediaId"], "m1");
    assert_eq!(hist[0].data["mediaType"], "IMAGE");
}

#[tokio::test]
async fn facebook_feed_event_publishes_normalized_alert() {
    let (app, state) = test_app();
    let payload = json!({
        "object": "page",
        "entry": [{
            "time": 1700000001,
            "changes": [{
                "field": "feed",
                "value": {"post_id": "fb_1", "message": "open house"}
            }]
        }]
    });

    let resp = app
        .oneshot(post_json("/webhooks/facebook", payload.to_string()))
        .await
        .expect("oneshot receive");
    assert_eq!(resp.status(), StatusCode::OK);

    let hist = state.hub.history(Some(10));
    assert_eq!(hist.len(), 1);
    assert_eq!(hist[0].platform, "facebook");
    assert_eq!(hist[0].data["postId"], "fb_1");
}

#[tokio::test]
async fn linkedin_share_event_publishes_normalized_alert() {
    let (app, state) = test_app();
    let payload = json!({
        "eventType": "SHARE_LIFECYCLE_EVENT",
        "shareId": "urn:li:share:42"
    });

    let resp = app
        .oneshot(post_json("/webhooks/linkedin", payload.to_string()))
        .await
        .expect("oneshot receive");
    assert_eq!(resp.status(), StatusCode::OK);

    let hist = state.hub.history(Some(10));
    assert_eq!(hist.len(), 1);
    assert_eq!(hist[0].platform, "linkedin");
    assert_eq!(hist[0].data["shareId"], "urn:li:share:42");
}

#[tokio::test]
async fn unrecognized_shape_is_acknowledged_and_dropped() {
    let (app, state) = test_app();
    let payload = json!({"object": "instagram", "entry": [{"changes": [{"field": "comments"}]}]});

    let resp = app
        .oneshot(post_json("/webhooks/instagram", payload.to_string()))
        .await
        .expect("oneshot receive");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "OK");
    assert_eq!(state.hub.stored_alerts(), 0);
}

#[tokio::test]
async fn malformed_body_is_acknowledged_and_dropped() {
    let (app, state) = test_app();

    let resp = app
        .oneshot(post_json("/webhooks/facebook", "not json {{".to_string()))
        .await
        .expect("oneshot receive");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "OK");
    assert_eq!(state.hub.stored_alerts(), 0);
}

#[tokio::test]
async fn one_alert_per_change_in_a_batched_payload() {
    let (app, state) = test_app();
    let payload = json!({
        "object": "instagram",
        "entry": [
            {"changes": [{"field": "media", "value": {"media_id": "a"}}]},
            {"changes": [{"field": "media", "value": {"media_id": "b"}}]}
        ]
    });

    let resp = app
        .oneshot(post_json("/webhooks/instagram", payload.to_string()))
        .await
        .expect("oneshot receive");
    assert_eq!(resp.status(), StatusCode::OK);

    let hist = state.hub.history(Some(10));
    assert_eq!(hist.len(), 2);
    assert_eq!(hist[0].data["mediaId"], "a");
    assert_eq!(hist[1].data["mediaId"], "b");
}
