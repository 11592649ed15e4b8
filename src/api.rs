//! HTTP surface: operational endpoints, webhook routes, and the live
//! channel upgrade, wired around the shared [`AlertHub`].

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::AppConfig;
use crate::hub::{Alert, AlertDraft, AlertHub};
use crate::{live, webhooks};

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<AlertHub>,
    pub config: Arc<AppConfig>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            hub: Arc::new(AlertHub::new()),
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/trigger-alert", post(trigger_alert))
        .route("/api/recent-alerts", get(recent_alerts))
        .route("/ws", get(live::ws_handler))
        .route(
            "/webhooks/{provider}",
            get(webhooks::verify).post(webhooks::receive),
        )
        .layer(cors)
        .with_state(state)
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TriggerResp {
    success: bool,
    message: &'static str,
    connected_clients: usize,
    alert: Alert,
}

/// Manual publish for operational testing. Indistinguishable downstream from
/// an organic provider event.
async fn trigger_alert(
    State(state): State<AppState>,
    Json(body): Json<AlertDraft>,
) -> Json<TriggerResp> {
    let draft = AlertDraft {
        platform: body.platform.or_else(|| Some("test".to_string())),
        message: body
            .message
            .or_else(|| Some("Test alert triggered!".to_string())),
        data: body.data.or_else(|| Some(json!({"test": true}))),
    };
    let alert = state.hub.publish(draft);

    Json(TriggerResp {
        success: true,
        message: "Alert sent to all connected clients",
        connected_clients: state.hub.connected_clients(),
        alert,
    })
}

#[derive(Debug, Deserialize)]
struct RecentAlertsQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct RecentAlertsResp {
    alerts: Vec<Alert>,
    total: usize,
}

async fn recent_alerts(
    State(state): State<AppState>,
    Query(q): Query<RecentAlertsQuery>,
) -> Json<RecentAlertsResp> {
    Json(RecentAlertsResp {
        alerts: state.hub.history(q.limit),
        total: state.hub.stored_alerts(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResp {
    status: &'static str,
    connected_clients: usize,
    total_alerts: usize,
    timestamp: DateTime<Utc>,
    uptime: f64,
}

async fn health(State(state): State<AppState>) -> Json<HealthResp> {
    Json(HealthResp {
        status: "ok",
        connected_clients: state.hub.connected_clients(),
        total_alerts: state.hub.stored_alerts(),
        timestamp: Utc::now(),
        uptime: state.started_at.elapsed().as_secs_f64(),
    })
}

async fn index(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": "Social Media Alert Relay",
        "status": "running",
        "endpoints": {
            "health": "/health",
            "triggerAlert": "POST /api/trigger-alert",
            "recentAlerts": "/api/recent-alerts",
            "liveChannel": "/ws",
            "webhooks": {
                "instagram": "/webhooks/instagram",
                "linkedin": "/webhooks/linkedin",
                "facebook": "/webhooks/facebook"
            }
        },
        "connectedClients": state.hub.connected_clients(),
    }))
}
