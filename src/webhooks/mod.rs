//! Webhook ingestion: provider verification handshakes plus event
//! normalization into [`AlertDraft`]s for the hub.
//!
//! Providers require a fast 2xx acknowledgment regardless of what we do with
//! the payload, so the delivery endpoint answers 200 "OK" for matched,
//! unmatched, and unparseable bodies alike.

pub mod facebook;
pub mod instagram;
pub mod linkedin;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use metrics::counter;
use serde::Deserialize;
use serde_json::Value;

use crate::api::AppState;
use crate::hub::AlertDraft;

/// The only `hub.mode` value that completes a subscription handshake.
pub const MODE_SUBSCRIBE: &str = "subscribe";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Instagram,
    Facebook,
    Linkedin,
}

impl Provider {
    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug {
            "instagram" => Some(Self::Instagram),
            "facebook" => Some(Self::Facebook),
            "linkedin" => Some(Self::Linkedin),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Instagram => "instagram",
            Self::Facebook => "facebook",
            Self::Linkedin => "linkedin",
        }
    }
}

/// Outcome of matching a provider payload against its known shapes.
/// Unmatched is a distinct outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    NewPosts(Vec<AlertDraft>),
    Unrecognized,
}

/// Query parameters of the ownership-verification handshake.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Echo this challenge back with 200.
    Accepted(String),
    /// Mode or token mismatch, or no secret configured.
    Forbidden,
    /// Mode or token absent.
    BadRequest,
}

/// Strict-equality handshake check. An unset secret can never match, so the
/// handshake fails closed instead of accepting any token.
pub fn verify_subscription(query: &VerifyQuery, secret: Option<&str>) -> VerifyOutcome {
    let (Some(mode), Some(token)) = (query.mode.as_deref(), query.verify_token.as_deref())
    else {
        return VerifyOutcome::BadRequest;
    };
    match secret {
        Some(expected) if mode == MODE_SUBSCRIBE && token == expected => {
            VerifyOutcome::Accepted(query.challenge.clone().unwrap_or_default())
        }
        _ => VerifyOutcome::Forbidden,
    }
}

/// `GET /webhooks/{provider}` — subscription verification handshake.
pub async fn verify(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let Some(provider) = Provider::from_slug(&provider) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match verify_subscription(&query, state.config.verify_token_for(provider)) {
        VerifyOutcome::Accepted(challenge) => {
            tracing::info!(provider = provider.name(), "webhook verified");
            (StatusCode::OK, challenge).into_response()
        }
        VerifyOutcome::Forbidden => {
            tracing::warn!(provider = provider.name(), "webhook verification rejected");
            StatusCode::FORBIDDEN.into_response()
        }
        VerifyOutcome::BadRequest => StatusCode::BAD_REQUEST.into_response(),
    }
}

/// `POST /webhooks/{provider}` — event delivery. Always acknowledges with
/// 200 "OK" once routed; malformed bodies are logged and dropped.
pub async fn receive(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    body: Bytes,
) -> Response {
    let Some(provider) = Provider::from_slug(&provider) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(err) => {
            tracing::warn!(provider = provider.name(), error = %err, "unparseable webhook body");
            return (StatusCode::OK, "OK").into_response();
        }
    };

    let outcome = match provider {
        Provider::Instagram => instagram::match_event(&payload),
        Provider::Facebook => facebook::match_event(&payload),
        Provider::Linkedin => linkedin::match_event(&payload, Utc::now()),
    };

    match outcome {
        MatchOutcome::NewPosts(drafts) => {
            counter!("webhook_events_total", "provider" => provider.name())
                .increment(drafts.len() as u64);
            for draft in drafts {
                state.hub.publish(draft);
            }
        }
        MatchOutcome::Unrecognized => {
            counter!("webhook_unrecognized_total", "provider" => provider.name()).increment(1);
            tracing::debug!(provider = provider.name(), "unrecognized webhook shape");
        }
    }

    (StatusCode::OK, "OK").into_response()
}
