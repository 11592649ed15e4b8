//! LinkedIn share-lifecycle payloads.
//!
//! LinkedIn delivers a flat event rather than the entry/changes nesting the
//! Meta providers use, so the discriminator is an event-type/object pair.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::MatchOutcome;
use crate::hub::AlertDraft;

pub const PLATFORM: &str = "linkedin";
const MESSAGE: &str = "New LinkedIn post published!";

/// Matches `eventType == "SHARE_LIFECYCLE_EVENT"` or
/// `object ∈ {"share", "ugcPost"}`. `received_at` stands in when the payload
/// carries no timestamp of its own.
pub fn match_event(body: &Value, received_at: DateTime<Utc>) -> MatchOutcome {
    let event_type = body.get("eventType").and_then(Value::as_str);
    let object = body.get("object").and_then(Value::as_str);

    let is_share = event_type == Some("SHARE_LIFECYCLE_EVENT")
        || matches!(object, Some("share") | Some("ugcPost"));
    if !is_share {
        return MatchOutcome::Unrecognized;
    }

    let share_id = body
        .get("shareId")
        .or_else(|| body.get("id"))
        .cloned()
        .unwrap_or(Value::Null);
    let timestamp = body
        .get("timestamp")
        .cloned()
        .unwrap_or_else(|| json!(received_at.to_rfc3339()));

    let data = json!({
        "shareId": share_id,
        "eventType": event_type.map(Value::from).unwrap_or(Value::Null),
        "timestamp": timestamp,
    });
    MatchOutcome::NewPosts(vec![AlertDraft::new(PLATFORM, MESSAGE, data)])
}
