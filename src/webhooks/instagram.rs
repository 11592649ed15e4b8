//! Instagram Graph subscription payloads.

use serde_json::{json, Value};

use super::MatchOutcome;
use crate::hub::AlertDraft;

pub const PLATFORM: &str = "instagram";
const MESSAGE: &str = "New Instagram post published!";

/// Matches the "media changed" subscription shape:
/// `{object: "instagram", entry: [{time, changes: [{field: "media", value: {...}}]}]}`.
/// One draft per matching change; anything else is unrecognized.
pub fn match_event(body: &Value) -> MatchOutcome {
    if body.get("object").and_then(Value::as_str) != Some("instagram") {
        return MatchOutcome::Unrecognized;
    }

    let mut drafts = Vec::new();
    for entry in entries(body) {
        for change in changes(entry) {
            if change.get("field").and_then(Value::as_str) != Some("media") {
                continue;
            }
            let value = change.get("value");
            let data = json!({
                "mediaId": pick(value, "media_id"),
                "mediaType": pick(value, "media_type"),
                "timestamp": change
                    .get("time")
                    .or_else(|| entry.get("time"))
                    .cloned()
                    .unwrap_or(Value::Null),
            });
            drafts.push(AlertDraft::new(PLATFORM, MESSAGE, data));
        }
    }

    if drafts.is_empty() {
        MatchOutcome::Unrecognized
    } else {
        MatchOutcome::NewPosts(drafts)
    }
}

fn entries(body: &Value) -> impl Iterator<Item = &Value> {
    body.get("entry").and_then(Value::as_array).into_iter().flatten()
}

fn changes(entry: &Value) -> impl Iterator<Item = &Value> {
    entry.get("changes").and_then(Value::as_array).into_iter().flatten()
}

fn pick(value: Option<&Value>, key: &str) -> Value {
    value.and_then(|v| v.get(key)).cloned().unwrap_or(Value::Null)
}
