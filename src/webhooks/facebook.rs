//! Facebook page-feed subscription payloads.

use serde_json::{json, Value};

use super::MatchOutcome;
use crate::hub::AlertDraft;

pub const PLATFORM: &str = "facebook";
const MESSAGE: &str = "New Facebook post published!";

/// Matches the page-feed subscription shape:
/// `{object: "page", entry: [{time, changes: [{field: "feed", value: {...}}]}]}`.
pub fn match_event(body: &Value) -> MatchOutcome {
    if body.get("object").and_then(Value::as_str) != Some("page") {
        return MatchOutcome::Unrecognized;
    }

    let mut drafts = Vec::new();
    for entry in body.get("entry").and_then(Value::as_array).into_iter().flatten() {
        for change in entry
            .get("changes")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            if change.get("field").and_then(Value::as_str) != Some("feed") {
                continue;
            }
            let value = change.get("value");
            let data = json!({
                "postId": value.and_then(|v| v.get("post_id")).cloned().unwrap_or(Value::Null),
                "message": value.and_then(|v| v.get("message")).cloned().unwrap_or(Value::Null),
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
