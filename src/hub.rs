//! hub.rs — in-memory pub/sub broker for normalized post alerts.
//!
//! Single owned instance, process-lifetime state. All mutation goes through
//! the operations below; the subscriber set and history buffer share one
//! coarse mutex, which is plenty at webhook rates.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// History keeps this many most-recent alerts; oldest evicted first.
pub const HISTORY_CAP: usize = 50;
/// New subscribers catch up with at most this many history alerts.
pub const CONNECT_BACKLOG: usize = 5;

const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Normalized notification record for one "new content" event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub platform: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    /// Provider-specific fragment; the hub passes it through uninterpreted.
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

/// Publish input. Every field is optional: the hub defaults what is missing
/// instead of rejecting the draft, since this is best-effort notification,
/// not a system of record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AlertDraft {
    pub platform: Option<String>,
    pub message: Option<String>,
    pub data: Option<Value>,
}

impl AlertDraft {
    pub fn new(platform: impl Into<String>, message: impl Into<String>, data: Value) -> Self {
        Self {
            platform: Some(platform.into()),
            message: Some(message.into()),
            data: Some(data),
        }
    }
}

/// What a live subscriber receives over its channel.
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// Catch-up slice delivered once right after subscribing, oldest first.
    History(Vec<Alert>),
    /// A freshly published alert.
    Alert(Alert),
}

/// Opaque registration token returned by [`AlertHub::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberHandle(u64);

impl SubscriberHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
struct HubInner {
    subscribers: HashMap<u64, mpsc::UnboundedSender<HubEvent>>,
    history: VecDeque<Alert>,
    next_subscriber_id: u64,
    next_alert_seq: u64,
    published_total: u64,
    last_timestamp: Option<DateTime<Utc>>,
}

/// The central broker: live subscriber set plus bounded alert history.
#[derive(Debug, Default)]
pub struct AlertHub {
    inner: Mutex<HubInner>,
}

impl AlertHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign id and timestamp, append to history, fan out to every live
    /// subscriber. Dead subscribers are pruned; one subscriber's failure
    /// never aborts delivery to the rest.
    pub fn publish(&self, draft: AlertDraft) -> Alert {
        let mut inner = self.inner.lock().expect("hub mutex poisoned");

        // Timestamps must never run backwards in publish order, even if the
        // wall clock does.
        let now = Utc::now();
        let ts = match inner.last_timestamp {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        inner.last_timestamp = Some(ts);

        let seq = inner.next_alert_seq;
        inner.next_alert_seq += 1;

        let platform = draft.platform.unwrap_or_else(|| "unknown".to_string());
        let alert = Alert {
            id: format!("alert_{}_{}", ts.timestamp_millis(), seq),
            message: draft
                .message
                .unwrap_or_else(|| format!("New {platform} post published!")),
            platform,
            kind: "new_post".to_string(),
            data: draft.data.unwrap_or_else(|| json!({})),
            timestamp: ts,
        };

        inner.history.push_back(alert.clone());
        if inner.history.len() > HISTORY_CAP {
            inner.history.pop_front();
        }
        inner.published_total += 1;

        inner.subscribers.retain(|id, tx| {
            let delivered = tx.send(HubEvent::Alert(alert.clone())).is_ok();
            if !delivered {
                tracing::debug!(subscriber = *id, "pruning dead subscriber");
            }
            delivered
        });

        counter!("alerts_published_total").increment(1);
        gauge!("relay_connected_clients").set(inner.subscribers.len() as f64);
        tracing::info!(
            platform = %alert.platform,
            subscribers = inner.subscribers.len(),
            "alert published"
        );

        alert
    }

    /// Register a live subscriber. The receiver immediately carries the last
    /// min(5, len) history alerts (oldest of that slice first) when history
    /// is non-empty, then every subsequent publish until unsubscribe.
    pub fn subscribe(&self) -> (SubscriberHandle, mpsc::UnboundedReceiver<HubEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().expect("hub mutex poisoned");

        let backlog = recent_slice(&inner.history, CONNECT_BACKLOG);
        if !backlog.is_empty() {
            let _ = tx.send(HubEvent::History(backlog));
        }

        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;
        inner.subscribers.insert(id, tx);
        gauge!("relay_connected_clients").set(inner.subscribers.len() as f64);

        (SubscriberHandle(id), rx)
    }

    /// Remove a subscriber. Idempotent: unknown or already-removed handles
    /// are a no-op.
    pub fn unsubscribe(&self, handle: SubscriberHandle) {
        let mut inner = self.inner.lock().expect("hub mutex poisoned");
        inner.subscribers.remove(&handle.0);
        gauge!("relay_connected_clients").set(inner.subscribers.len() as f64);
    }

    /// The most recent min(limit, len) alerts, oldest first. `limit`
    /// defaults to 10.
    pub fn history(&self, limit: Option<usize>) -> Vec<Alert> {
        let inner = self.inner.lock().expect("hub mutex poisoned");
        recent_slice(&inner.history, limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
    }

    pub fn connected_clients(&self) -> usize {
        self.inner.lock().expect("hub mutex poisoned").subscribers.len()
    }

    /// Alerts currently retained in history (capped at [`HISTORY_CAP`]).
    pub fn stored_alerts(&self) -> usize {
        self.inner.lock().expect("hub mutex poisoned").history.len()
    }

    /// Alerts published over the process lifetime, including evicted ones.
    pub fn published_total(&self) -> u64 {
        self.inner.lock().expect("hub mutex poisoned").published_total
    }
}

fn recent_slice(history: &VecDeque<Alert>, limit: usize) -> Vec<Alert> {
    let skip = history.len().saturating_sub(limit);
    history.iter().skip(skip).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_defaults_missing_fields() {
        let hub = AlertHub::new();
        let alert = hub.publish(AlertDraft::default());
        assert_eq!(alert.platform, "unknown");
        assert_eq!(alert.kind, "new_post");
        assert_eq!(alert.message, "New unknown post published!");
        assert_eq!(alert.data, json!({}));
    }

    #[test]
    fn publish_passes_data_through_uninterpreted() {
        let hub = AlertHub::new();
        let data = json!({"nested": {"k": [1, 2, 3]}});
        let alert = hub.publish(AlertDraft::new("instagram", "hi", data.clone()));
        assert_eq!(alert.data, data);
    }

    #[test]
    fn timestamps_are_non_decreasing_and_ids_unique() {
        let hub = AlertHub::new();
        let mut last: Option<DateTime<Utc>> = None;
        let mut ids = std::collections::HashSet::new();
        for i in 0..100 {
            let a = hub.publish(AlertDraft::new(format!("p{i}"), "m", json!({})));
            if let Some(prev) = last {
                assert!(a.timestamp >= prev);
            }
            last = Some(a.timestamp);
            assert!(ids.insert(a.id));
        }
    }

    #[test]
    fn history_slice_is_oldest_first() {
        let hub = AlertHub::new();
        for i in 0..3 {
            hub.publish(AlertDraft::new(format!("p{i}"), "m", json!({})));
        }
        let hist = hub.history(Some(2));
        assert_eq!(hist.len(), 2);
        assert_eq!(hist[0].platform, "p1");
        assert_eq!(hist[1].platform, "p2");
    }
}
