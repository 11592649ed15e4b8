//! Snapshot-diff state for the polling fallback: which post ids this client
//! has already surfaced, when it last polled, and how many fetches in a row
//! have failed.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use super::snapshot::Post;

#[derive(Debug, Default)]
pub struct PollingState {
    seen: HashSet<String>,
    last_poll: Option<DateTime<Utc>>,
    error_count: u32,
}

impl PollingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff a snapshot against what was already surfaced. An item qualifies
    /// when its id is unseen AND it is newer than the last successful poll
    /// (first poll: newer than `first_window`, so historical content does
    /// not flood a fresh client). Qualifying ids are recorded, the poll time
    /// is stamped, and the error counter resets.
    pub fn apply_snapshot(
        &mut self,
        now: DateTime<Utc>,
        posts: Vec<Post>,
        first_window: Duration,
    ) -> Vec<Post> {
        let fresh: Vec<Post> = posts
            .into_iter()
            .filter(|post| {
                if self.seen.contains(&post.id) {
                    return false;
                }
                match self.last_poll {
                    Some(last) => post.timestamp > last,
                    None => now.signed_duration_since(post.timestamp) < first_window,
                }
            })
            .collect();

        for post in &fresh {
            self.seen.insert(post.id.clone());
        }
        self.last_poll = Some(now);
        self.error_count = 0;
        fresh
    }

    /// Bump and return the consecutive-error counter.
    pub fn record_error(&mut self) -> u32 {
        self.error_count += 1;
        self.error_count
    }

    pub fn reset(&mut self) {
        self.seen.clear();
        self.last_poll = None;
        self.error_count = 0;
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    pub fn last_poll(&self) -> Option<DateTime<Utc>> {
        self.last_poll
    }
}
