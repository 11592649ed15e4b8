//! Consumer-side delivery strategy: keep a live push connection when the
//! relay is reachable, transparently fall back to interval polling when it
//! is not, and hand the UI one consistent feed of typed events either way.
//!
//! The strategy is an owned component with an explicit lifecycle: `start`,
//! `reset`, `stop`. Stopping cancels the supervisor task outright, so no
//! callback fires after teardown.

pub mod live;
pub mod polling;
pub mod snapshot;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::hub::Alert;
use crate::live::LiveFrame;
use live::LiveChannel;
use polling::PollingState;
use snapshot::{Post, SnapshotSource};

/// Delivery mode as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Disconnected,
    Connecting,
    Live,
    Polling,
    /// Polling gave up after too many consecutive errors; only an explicit
    /// reset resumes it.
    Failed,
}

/// Typed events delivered to registered listeners.
#[derive(Debug, Clone)]
pub enum DeliveryEvent {
    Connection { connected: bool },
    History(Vec<Alert>),
    NewAlert(Alert),
    PollSuccess { new_posts: usize, checked: usize },
    PollError { error: String, error_count: u32 },
    PollingStarted { interval: Duration },
    PollingStopped,
    PollingFailed { error_count: u32 },
}

/// Opaque registration token; removal is safe to call redundantly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

type Callback = Box<dyn Fn(&DeliveryEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    inner: Mutex<HashMap<u64, Callback>>,
    next_id: AtomicU64,
}

impl Listeners {
    fn add(&self, cb: Callback) -> ListenerToken {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().expect("listeners mutex poisoned").insert(id, cb);
        ListenerToken(id)
    }

    fn remove(&self, token: ListenerToken) {
        self.inner.lock().expect("listeners mutex poisoned").remove(&token.0);
    }

    fn emit(&self, event: &DeliveryEvent) {
        let inner = self.inner.lock().expect("listeners mutex poisoned");
        for cb in inner.values() {
            cb(event);
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub poll_interval: Duration,
    /// How long live-channel establishment may take before we fall back.
    pub connect_grace: Duration,
    pub max_poll_errors: u32,
    /// On the first poll after start/reset, only items newer than this
    /// window qualify, so a fresh client is not flooded with old content.
    pub first_poll_window: chrono::Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            connect_grace: Duration::from_secs(10),
            max_poll_errors: 5,
            first_poll_window: chrono::Duration::hours(1),
        }
    }
}

impl DeliveryConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: env_secs("POLL_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            connect_grace: env_secs("LIVE_CONNECT_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_grace),
            ..defaults
        }
    }
}

fn env_secs(var: &str) -> Option<u64> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

/// Snapshot of the strategy's observable state.
#[derive(Debug, Clone)]
pub struct DeliveryStatus {
    pub mode: DeliveryMode,
    pub error_count: u32,
    pub seen_posts: usize,
    pub last_poll: Option<DateTime<Utc>>,
}

struct Shared {
    mode: Mutex<DeliveryMode>,
    polling: Mutex<PollingState>,
}

impl Shared {
    fn new() -> Self {
        Self {
            mode: Mutex::new(DeliveryMode::Disconnected),
            polling: Mutex::new(PollingState::new()),
        }
    }

    fn set_mode(&self, mode: DeliveryMode) {
        *self.mode.lock().expect("mode mutex poisoned") = mode;
    }

    fn mode(&self) -> DeliveryMode {
        *self.mode.lock().expect("mode mutex poisoned")
    }

    fn clear_polling(&self) {
        self.polling.lock().expect("polling mutex poisoned").reset();
    }
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Reset,
}

struct Running {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

pub struct DeliveryStrategy {
    live: Arc<dyn LiveChannel>,
    snapshot: Arc<dyn SnapshotSource>,
    config: DeliveryConfig,
    listeners: Arc<Listeners>,
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl DeliveryStrategy {
    pub fn new(
        live: Arc<dyn LiveChannel>,
        snapshot: Arc<dyn SnapshotSource>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            live,
            snapshot,
            config,
            listeners: Arc::new(Listeners::default()),
            shared: Arc::new(Shared::new()),
            running: Mutex::new(None),
        }
    }

    pub fn on_event(&self, cb: impl Fn(&DeliveryEvent) + Send + Sync + 'static) -> ListenerToken {
        self.listeners.add(Box::new(cb))
    }

    pub fn remove_listener(&self, token: ListenerToken) {
        self.listeners.remove(token);
    }

    pub fn mode(&self) -> DeliveryMode {
        self.shared.mode()
    }

    pub fn status(&self) -> DeliveryStatus {
        let polling = self.shared.polling.lock().expect("polling mutex poisoned");
        DeliveryStatus {
            mode: self.shared.mode(),
            error_count: polling.error_count(),
            seen_posts: polling.seen_len(),
            last_poll: polling.last_poll(),
        }
    }

    /// Spawn the supervisor task. A second call while running is a no-op.
    pub fn start(&self) {
        let mut running = self.running.lock().expect("running mutex poisoned");
        if running.is_some() {
            tracing::debug!("delivery strategy already started");
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(supervise(
            self.live.clone(),
            self.snapshot.clone(),
            self.config.clone(),
            self.listeners.clone(),
            self.shared.clone(),
            rx,
        ));
        *running = Some(Running { commands: tx, task });
    }

    /// Clear the seen-set and error counter; when running, also force an
    /// immediate out-of-band check (and revive a failed polling session).
    pub fn reset(&self) {
        self.shared.clear_polling();
        let running = self.running.lock().expect("running mutex poisoned");
        if let Some(run) = running.as_ref() {
            let _ = run.commands.send(Command::Reset);
        }
    }

    /// Cancel the supervisor task. Nothing is scheduled and no listener
    /// fires after this returns. Idempotent.
    pub fn stop(&self) {
        let Some(run) = self.running.lock().expect("running mutex poisoned").take() else {
            return;
        };
        run.task.abort();

        match self.shared.mode() {
            DeliveryMode::Live => {
                self.listeners.emit(&DeliveryEvent::Connection { connected: false });
            }
            DeliveryMode::Polling => {
                self.listeners.emit(&DeliveryEvent::PollingStopped);
            }
            _ => {}
        }
        self.shared.clear_polling();
        self.shared.set_mode(DeliveryMode::Disconnected);
    }
}

impl Drop for DeliveryStrategy {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            if let Some(run) = running.take() {
                run.task.abort();
            }
        }
    }
}

async fn supervise(
    live: Arc<dyn LiveChannel>,
    snapshot: Arc<dyn SnapshotSource>,
    config: DeliveryConfig,
    listeners: Arc<Listeners>,
    shared: Arc<Shared>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    shared.set_mode(DeliveryMode::Connecting);

    let feed = match tokio::time::timeout(config.connect_grace, live.connect()).await {
        Ok(Ok(rx)) => Some(rx),
        Ok(Err(err)) => {
            tracing::warn!(error = %format!("{err:#}"), "live channel failed, falling back to polling");
            None
        }
        Err(_) => {
            tracing::warn!(
                grace_secs = config.connect_grace.as_secs_f64(),
                "live channel timed out, falling back to polling"
            );
            None
        }
    };

    if let Some(mut rx) = feed {
        shared.set_mode(DeliveryMode::Live);
        listeners.emit(&DeliveryEvent::Connection { connected: true });

        loop {
            tokio::select! {
                frame = rx.recv() => match frame {
                    Some(LiveFrame::Connected { message, .. }) => {
                        tracing::debug!(%message, "live channel confirmed");
                    }
                    Some(LiveFrame::PostHistory(alerts)) => {
                        listeners.emit(&DeliveryEvent::History(alerts));
                    }
                    Some(LiveFrame::NewPost(alert)) => {
                        listeners.emit(&DeliveryEvent::NewAlert(alert));
                    }
                    None => break,
                },
                cmd = commands.recv() => match cmd {
                    Some(Command::Reset) => shared.clear_polling(),
                    None => return,
                },
            }
        }

        listeners.emit(&DeliveryEvent::Connection { connected: false });
        tracing::warn!("live channel lost, falling back to polling");
    }

    run_polling(snapshot, config, listeners, shared, &mut commands).await;
}

async fn run_polling(
    snapshot: Arc<dyn SnapshotSource>,
    config: DeliveryConfig,
    listeners: Arc<Listeners>,
    shared: Arc<Shared>,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) {
    'session: loop {
        shared.set_mode(DeliveryMode::Polling);
        listeners.emit(&DeliveryEvent::PollingStarted {
            interval: config.poll_interval,
        });

        // The first tick fires immediately: an initial check on activation.
        let mut ticker = tokio::time::interval(config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let escalated = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(error_count) =
                        poll_once(&*snapshot, &config, &listeners, &shared).await
                    {
                        break error_count;
                    }
                }
                cmd = commands.recv() => match cmd {
                    Some(Command::Reset) => {
                        shared.clear_polling();
                        ticker.reset_immediately();
                    }
                    None => return,
                },
            }
        };

        listeners.emit(&DeliveryEvent::PollingStopped);
        shared.set_mode(DeliveryMode::Failed);
        listeners.emit(&DeliveryEvent::PollingFailed {
            error_count: escalated,
        });
        tracing::error!(error_count = escalated, "too many polling errors, giving up");

        // Parked: no timer is scheduled; only a reset resumes the session.
        loop {
            match commands.recv().await {
                Some(Command::Reset) => {
                    shared.clear_polling();
                    continue 'session;
                }
                None => return,
            }
        }
    }
}

/// One poll tick. Returns `Some(error_count)` when consecutive failures
/// just reached the cap and polling must stop.
async fn poll_once(
    snapshot: &dyn SnapshotSource,
    config: &DeliveryConfig,
    listeners: &Listeners,
    shared: &Shared,
) -> Option<u32> {
    match snapshot.fetch_posts().await {
        Ok(posts) => {
            let now = Utc::now();
            let checked = posts.len();
            let fresh = {
                let mut state = shared.polling.lock().expect("polling mutex poisoned");
                state.apply_snapshot(now, posts, config.first_poll_window)
            };

            if !fresh.is_empty() {
                tracing::info!(count = fresh.len(), "new posts detected via polling");
            }
            for post in &fresh {
                listeners.emit(&DeliveryEvent::NewAlert(synthesize_alert(post, now)));
            }
            listeners.emit(&DeliveryEvent::PollSuccess {
                new_posts: fresh.len(),
                checked,
            });
            None
        }
        Err(err) => {
            let error_count = {
                let mut state = shared.polling.lock().expect("polling mutex poisoned");
                state.record_error()
            };
            tracing::warn!(
                error = %format!("{err:#}"),
                error_count,
                max = config.max_poll_errors,
                "snapshot fetch failed"
            );
            listeners.emit(&DeliveryEvent::PollError {
                error: format!("{err:#}"),
                error_count,
            });
            (error_count >= config.max_poll_errors).then_some(error_count)
        }
    }
}

/// A client-local stand-in for what the hub would have pushed.
fn synthesize_alert(post: &Post, now: DateTime<Utc>) -> Alert {
    Alert {
        id: format!("polling_{}", post.id),
        platform: post.platform.clone(),
        kind: "new_post_polling".to_string(),
        message: format!("New {} post detected via polling!", post.platform),
        data: serde_json::to_value(post).unwrap_or_default(),
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_removal_is_idempotent() {
        let listeners = Listeners::default();
        let hits = Arc::new(AtomicU64::new(0));
        let h = hits.clone();
        let token = listeners.add(Box::new(move |_| {
            h.fetch_add(1, Ordering::Relaxed);
        }));

        listeners.emit(&DeliveryEvent::PollingStopped);
        listeners.remove(token);
        listeners.remove(token);
        listeners.emit(&DeliveryEvent::PollingStopped);

        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn synthesized_alert_carries_post_identity() {
        let post = Post {
            id: "instagram_9".to_string(),
            platform: "instagram".to_string(),
            content: "hello".to_string(),
            timestamp: Utc::now(),
            link: None,
        };
        let alert = synthesize_alert(&post, Utc::now());
        assert_eq!(alert.id, "polling_instagram_9");
        assert_eq!(alert.kind, "new_post_polling");
        assert_eq!(alert.data["id"], "instagram_9");
    }
}
