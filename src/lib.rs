// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod hub;
pub mod live;
pub mod metrics;
pub mod webhooks;

// Consumer-side delivery strategy (live push + polling fallback)
pub mod delivery;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::hub::{Alert, AlertDraft, AlertHub, SubscriberHandle};

// Re-export the delivery types for easy use in bins/tests
pub use crate::delivery::{DeliveryConfig, DeliveryEvent, DeliveryMode, DeliveryStrategy};
