//! Observability module for the match service.
//!
//! # Privacy by Default
//!
//! Actor run loops and the join bridge use `#[instrument(skip_all)]` with an
//! explicit field allow-list. Usernames and payloads are never logged or used
//! as metric labels.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `ms_matches_active` | Gauge | none | Registered authoritative matches |
//! | `ms_join_attempts_total` | Counter | `outcome` | Join bridge results |
//! | `ms_join_latency_seconds` | Histogram | none | Join bridge wait time |
//! | `ms_messages_dropped_total` | Counter | `kind` | Mailbox backpressure drops |
//! | `ms_actor_panics_total` | Counter | none | Match logic panics |
//! | `ms_relay_messages_total` | Counter | `result` | Relayed data routing decisions |
//! | `ms_router_drops_total` | Counter | none | Envelopes lost to full session queues |

pub mod health;
pub mod metrics;

// Re-exports for convenience
pub use health::{health_router, HealthState, ReadinessReport};
pub use metrics::{
    init_metrics_recorder, record_actor_panic, record_join_attempt, record_message_dropped,
    record_relay_message, record_router_drop, set_matches_active,
};
