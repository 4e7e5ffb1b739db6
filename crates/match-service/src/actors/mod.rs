//! Actor model for authoritative matches.
//!
//! ```text
//! LocalMatchRegistry (one per node)
//! ├── supervises N MatchActors
//! │   └── MatchActor (one per authoritative match)
//! │       └── owns its MatchLogic instance
//! └── bridges join/leave/kick/data calls onto actor mailboxes
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single consumer**: each match's logic only ever runs on its actor task
//! - **Never block producers**: enqueue is `try_send`; a full mailbox rejects joins
//!   and drops leave/data notifications
//! - **Timed join bridge**: oneshot reply raced against a 10 second timeout
//! - **Node affinity**: operations for another node's match are "not found"
//!
//! # Modules
//!
//! - [`registry`] - `LocalMatchRegistry`, the per-node match directory
//! - [`match_actor`] - `MatchActor` and its handle
//! - [`messages`] - Mailbox message types
//! - [`metrics`] - Mailbox monitoring and actor metrics

pub mod match_actor;
pub mod messages;
pub mod metrics;
pub mod registry;

// Re-export primary types
pub use match_actor::{MatchActor, MatchActorDeps, MatchActorHandle, DEFAULT_MAILBOX_CAPACITY};
pub use messages::*;
pub use metrics::{ActorMetrics, DropKind, MailboxLevel, MailboxMonitor};
pub use registry::{LocalMatchRegistry, JOIN_ATTEMPT_TIMEOUT};
