//! Match Service Library
//!
//! Runtime for realtime multiplayer matches on a single node:
//!
//! - Authoritative matches, each driven by one actor that owns its game logic
//! - Relayed matches, which are nothing but a labelled group of presences
//! - A node-local registry bridging join/leave/kick/data calls onto actors
//! - The pipeline that routes client match envelopes down either path
//!
//! # Architecture
//!
//! ```text
//! client envelope
//!   └── MatchPipeline
//!       ├── relayed ──► Tracker (membership) ──► MessageRouter (fan-out)
//!       └── authoritative ──► LocalMatchRegistry ──► MatchActor mailbox
//!                                                    └── MatchLogic callbacks
//! ```
//!
//! # Modules
//!
//! - [`actors`] - Match actors, the registry, mailbox monitoring
//! - [`pipeline`] - Client envelope handling and relayed data routing
//! - [`logic`] - The match logic seam and built-in modules
//! - [`tracker`] / [`router`] - Presence and delivery collaborators
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with client error codes

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod actors;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod identifier;
pub mod logic;
pub mod observability;
pub mod pipeline;
pub mod presence;
pub mod router;
pub mod session;
pub mod tracker;
