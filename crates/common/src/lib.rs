//! Common utilities and types shared across match service components.

#![warn(clippy::pedantic)]

/// Module for common data types
pub mod types;
