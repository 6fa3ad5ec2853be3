//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound body read:
//!     → timeouts.rs (client idle clock per chunk)
//! Request to upstream:
//!     → timeouts.rs (upstream deadline from dispatch to stream end)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external wait has a bound
//! - No retries: chat completions are not idempotent
//! - Cancellation is a hard abort of the outbound connection

pub mod timeouts;

pub use timeouts::{TimeoutKind, TimeoutPolicy};
