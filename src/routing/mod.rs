//! Request classification.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path, query)
//!     → agent.rs (parse `agent` query parameter)
//!     → AgentTag (always produced, defaults on unknown input)
//! ```
//!
//! # Design Decisions
//! - Pure function, no state
//! - Path choice never affects classification; every proxy path forwards
//!   to the same upstream

pub mod agent;

pub use agent::{classify, AgentTag, UnknownAgent};
