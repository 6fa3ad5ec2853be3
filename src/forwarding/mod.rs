//! Request forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! ForwardRequest (body bytes, headers, request id, agent)
//!     → engine.rs (outbound headers, dispatch, upstream deadline)
//!     → relay.rs (stream chunks to the caller, count bytes)
//!     → telemetry (one record per request, success or failure)
//! ```
//!
//! # Design Decisions
//! - Body is opaque: forwarded byte-for-byte, only its length is read
//! - Upstream status and headers are mirrored as soon as they arrive
//! - No retries; a failed exchange is reported, not repeated

pub mod engine;
pub mod relay;

pub use engine::{ForwardRequest, ForwardingEngine};
pub use relay::{RelayError, RelayOutcome};
