//! LLM chat-completion relay library.
//!
//! Accepts chat-completion requests, tags each with an agent role, forwards
//! it to one configured upstream and streams the answer back unchanged.
//! Every forwarded request leaves one telemetry record behind, queryable as
//! a per-agent summary or a CSV export.

pub mod admin;
pub mod config;
pub mod forwarding;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod telemetry;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
