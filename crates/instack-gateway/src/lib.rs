//! HTTP and WebSocket surface for instack install jobs.
//!
//! Exposes job start endpoints, log history and status queries, and a
//! WebSocket transport that attaches each connection to a live log stream.

pub mod install_log_gateway;

pub use install_log_gateway::*;
