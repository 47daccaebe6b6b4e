//! Install job execution and live log streaming for instack.
//!
//! Runs install/uninstall scripts as child processes, tails their log files
//! and fans parsed lines out to any number of attached observers.

pub mod job_runner;
pub mod job_store;
mod locks;
pub mod log_message;
pub mod log_sink;
pub mod log_stream;
pub mod script_resolver;
pub mod stream_registry;
pub mod tail_monitor;

pub use job_runner::*;
pub use job_store::*;
pub use log_message::*;
pub use log_sink::*;
pub use log_stream::*;
pub use script_resolver::*;
pub use stream_registry::*;
pub use tail_monitor::*;
