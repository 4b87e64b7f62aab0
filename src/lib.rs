//! Tracewatch - follow a single request through a remote gateway pipeline in real time
//!
//! The gateway publishes a status notification for each pipeline stage of a
//! traced request. This library turns that stream into one authoritative,
//! monotonically progressing view of the trace:
//! - Stage vocabulary, trace state, and channel message parsing (`models`)
//! - The reconciliation store that merges stage events (`store`)
//! - The subscription manager that owns the single active channel (`subscription`)
//! - WebSocket and recorded-stream transports (`transport`)
//! - Configuration from `~/.tracewatch/rc` (`config`)
//! - CLI command parsing, execution, and rendering (`cli`)
//!
//! # Example
//!
//! ```no_run
//! use tracewatch::cli::run;
//!
//! fn main() {
//!     if let Err(e) = run() {
//!         eprintln!("Error: {}", e);
//!         std::process::exit(1);
//!     }
//! }
//! ```

pub mod models;
pub mod store;
pub mod subscription;
pub mod transport;
pub mod config;
pub mod cli;
pub mod utils;
