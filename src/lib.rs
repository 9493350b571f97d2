// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Asynchronous per-level logger for cooperative runtimes.
//!
//! Producing a record is wait-free in the common case: the message is
//! rendered into a thread-local scratch buffer and pushed onto a bounded
//! lock-free MPMC ring. When the ring is momentarily full, records spill
//! first into a small per-thread ring and then into an unbounded
//! mutex-guarded fallback queue, so bursts lose nothing. All I/O happens in
//! a single flush task that drains the queues in batches, groups records by
//! level, rotates file sinks at batch boundaries, and writes each level with
//! one syscall.
//!
//! ```no_run
//! use logrelay::{log_info, log_warn, LoggerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     logrelay::init(LoggerConfig::default()).expect("logger init");
//!
//!     log_info!("listening on port {}", 8080);
//!     log_warn!("slow request: {} ms", 17.4);
//!
//!     logrelay::shutdown();
//! }
//! ```

pub mod config;
mod entry;
mod flush;
pub mod format;
mod logger;
#[macro_use]
mod macros;
mod overflow;
mod queue;
mod sink;

pub use config::{ConfigError, LoggerConfig};
pub use entry::{Level, LogEntry, MAX_LINE};
pub use format::{render_fields, Loggable, Opaque};
pub use logger::{init, log, log_fmt, shutdown, stats, Logger, LoggerStats};
