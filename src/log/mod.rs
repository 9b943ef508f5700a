//! Leveled, non-blocking logging for the relay.
//!
//! Producers hold an `Arc<dyn LogSink>` and log through the `sink_*!` macros;
//! the process-wide [`logger::Logger`] drains messages on a worker thread.
pub mod log_level;
pub mod log_macros;
pub mod log_msg;
pub mod log_sink;
pub mod logger;
pub mod logger_handle;

pub use log_level::LogLevel;
pub use log_sink::{LogSink, NoopLogSink};
pub use logger::Logger;
pub use logger_handle::LoggerHandle;
