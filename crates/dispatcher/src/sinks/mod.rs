//! Sink implementations
//!
//! Contains FileSink (native run file or JSON lines) and LogSink.

mod file;
mod log;

pub use self::file::{FileSink, FileSinkConfig};
pub use self::log::LogSink;
