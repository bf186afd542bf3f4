pub mod adapter;
pub mod config;
pub mod error;
pub mod logging;
pub mod options;
pub mod position;
pub mod replayer;
pub mod trace_log;
pub mod tracer;

pub use error::{ConfigError, DebuggerError, Result, TraceError};
