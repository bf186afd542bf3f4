use std::path::PathBuf;

/// Errors surfaced while loading or validating a run's JSON configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required config key: {0}")]
    MissingKey(&'static str),
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("`cmd` must contain at least the executable path")]
    EmptyCommand,
}

/// Error surfaced by a [`crate::adapter::DebuggerAdapter`] method — the
/// boundary's typed error rather than a bare `String`, so callers can
/// match on it (or let it escalate via `From`) instead of parsing text.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct DebuggerError(pub String);

impl From<String> for DebuggerError {
    fn from(message: String) -> Self {
        DebuggerError(message)
    }
}

impl From<&str> for DebuggerError {
    fn from(message: &str) -> Self {
        DebuggerError(message.to_string())
    }
}

/// Top-level error type for both the tracer and the replayer binaries.
///
/// Step timeouts that the tracer/replayer can recover from on their own
/// (`StepOutcome`, see `adapter::StepOutcome`) are not variants here —
/// they stay soft outcomes handled inline. A `TraceError` is only ever
/// produced at the handful of places that are genuinely fatal: the
/// debugger session itself failing (`DebuggerUnavailable`), a malformed
/// record read back from a trace log (`InvalidLogRecord`), and a
/// timeout inside `Replayer::run_until` (`ReplayTimeout`) — silently
/// mis-replaying past a point it couldn't actually reach is worse than
/// stopping.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("debugger unavailable: {0}")]
    DebuggerUnavailable(#[from] DebuggerError),

    #[error("invalid log record: {0}")]
    InvalidLogRecord(String),

    #[error("timeout waiting to reach {file_line} during replay")]
    ReplayTimeout { file_line: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TraceError>;
