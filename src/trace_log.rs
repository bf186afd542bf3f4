//! Reads a trace log written by the tracer back into the sequence of
//! [`ThreadPos`] records the replayer drives from.

use std::path::Path;

use tracing::warn;

use crate::error::{ConfigError, TraceError};
use crate::position::ThreadPos;

/// Parses every line of `path` as a `ThreadPos`, skipping lines that
/// don't parse (blank trailing lines, stray whitespace) rather than
/// failing the whole read — a single scuffed line shouldn't lose an
/// otherwise-usable recording.
pub fn read_log(path: &Path) -> Result<Vec<ThreadPos>, TraceError> {
    let text = std::fs::read_to_string(path).map_err(|source| {
        TraceError::Config(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    })?;
    let mut out = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.parse::<ThreadPos>() {
            Ok(tpos) => out.push(tpos),
            Err(e) => warn!(lineno = lineno + 1, error = %e, "skipping unparseable trace log line"),
        }
    }
    Ok(out)
}
