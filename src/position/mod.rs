//! `(file, line)` data model shared by the tracer and the replayer.
//!
//! A `FileLine` compares and hashes on `(filename, line)` only, a frozen
//! sorted `LineTable` answers the `break_position` oracle via binary
//! search, and `ThreadPos` is the wire record shared by the trace log and
//! the PC log.

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use strum::{Display, EnumString};

mod loader;
pub use loader::{load_line_table, thread_position};

/// A breakable source point: `(filename, line)`, plus the resolved PC of
/// the line's first instruction as metadata.
///
/// Equality and ordering only ever look at `filename`/`line` — `address`
/// is carried for convenience but never compared, matching `FileLine`'s
/// Python `__eq__`/`__lt__`/`__hash__`.
#[derive(Clone, Debug)]
pub struct FileLine {
    pub filename: PathBuf,
    pub line: u32,
    pub address: u64,
}

impl FileLine {
    pub fn new(filename: impl Into<PathBuf>, line: u32, address: u64) -> Self {
        FileLine {
            filename: filename.into(),
            line,
            address,
        }
    }

    /// A lookup key with no resolved address; only `filename`/`line`
    /// participate in comparisons, so `address` can be anything.
    pub fn key(filename: impl Into<PathBuf>, line: u32) -> Self {
        FileLine::new(filename, line, 0)
    }

    /// Returns this FileLine with `filename` made relative to `srcdir`.
    ///
    /// Normalization happens exactly once, at ingest: every FileLine that
    /// leaves this module (log records, blacklist entries) is relative to
    /// `srcdir`, so later comparisons never have to reconcile relative and
    /// absolute forms of the same path.
    pub fn relative_to(&self, srcdir: &Path) -> FileLine {
        let rel = self
            .filename
            .strip_prefix(srcdir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| self.filename.clone());
        FileLine::new(rel, self.line, self.address)
    }
}

impl PartialEq for FileLine {
    fn eq(&self, other: &Self) -> bool {
        self.filename == other.filename && self.line == other.line
    }
}
impl Eq for FileLine {}

impl PartialOrd for FileLine {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FileLine {
    fn cmp(&self, other: &Self) -> Ordering {
        self.filename
            .cmp(&other.filename)
            .then(self.line.cmp(&other.line))
    }
}

impl std::hash::Hash for FileLine {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.filename.hash(state);
        self.line.hash(state);
    }
}

impl fmt::Display for FileLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.filename.display(), self.line)
    }
}

/// Where within a source line a thread has stopped.
///
/// `After` is reserved and never produced by the tracer; it still parses
/// from the wire format so that a `ThreadPos` carrying it is rejected by
/// the consumer that enforces the invariant, rather than by the parser
/// silently discarding otherwise-well-formed input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
pub enum LineLoc {
    #[strum(serialize = "=")]
    Before,
    #[strum(serialize = ">")]
    Middle,
    #[strum(serialize = "-")]
    After,
}

/// A thread's resolved location: the FileLine it currently maps to (if
/// any) and its raw program counter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Position {
    pub file_line: Option<FileLine>,
    pub pc: u64,
}

impl Position {
    pub fn new(file_line: Option<FileLine>, pc: u64) -> Self {
        Position { file_line, pc }
    }

    /// `file_line ≠ none ∧ pc == file_line.address`.
    pub fn at_line_begin(&self) -> bool {
        match &self.file_line {
            Some(fl) => self.pc == fl.address,
            None => false,
        }
    }
}

/// `(tid, line_loc, file_line)` — the wire record shared by the trace log
/// and the replayer's input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadPos {
    pub tid: u32,
    pub line_loc: LineLoc,
    pub file_line: Option<FileLine>,
}

impl ThreadPos {
    pub fn new(tid: u32, line_loc: LineLoc, file_line: Option<FileLine>) -> Self {
        ThreadPos {
            tid,
            line_loc,
            file_line,
        }
    }
}

impl fmt::Display for ThreadPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file_line {
            Some(fl) => write!(f, "{} {} {}", self.tid, self.line_loc, fl),
            None => write!(f, "{} {} None", self.tid, self.line_loc),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseThreadPosError {
    #[error("malformed trace line: {0:?}")]
    Malformed(String),
    #[error("bad tid in trace line: {0:?}")]
    BadTid(String),
    #[error("bad line_loc in trace line: {0:?}")]
    BadLineLoc(String),
    #[error("bad line number in trace line: {0:?}")]
    BadLineNumber(String),
}

impl FromStr for ThreadPos {
    type Err = ParseThreadPosError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let mut parts = line.splitn(3, ' ');
        let tid_str = parts
            .next()
            .ok_or_else(|| ParseThreadPosError::Malformed(line.to_string()))?;
        let loc_str = parts
            .next()
            .ok_or_else(|| ParseThreadPosError::Malformed(line.to_string()))?;
        let rest = parts
            .next()
            .ok_or_else(|| ParseThreadPosError::Malformed(line.to_string()))?;

        let tid: u32 = tid_str
            .parse()
            .map_err(|_| ParseThreadPosError::BadTid(tid_str.to_string()))?;
        let line_loc = LineLoc::from_str(loc_str)
            .map_err(|_| ParseThreadPosError::BadLineLoc(loc_str.to_string()))?;

        let file_line = if rest == "None" {
            None
        } else {
            let (filename, lineno) = rest
                .rsplit_once(':')
                .ok_or_else(|| ParseThreadPosError::Malformed(line.to_string()))?;
            let lineno: u32 = lineno
                .parse()
                .map_err(|_| ParseThreadPosError::BadLineNumber(lineno.to_string()))?;
            Some(FileLine::key(filename, lineno))
        };

        Ok(ThreadPos::new(tid, line_loc, file_line))
    }
}

/// The frozen, sorted, deduplicated set of breakable `(file, line)`
/// points inside the configured source directory.
#[derive(Clone, Debug)]
pub struct LineTable {
    entries: Vec<FileLine>,
}

impl LineTable {
    /// Builds a table from already-filtered `(filename, line, address)`
    /// triples, sorting and deduplicating on `(filename, line)`.
    pub fn from_entries(mut entries: Vec<FileLine>) -> Self {
        entries.sort();
        entries.dedup_by(|a, b| a == b);
        LineTable { entries }
    }

    pub fn entries(&self) -> &[FileLine] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The canonical "what source point would a breakpoint at
    /// `file:line` actually bind to" oracle: the smallest table entry
    /// that is `>= key` under `(filename, line)` ordering, or `None` past
    /// the end.
    pub fn break_position(&self, key: &FileLine) -> Option<&FileLine> {
        let idx = self.entries.partition_point(|e| e < key);
        self.entries.get(idx)
    }

    /// Exact `(filename, line)` lookup, used by `thread_position` to test
    /// whether a given frame's source location is breakable.
    pub fn lookup(&self, filename: &Path, line: u32) -> Option<&FileLine> {
        let key = FileLine::key(filename, line);
        self.entries
            .binary_search(&key)
            .ok()
            .map(|idx| &self.entries[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fl(name: &str, line: u32) -> FileLine {
        FileLine::new(name, line, line as u64 * 16)
    }

    #[test]
    fn file_line_equality_ignores_address() {
        let a = FileLine::new("a.c", 10, 100);
        let b = FileLine::new("a.c", 10, 999);
        assert_eq!(a, b);
    }

    #[test]
    fn file_line_ordering_is_filename_then_line() {
        assert!(fl("a.c", 20) < fl("b.c", 1));
        assert!(fl("a.c", 1) < fl("a.c", 20));
    }

    #[test]
    fn line_table_sorts_and_dedups() {
        let table = LineTable::from_entries(vec![
            fl("b.c", 5),
            fl("a.c", 10),
            fl("a.c", 10),
            fl("a.c", 1),
        ]);
        assert_eq!(table.entries().len(), 3);
        assert!(table.entries().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn break_position_is_monotone_and_idempotent() {
        let table = LineTable::from_entries(vec![fl("a.c", 5), fl("a.c", 10), fl("a.c", 20)]);
        let x = FileLine::key("a.c", 7);
        let y = FileLine::key("a.c", 15);
        let bx = table.break_position(&x).cloned();
        let by = table.break_position(&y).cloned();
        assert!(bx <= by);
        assert_eq!(
            table.break_position(bx.as_ref().unwrap()).cloned(),
            bx
        );
        assert_eq!(table.break_position(&FileLine::key("a.c", 25)), None);
    }

    #[test]
    fn thread_pos_display_roundtrips() {
        let tp = ThreadPos::new(3, LineLoc::Before, Some(fl("a.c", 42)));
        let rendered = tp.to_string();
        let parsed: ThreadPos = rendered.parse().unwrap();
        assert_eq!(parsed.tid, tp.tid);
        assert_eq!(parsed.line_loc, tp.line_loc);
        assert_eq!(parsed.file_line.as_ref().unwrap().line, 42);
    }

    #[test]
    fn thread_pos_none_file_line_roundtrips() {
        let tp = ThreadPos::new(1, LineLoc::Middle, None);
        let parsed: ThreadPos = tp.to_string().parse().unwrap();
        assert_eq!(parsed, tp);
    }

    #[test]
    fn after_line_loc_parses_but_is_rejected_by_callers() {
        let parsed: ThreadPos = "1 - None".parse().unwrap();
        assert_eq!(parsed.line_loc, LineLoc::After);
    }
}
