//! Tracks functions the tracer has decided to stop single-stepping
//! through, and persists the decision to a blacklist file in the same
//! format a human auditing the run would read.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::position::LineTable;

/// Every line number covered by the function whose code spans
/// `[start, end)`, derived from whichever line-table entries fall in
/// that range.
pub fn lines_of_function(table: &LineTable, start: u64, end: u64) -> HashSet<u32> {
    table
        .entries()
        .iter()
        .filter(|fl| fl.address >= start && fl.address < end)
        .map(|fl| fl.line)
        .collect()
}

/// Per-file sets of blacklisted line numbers, plus the writer that
/// append-logs each newly blacklisted function as it's decided.
pub struct Blacklist<W> {
    writer: W,
    by_file: HashMap<PathBuf, HashSet<u32>>,
}

impl<W: Write> Blacklist<W> {
    pub fn new(writer: W) -> Self {
        Blacklist {
            writer,
            by_file: HashMap::new(),
        }
    }

    pub fn contains(&self, filename: &Path, line: u32) -> bool {
        self.by_file
            .get(filename)
            .map(|lines| lines.contains(&line))
            .unwrap_or(false)
    }

    /// Records that `filename`'s `lines` are now off-limits, writing one
    /// line to the blacklist file in `relative/path: {1, 2, 3}` form.
    pub fn add(&mut self, filename: &Path, lines: HashSet<u32>) -> std::io::Result<()> {
        let mut sorted: Vec<u32> = lines.iter().copied().collect();
        sorted.sort_unstable();
        writeln!(
            self.writer,
            "{}: {:?}",
            filename.display(),
            sorted
        )?;
        self.writer.flush()?;
        self.by_file
            .entry(filename.to_path_buf())
            .or_default()
            .extend(lines);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::FileLine;

    #[test]
    fn lines_of_function_filters_by_address_range() {
        let table = LineTable::from_entries(vec![
            FileLine::new("a.c", 10, 0x1000),
            FileLine::new("a.c", 11, 0x1010),
            FileLine::new("a.c", 12, 0x2000),
        ]);
        let lines = lines_of_function(&table, 0x1000, 0x2000);
        assert_eq!(lines, HashSet::from([10, 11]));
    }

    #[test]
    fn add_persists_and_contains_reflects_it() {
        let mut bl = Blacklist::new(Vec::new());
        bl.add(Path::new("a.c"), HashSet::from([10, 11])).unwrap();
        assert!(bl.contains(Path::new("a.c"), 10));
        assert!(!bl.contains(Path::new("a.c"), 99));
        let written = String::from_utf8(bl.writer).unwrap();
        assert!(written.contains("a.c"));
    }
}
