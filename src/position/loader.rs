//! Builds a [`LineTable`] from a debugger's textual line-table dump, and
//! resolves a thread's current frame into a [`Position`].

use std::path::Path;

use tracing::trace;

use crate::adapter::DebuggerAdapter;

use super::{FileLine, LineTable, Position};

/// Parses `maintenance info line-table`-style output into a `LineTable`.
///
/// The dump is a sequence of per-object-file sections, each opening with
/// a `symtab:` line naming the source file the following rows belong to,
/// followed by whitespace-separated rows of `LINE  ADDRESS  ...`. Only
/// rows whose line number is nonzero are breakable; rows under files
/// outside `srcdir` are dropped, since the tracer only ever needs to stop
/// inside the program under test.
pub fn load_line_table(srcdir: &Path, raw_dump: &str) -> LineTable {
    let mut current_file: Option<String> = None;
    let mut entries = Vec::new();

    for raw_line in raw_dump.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with("INDEX") {
            continue;
        }
        if let Some(rest) = line.strip_prefix("symtab:") {
            current_file = Some(rest.trim().to_string());
            continue;
        }
        if line.starts_with("objfile:") {
            continue;
        }

        let Some(file) = current_file.as_ref() else {
            continue;
        };
        let mut cols = line.split_whitespace();
        let Some(lineno_str) = cols.next() else {
            continue;
        };
        let Ok(lineno) = lineno_str.parse::<u32>() else {
            continue;
        };
        if lineno == 0 {
            continue;
        }
        let Some(addr_str) = cols.next() else {
            continue;
        };
        let addr_str = addr_str.trim_start_matches("0x");
        let Ok(address) = u64::from_str_radix(addr_str, 16) else {
            continue;
        };

        let file_path = Path::new(file);
        if !file_path.starts_with(srcdir) {
            trace!(file, "dropping line-table entry outside configured source dir");
            continue;
        }
        entries.push(FileLine::new(file_path, lineno, address).relative_to(srcdir));
    }

    LineTable::from_entries(entries)
}

/// Walks the selected thread's call stack, newest frame first, resolving
/// the first frame whose source location is present in `table` into a
/// `Position`. Returns the position alongside how many frames had to be
/// walked past to find it (0 means the newest frame itself resolved);
/// callers use that depth to know how many `finish` commands would climb
/// back out to it. Falls back to a location-less `Position` at the
/// newest frame's raw PC when no frame resolves, so callers always get a
/// PC even when symbol information is missing.
pub fn thread_position(
    adapter: &mut dyn DebuggerAdapter,
    table: &LineTable,
    srcdir: &Path,
) -> (Position, usize) {
    let Some(mut frame) = adapter.newest_frame() else {
        return (Position::new(None, 0), 0);
    };
    let newest_pc = frame.pc;

    let mut level = 0;
    loop {
        if let Some((file, line)) = &frame.source_location {
            let rel = if file.starts_with(srcdir) {
                FileLine::new(file.as_path(), *line, frame.pc).relative_to(srcdir)
            } else {
                FileLine::new(file.as_path(), *line, frame.pc)
            };
            if let Some(resolved) = table.lookup(&rel.filename, rel.line) {
                return (Position::new(Some(resolved.clone()), newest_pc), level);
            }
        }
        match adapter.older_frame(&frame) {
            Some(older) => {
                frame = older;
                level += 1;
            }
            None => break,
        }
    }

    (Position::new(None, newest_pc), level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::fake::{FakeAdapter, ScriptedStep};
    use std::path::PathBuf;

    #[test]
    fn loads_entries_only_for_files_under_srcdir() {
        let dump = "\
objfile: /bin/a.out
symtab: /src/proj/a.c
10   0x401000
12   0x401010
symtab: /usr/include/stdio.h
4    0x500000
";
        let table = load_line_table(Path::new("/src/proj"), dump);
        assert_eq!(table.entries().len(), 2);
        assert_eq!(table.entries()[0].filename, PathBuf::from("a.c"));
    }

    #[test]
    fn resolves_newest_frame_when_its_location_is_breakable() {
        let table = load_line_table(
            Path::new("/src/proj"),
            "symtab: /src/proj/a.c\n10   0x401000\n",
        );
        let mut adapter = FakeAdapter::new();
        adapter.add_thread(
            1,
            vec![ScriptedStep::at("main", "/src/proj/a.c", 10, 0x401000)],
        );
        adapter.execute_with_timeout("step", std::time::Duration::from_secs(1));
        let (pos, level) = thread_position(&mut adapter, &table, Path::new("/src/proj"));
        assert!(pos.at_line_begin());
        assert_eq!(pos.file_line.unwrap().line, 10);
        assert_eq!(level, 0);
    }

    #[test]
    fn falls_back_to_pc_only_when_nothing_resolves() {
        let table = load_line_table(Path::new("/src/proj"), "");
        let mut adapter = FakeAdapter::new();
        adapter.add_thread(
            1,
            vec![ScriptedStep::at("main", "/src/proj/a.c", 10, 0x401000)],
        );
        adapter.execute_with_timeout("step", std::time::Duration::from_secs(1));
        let (pos, _level) = thread_position(&mut adapter, &table, Path::new("/src/proj"));
        assert!(pos.file_line.is_none());
        assert_eq!(pos.pc, 0x401000);
    }
}
