use std::path::{Path, PathBuf};
use std::time::Duration;

use jdb_trace::adapter::fake::{FakeAdapter, ScriptedStep};
use jdb_trace::position::{FileLine, LineLoc, ThreadPos};
use jdb_trace::replayer::Replayer;

fn line_table() -> &'static str {
    "symtab: /src/proj/a.c\n10   0x1000\n11   0x1010\n12   0x1020\n"
}

#[test]
fn middle_to_middle_on_the_same_line_runs_finish() {
    let mut adapter = FakeAdapter::new();
    adapter.set_line_table_dump(line_table());
    adapter.add_thread(
        1,
        vec![
            ScriptedStep::at("inner", "/src/proj/a.c", 11, 0x1011),
            ScriptedStep::at("outer", "/src/proj/a.c", 11, 0x1010),
        ],
    );
    let mut replayer = Replayer::new(
        Box::new(adapter),
        PathBuf::from("/src/proj"),
        Duration::from_secs(1),
        Vec::new(),
    );
    replayer.start(Path::new("a.out"), &[]).unwrap();

    // First record puts the thread in the Middle state at a.c:11.
    let tpos1 = ThreadPos::new(1, LineLoc::Middle, Some(FileLine::key("a.c", 11)));
    replayer.process_one(tpos1).unwrap();

    // A second Middle record at the same resolved breakpoint should
    // drive a `finish` rather than a fresh `continue`-to-breakpoint.
    let tpos2 = ThreadPos::new(1, LineLoc::Middle, Some(FileLine::key("a.c", 11)));
    assert!(replayer.process_one(tpos2).is_ok());
}

#[test]
fn replaying_an_exited_thread_is_a_no_op() {
    let mut adapter = FakeAdapter::new();
    adapter.set_line_table_dump(line_table());
    adapter.add_thread(1, vec![ScriptedStep::at("main", "/src/proj/a.c", 10, 0x1000)]);
    let mut replayer = Replayer::new(
        Box::new(adapter),
        PathBuf::from("/src/proj"),
        Duration::from_secs(1),
        Vec::new(),
    );
    // Build a live session, then end it, to model a log whose process
    // has already exited by the time replay catches up to this record.
    replayer.start(Path::new("a.out"), &[]).unwrap();
    replayer.close();
    let tpos = ThreadPos::new(1, LineLoc::Before, Some(FileLine::key("a.c", 10)));
    assert!(replayer.process_one(tpos).is_ok());
}
