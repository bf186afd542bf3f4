use std::path::{Path, PathBuf};

use jdb_trace::adapter::fake::{FakeAdapter, ScriptedStep};
use jdb_trace::tracer::blacklist::Blacklist;
use jdb_trace::tracer::{Tracer, TracerConfig};

fn two_line_table() -> &'static str {
    "symtab: /src/proj/a.c\n10   0x1000\n11   0x1010\n12   0x1020\n13   0x1030\n"
}

#[test]
fn runs_until_the_scripted_thread_is_exhausted() {
    let mut adapter = FakeAdapter::new();
    adapter.set_line_table_dump(two_line_table());
    adapter.add_thread(
        1,
        vec![
            ScriptedStep::at("main", "/src/proj/a.c", 10, 0x1000),
            ScriptedStep::at("main", "/src/proj/a.c", 11, 0x1010),
            ScriptedStep::at("main", "/src/proj/a.c", 12, 0x1020),
        ],
    );

    let mut tracer = Tracer::new(
        Box::new(adapter),
        PathBuf::from("/src/proj"),
        TracerConfig::default(),
        Vec::new(),
        Blacklist::new(Vec::new()),
    );
    tracer.start(Path::new("a.out"), &[]).unwrap();

    let mut advanced = 0;
    for _ in 0..3 {
        if tracer.step() {
            tracer.update_log();
            advanced += 1;
        }
    }
    assert_eq!(advanced, 3);
}

#[test]
fn a_thread_stepped_to_a_non_breakable_location_keeps_logging_until_it_lands() {
    let mut adapter = FakeAdapter::new();
    adapter.set_line_table_dump(two_line_table());
    adapter.add_thread(
        1,
        vec![
            ScriptedStep::at("main", "/src/proj/a.c", 10, 0x1000),
            // a step into a line with no table entry (inlined code, say)
            ScriptedStep::at("main", "/src/proj/a.c", 999, 0x9999),
            ScriptedStep::at("main", "/src/proj/a.c", 11, 0x1010),
        ],
    );

    let mut tracer = Tracer::new(
        Box::new(adapter),
        PathBuf::from("/src/proj"),
        TracerConfig::default(),
        Vec::new(),
        Blacklist::new(Vec::new()),
    );
    tracer.start(Path::new("a.out"), &[]).unwrap();

    assert!(tracer.step());
}
