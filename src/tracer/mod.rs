//! The randomized scheduler that drives one execution of a multithreaded
//! program and records, for every scheduling decision, which thread ran
//! and where it ended up.
//!
//! [`Tracer`] owns the debugger session end to end: it seeds the
//! breakable-line table, discovers new threads as they clone, picks a
//! thread to run with a weight that decays on repeated failure, detects
//! when a thread is stuck in a tight loop and blacklists the function it
//! is looping in, and appends one [`ThreadPos`] per step to the trace log.

pub mod blacklist;
pub mod pos_count;

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::adapter::{DebuggerAdapter, StepOutcome};
use crate::error::DebuggerError;
use crate::position::{load_line_table, thread_position, LineLoc, LineTable, Position, ThreadPos};

use blacklist::{lines_of_function, Blacklist};
use pos_count::PosCount;

const DEFAULT_SCHED_WEIGHT: f64 = 1.0;
const DROP_SCHED_WEIGHT: f64 = 0.1;
const LOOP_DETECTION_MIN_SAMPLES: usize = 100;

/// Tunable knobs governing the scheduler's behavior.
#[derive(Clone, Debug)]
pub struct TracerConfig {
    /// Upper bound on a single debugger command before it's treated as
    /// stuck and interrupted.
    pub step_timeout: Duration,
    /// Probability of actually breaking out of a detected loop rather
    /// than continuing to step through it.
    pub prob_out_loop: f64,
    /// A thread's positional entropy must fall at or below `ln(loop_threshold)`
    /// for its recent history to count as a loop.
    pub loop_threshold: u32,
    /// A freshly-discovered thread's very first follow-on command would
    /// otherwise default to `step`; this is the probability of keeping
    /// `step` instead of falling back to `next`. `None` always keeps
    /// `step`, matching the base scheduling algorithm exactly.
    pub go_deeper: Option<f64>,
    /// Restated for forward compatibility with configurations that
    /// expect the option to exist; the tracer always treats a run with
    /// one live thread the same way regardless of this flag's value.
    pub only_multithread: bool,
}

impl Default for TracerConfig {
    fn default() -> Self {
        TracerConfig {
            step_timeout: Duration::from_secs(1),
            prob_out_loop: 0.2,
            loop_threshold: 20,
            go_deeper: None,
            only_multithread: false,
        }
    }
}

struct ThreadInfo {
    global_num: u32,
    sched_weight: f64,
    position: Position,
}

pub struct Tracer<L: Write, B: Write> {
    adapter: Box<dyn DebuggerAdapter>,
    srcdir: PathBuf,
    config: TracerConfig,
    log: L,
    blacklist: Blacklist<B>,
    table: LineTable,
    threads: Vec<ThreadInfo>,
    new_tids: HashSet<u32>,
    pos_count: std::collections::HashMap<u32, PosCount>,
    last_thread_idx: usize,
}

impl<L: Write, B: Write> Tracer<L, B> {
    pub fn new(
        adapter: Box<dyn DebuggerAdapter>,
        srcdir: PathBuf,
        config: TracerConfig,
        log: L,
        blacklist: Blacklist<B>,
    ) -> Self {
        Tracer {
            adapter,
            srcdir,
            config,
            log,
            blacklist,
            table: LineTable::from_entries(Vec::new()),
            threads: Vec::new(),
            new_tids: HashSet::new(),
            pos_count: std::collections::HashMap::new(),
            last_thread_idx: 0,
        }
    }

    /// Launches the inferior, loads the breakable-line table, and seeds
    /// bookkeeping for the thread GDB starts on.
    pub fn start(&mut self, executable: &Path, args: &[String]) -> Result<(), DebuggerError> {
        self.adapter.load_executable(executable)?;
        self.adapter.set_args(args);
        self.adapter.start()?;
        self.adapter.install_clone_catchpoint()?;

        let dump = self.adapter.line_table_dump()?;
        self.table = load_line_table(&self.srcdir, &dump);
        info!(entries = self.table.entries().len(), "loaded breakable line table");

        let handle = self
            .adapter
            .selected_thread()
            .ok_or_else(|| DebuggerError::from("no selected thread after start"))?;
        let (position, _level) = thread_position(self.adapter.as_mut(), &self.table, &self.srcdir);
        self.threads.push(ThreadInfo {
            global_num: handle.global_num,
            sched_weight: DEFAULT_SCHED_WEIGHT,
            position,
        });
        self.pos_count.insert(handle.global_num, PosCount::new());
        Ok(())
    }

    fn handle_new_threads(&mut self) {
        if self.adapter.new_thread_count() == 0 {
            return;
        }
        let known: HashSet<u32> = self
            .threads
            .iter()
            .filter(|t| self.adapter.thread_is_valid(t.global_num))
            .map(|t| t.global_num)
            .collect();
        for handle in self.adapter.list_threads() {
            if known.contains(&handle.global_num) {
                continue;
            }
            self.adapter.switch_thread(handle.global_num);
            let (position, _level) = thread_position(self.adapter.as_mut(), &self.table, &self.srcdir);
            debug!(tid = handle.global_num, "new thread discovered via clone catchpoint");
            self.new_tids.insert(handle.global_num);
            self.threads.push(ThreadInfo {
                global_num: handle.global_num,
                sched_weight: DEFAULT_SCHED_WEIGHT,
                position,
            });
            self.pos_count.insert(handle.global_num, PosCount::new());
            self.adapter.drain_new_thread_count(1);
        }
    }

    fn random_thread(&self) -> usize {
        let total: f64 = self.threads.iter().map(|t| t.sched_weight).sum();
        if total <= 0.0 {
            return 0;
        }
        let mut x = rand::thread_rng().gen_range(0.0, total);
        for (i, t) in self.threads.iter().enumerate() {
            if x < t.sched_weight {
                return i;
            }
            x -= t.sched_weight;
        }
        self.threads.len() - 1
    }

    fn detect_loop(&mut self, tid: u32) -> bool {
        let pos_count = self
            .pos_count
            .get_mut(&tid)
            .expect("pos_count tracked for every known thread");
        if pos_count.len() < LOOP_DETECTION_MIN_SAMPLES {
            return false;
        }
        let entropy = pos_count.entropy();
        if entropy >= (self.config.loop_threshold as f64).ln() {
            return false;
        }
        pos_count.clear();
        true
    }

    fn in_blacklist(&self, idx: usize) -> bool {
        let info = &self.threads[idx];
        if !info.position.at_line_begin() {
            return false;
        }
        let Some(file_line) = info.position.file_line.as_ref() else {
            return false;
        };
        self.blacklist.contains(&file_line.filename, file_line.line)
    }

    fn add_blacklist(&mut self, idx: usize) -> bool {
        if !self.threads[idx].position.at_line_begin() {
            return false;
        }
        let Some(file_line) = self.threads[idx].position.file_line.clone() else {
            return false;
        };
        let Some(frame) = self.adapter.newest_frame() else {
            return false;
        };
        if frame.name.as_deref() == Some("main") {
            return false;
        }
        let Some((start, end)) = frame.block else {
            return false;
        };
        let lines = lines_of_function(&self.table, start, end);

        if let Some(name) = &frame.name {
            if let Err(e) = self.adapter.skip_function(name) {
                warn!(function = name.as_str(), error = %e, "failed to skip blacklisted function");
            }
        }
        if let Err(e) = self.blacklist.add(&file_line.filename, lines) {
            warn!(error = %e, "failed to persist blacklist entry");
        }
        true
    }

    pub fn update_log(&mut self) {
        let info = &self.threads[self.last_thread_idx];
        let tid = info.global_num;
        let (line_loc, file_line) = if !self.adapter.thread_is_valid(tid) {
            (LineLoc::Middle, None)
        } else {
            let loc = if info.position.at_line_begin() {
                LineLoc::Before
            } else {
                LineLoc::Middle
            };
            (loc, info.position.file_line.clone())
        };
        let tpos = ThreadPos::new(tid, line_loc, file_line);
        let rendered = tpos.to_string();
        if let Err(e) = writeln!(self.log, "{rendered}") {
            warn!(error = %e, "failed to write trace log line");
        }
        let _ = self.log.flush();
        self.pos_count
            .entry(tid)
            .or_insert_with(PosCount::new)
            .add_new(rendered);
    }

    fn try_step(&mut self, idx: usize) -> bool {
        let tid = self.threads[idx].global_num;
        self.adapter.switch_thread(tid);
        let freshly_discovered = self.new_tids.remove(&tid);

        let any_other_live = self
            .threads
            .iter()
            .enumerate()
            .any(|(i, t)| i != idx && self.adapter.thread_is_valid(t.global_num));

        let cmd = if !any_other_live {
            "continue"
        } else if self.in_blacklist(idx) {
            "finish"
        } else if self.detect_loop(tid) && rand::thread_rng().gen::<f64>() < self.config.prob_out_loop {
            if self.add_blacklist(idx) {
                "finish"
            } else {
                "step"
            }
        } else {
            "step"
        };

        match self.adapter.execute_with_timeout(cmd, self.config.step_timeout) {
            StepOutcome::Timeout => {
                let (position, _level) = thread_position(self.adapter.as_mut(), &self.table, &self.srcdir);
                self.threads[idx].position = position;
                return false;
            }
            StepOutcome::DebuggerError(e) => {
                warn!(error = e.as_str(), cmd, "debugger error during step");
                return false;
            }
            StepOutcome::Success => {}
        }

        let mut first_follow_up = true;
        loop {
            if !self.adapter.thread_is_valid(tid) {
                return false;
            }
            let (position, level) = thread_position(self.adapter.as_mut(), &self.table, &self.srcdir);
            self.threads[idx].position = position.clone();
            if position.at_line_begin() {
                return true;
            }
            self.last_thread_idx = idx;
            self.update_log();

            let mut follow_up: Vec<&str> = if position.file_line.is_none() {
                vec!["step"]
            } else if level > 0 {
                vec!["finish"; level]
            } else {
                vec!["step"]
            };

            if first_follow_up && freshly_discovered && follow_up.first() == Some(&"step") {
                if let Some(p) = self.config.go_deeper {
                    if rand::thread_rng().gen::<f64>() >= p {
                        follow_up = vec!["next"];
                    }
                }
            }
            first_follow_up = false;

            for cmd in follow_up {
                if !self.adapter.thread_is_valid(tid) {
                    return false;
                }
                match self.adapter.execute_with_timeout(cmd, self.config.step_timeout) {
                    StepOutcome::Timeout => {
                        let (position, _level) =
                            thread_position(self.adapter.as_mut(), &self.table, &self.srcdir);
                        self.threads[idx].position = position;
                        return false;
                    }
                    StepOutcome::DebuggerError(_) => return false,
                    StepOutcome::Success => {}
                }
            }
        }
    }

    /// Picks a thread, steps it once (possibly through several internal
    /// debugger commands), and logs the outcome. Returns `false` once the
    /// session has ended and there is nothing left to trace.
    pub fn step(&mut self) -> bool {
        loop {
            if !self.adapter.is_live() {
                return false;
            }
            self.handle_new_threads();
            let idx = self.random_thread();
            if self.adapter.thread_is_valid(self.threads[idx].global_num) {
                if self.try_step(idx) {
                    self.threads[idx].sched_weight = DEFAULT_SCHED_WEIGHT;
                    self.last_thread_idx = idx;
                    return true;
                }
                self.threads[idx].sched_weight *= DROP_SCHED_WEIGHT;
                self.last_thread_idx = idx;
                return true;
            } else {
                self.threads[idx].sched_weight = 0.0;
            }
        }
    }

    pub fn close(&mut self) {
        self.adapter.quit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::fake::{FakeAdapter, ScriptedStep};

    fn table_dump() -> &'static str {
        "symtab: /src/proj/a.c\n10   0x1000\n11   0x1010\n12   0x1020\n"
    }

    #[test]
    fn single_thread_run_logs_every_breakable_stop() {
        let mut adapter = FakeAdapter::new();
        adapter.set_line_table_dump(table_dump());
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
        assert!(tracer.step());
        tracer.update_log();
        assert!(tracer.step());
        tracer.update_log();

        let log = String::from_utf8(tracer.log.clone()).unwrap();
        assert!(log.contains("a.c:11"));
        assert!(log.contains("a.c:12"));
    }

    #[test]
    fn step_timeout_records_failure_without_advancing_log() {
        let mut adapter = FakeAdapter::new();
        adapter.set_line_table_dump(table_dump());
        adapter.add_thread(
            1,
            vec![
                ScriptedStep::at("main", "/src/proj/a.c", 10, 0x1000),
                ScriptedStep::timeout_at("main", "/src/proj/a.c", 11, 0x1010),
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
        assert_eq!(tracer.threads[0].sched_weight, DROP_SCHED_WEIGHT);
    }

    #[test]
    fn new_thread_discovered_via_clone_gets_default_weight() {
        let mut adapter = FakeAdapter::new();
        adapter.set_line_table_dump(table_dump());
        adapter.add_thread(1, vec![ScriptedStep::at("main", "/src/proj/a.c", 10, 0x1000)]);
        adapter.add_thread(2, vec![ScriptedStep::at("worker", "/src/proj/a.c", 11, 0x1010)]);
        adapter.queue_clone(2);
        let mut tracer = Tracer::new(
            Box::new(adapter),
            PathBuf::from("/src/proj"),
            TracerConfig::default(),
            Vec::new(),
            Blacklist::new(Vec::new()),
        );
        tracer.start(Path::new("a.out"), &[]).unwrap();
        assert!(tracer.step());
        assert!(tracer.step());
        assert_eq!(tracer.threads.len(), 2);
        assert!(tracer.threads.iter().any(|t| t.global_num == 2));
    }

    #[test]
    fn entropy_exactly_at_the_threshold_is_not_a_loop() {
        let adapter = FakeAdapter::new();
        let mut tracer = Tracer::new(
            Box::new(adapter),
            PathBuf::from("/src/proj"),
            TracerConfig::default(),
            Vec::new(),
            Blacklist::new(Vec::new()),
        );
        // A uniform distribution over exactly `loop_threshold` distinct
        // positions has entropy ln(loop_threshold) regardless of how many
        // times the cycle repeats, so this window sits exactly on the
        // boundary rather than below it.
        let mut pos_count = PosCount::new();
        for _ in 0..5 {
            for i in 0..tracer.config.loop_threshold {
                pos_count.add_new(format!("pos-{i}"));
            }
        }
        tracer.pos_count.insert(1, pos_count);
        tracer.threads.push(ThreadInfo {
            global_num: 1,
            sched_weight: DEFAULT_SCHED_WEIGHT,
            position: Position::new(None, 0),
        });

        assert!(!tracer.detect_loop(1));
    }
}
