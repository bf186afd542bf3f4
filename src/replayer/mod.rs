//! Replays a recorded trace log against a fresh debugger session,
//! emitting the PC each thread reached at every recorded stop.
//!
//! [`Replayer`] walks the same source file the tracer walked, but instead
//! of choosing what to do next at random it is told exactly where each
//! thread needs to end up next (a [`ThreadPos`] read back from the trace
//! log) and works out the minimal debugger command sequence — `continue`
//! to a breakpoint, `next`, or `finish` — that gets it there.

mod thread_info;

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use crate::adapter::{BreakpointHandle, BreakpointOpts, DebuggerAdapter};
use crate::error::{DebuggerError, TraceError};
use crate::position::{load_line_table, thread_position, FileLine, LineLoc, LineTable, ThreadPos};

pub use thread_info::ThreadInfo;

/// Outcome of a single `run_gdb_cmd`-style debugger command, distinguishing
/// the ways a step can end besides landing cleanly on the next stop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunResult {
    Success,
    Timeout,
    Clone,
    Exit,
    Error,
}

pub struct Replayer<W> {
    adapter: Box<dyn DebuggerAdapter>,
    srcdir: PathBuf,
    step_timeout: Duration,
    out: W,
    table: LineTable,
    threads: std::collections::HashMap<u32, ThreadInfo>,
    cur_tid: Option<u32>,
    base_addr: u64,
}

impl<W: std::io::Write> Replayer<W> {
    pub fn new(adapter: Box<dyn DebuggerAdapter>, srcdir: PathBuf, step_timeout: Duration, out: W) -> Self {
        Replayer {
            adapter,
            srcdir,
            step_timeout,
            out,
            table: LineTable::from_entries(Vec::new()),
            threads: std::collections::HashMap::new(),
            cur_tid: None,
            base_addr: 0,
        }
    }

    pub fn start(&mut self, executable: &Path, args: &[String]) -> Result<(), TraceError> {
        self.adapter.load_executable(executable)?;
        self.adapter.set_args(args);
        self.adapter.start()?;
        for sig in ["SIGSEGV", "SIGILL", "SIGABRT"] {
            self.adapter.execute(&format!("handle {sig} nostop pass"))?;
        }
        self.adapter.install_clone_catchpoint()?;

        let dump = self.adapter.line_table_dump()?;
        self.table = load_line_table(&self.srcdir, &dump);
        self.add_new_thread()?;

        self.base_addr = self
            .adapter
            .load_base_address(executable)
            .ok_or_else(|| DebuggerError::from("failed to load base address"))?;
        Ok(())
    }

    fn add_new_thread(&mut self) -> Result<(), TraceError> {
        let known: std::collections::HashSet<u32> = self.threads.keys().copied().collect();
        let handle = self
            .adapter
            .list_threads()
            .into_iter()
            .find(|h| !known.contains(&h.global_num))
            .ok_or_else(|| DebuggerError::from("no new thread to discover"))?;

        self.adapter.switch_thread(handle.global_num);
        let (position, _level) = thread_position(self.adapter.as_mut(), &self.table, &self.srcdir);
        let line_loc = if position.at_line_begin() {
            LineLoc::Before
        } else {
            LineLoc::Middle
        };
        let tpos = ThreadPos::new(handle.global_num, line_loc, position.file_line);
        self.threads.insert(handle.global_num, ThreadInfo::new(tpos));
        Ok(())
    }

    fn break_position(&self, file_line: Option<&FileLine>) -> Option<FileLine> {
        let fl = file_line?;
        let key = FileLine::key(fl.filename.clone(), fl.line);
        self.table.break_position(&key).cloned()
    }

    /// Drives the debugger until the thread named in `tpos` has reached
    /// the recorded position, emitting one PC-offset line to the output
    /// log for every debugger command issued along the way.
    pub fn process_one(&mut self, tpos: ThreadPos) -> Result<(), TraceError> {
        let tid = tpos.tid;
        self.cur_tid = Some(tid);

        if !self.adapter.is_live() {
            return Ok(());
        }

        if !self.adapter.switch_thread(tid) {
            let info_file_line_is_none = self
                .threads
                .get(&tid)
                .map(|i| i.current.file_line.is_none())
                .unwrap_or(true);
            if tpos.file_line.is_none() || info_file_line_is_none {
                return Ok(());
            }
            return Err(TraceError::InvalidLogRecord(format!("cannot switch to thread {tid}")));
        }

        let info_line_loc = self
            .threads
            .get(&tid)
            .map(|i| i.current.line_loc)
            .unwrap_or(LineLoc::Middle);
        if tpos.line_loc == LineLoc::After || info_line_loc == LineLoc::After {
            return Err(TraceError::InvalidLogRecord(format!("invalid line_loc for thread {tid}")));
        }

        let cur_match = self.break_position(tpos.file_line.as_ref())
            == self.threads.get(&tid).and_then(|i| i.current.file_line.clone());
        let last_target = self.threads.get(&tid).and_then(|i| i.last_target.clone());
        if let Some(info) = self.threads.get_mut(&tid) {
            info.last_target = tpos.file_line.clone();
        }

        match (info_line_loc, tpos.line_loc) {
            (LineLoc::Before, LineLoc::Before) => {
                if cur_match {
                    if let (Some(lt), Some(fl)) = (&last_target, &tpos.file_line) {
                        if lt.filename == fl.filename && lt.line < fl.line {
                            return Ok(());
                        }
                    }
                }
                self.run_until(tpos.file_line)?;
            }
            (LineLoc::Before, LineLoc::Middle) => {
                let last_finished = self.threads.get(&tid).and_then(|i| i.last_finished.clone());
                if tpos.file_line == last_finished {
                    return Ok(());
                }
                if cur_match {
                    self.run_next();
                } else {
                    self.run_until_and_next(tpos.file_line)?;
                }
            }
            (LineLoc::Middle, LineLoc::Before) => {
                self.run_until(tpos.file_line)?;
            }
            (LineLoc::Middle, LineLoc::Middle) => {
                if cur_match {
                    self.run_finish();
                } else {
                    self.run_until_and_next(tpos.file_line)?;
                }
            }
            (LineLoc::After, _) | (_, LineLoc::After) => unreachable!("rejected above"),
        }
        Ok(())
    }

    fn append_answer(&mut self, addr: Option<u64>) {
        let offset = addr.map(|a| a.wrapping_sub(self.base_addr)).unwrap_or(0);
        let tid = self.cur_tid.expect("cur_tid set by process_one before any run_* call");
        if let Err(e) = writeln!(self.out, "{tid}: {offset:#x}") {
            warn!(error = %e, "failed to write replay output line");
        }
        let _ = self.out.flush();
    }

    fn move_to(&mut self, tid: u32, new_tpos: ThreadPos, last: bool) {
        if let Some(info) = self.threads.get_mut(&tid) {
            if last {
                info.last_finished = info.current.file_line.clone();
            } else {
                info.last_finished = None;
            }
            info.current = new_tpos;
        }
    }

    fn into_middle(&mut self, tid: u32) {
        if let Some(info) = self.threads.get_mut(&tid) {
            info.current.line_loc = LineLoc::Middle;
        }
    }

    fn run_gdb_cmd(&mut self, cmd: &str) -> RunResult {
        let Some(handle) = self.adapter.selected_thread() else {
            return RunResult::Exit;
        };
        if !self.adapter.thread_is_valid(handle.global_num) {
            return RunResult::Exit;
        }
        match self.adapter.execute_with_timeout(cmd, self.step_timeout) {
            crate::adapter::StepOutcome::Timeout => return RunResult::Timeout,
            crate::adapter::StepOutcome::DebuggerError(e) => {
                warn!(error = e.as_str(), cmd, "debugger error during replay");
                return RunResult::Error;
            }
            crate::adapter::StepOutcome::Success => {}
        }
        if self.adapter.inside_clone() {
            let _ = self.adapter.execute("stepi");
            if let Err(e) = self.add_new_thread() {
                warn!(error = %e, "failed to register thread discovered during replay");
            }
            self.adapter.switch_thread(handle.global_num);
            return RunResult::Clone;
        }
        if !self.adapter.thread_is_valid(handle.global_num) {
            return RunResult::Exit;
        }
        RunResult::Success
    }

    fn run_until(&mut self, file_line: Option<FileLine>) -> Result<(), TraceError> {
        let Some(fl) = file_line else {
            self.run_until_exit();
            return Ok(());
        };
        let tid = self.cur_tid.expect("set by process_one");
        let mut bp = self
            .adapter
            .set_breakpoint(&fl.to_string(), BreakpointOpts::internal_temporary())?;

        loop {
            match self.run_gdb_cmd("continue") {
                RunResult::Clone => self.append_answer(None),
                RunResult::Timeout => {
                    bp.delete();
                    return Err(TraceError::ReplayTimeout { file_line: fl.to_string() });
                }
                RunResult::Exit | RunResult::Error => {
                    self.append_answer(None);
                    self.move_to(tid, ThreadPos::new(tid, LineLoc::Middle, None), false);
                    break;
                }
                RunResult::Success => {
                    let pc = self.adapter.read_register("pc");
                    self.append_answer(pc);
                    let (position, _level) =
                        thread_position(self.adapter.as_mut(), &self.table, &self.srcdir);
                    self.move_to(
                        tid,
                        ThreadPos::new(tid, LineLoc::Before, position.file_line),
                        true,
                    );
                    break;
                }
            }
        }
        if bp.is_valid() {
            bp.delete();
        }
        Ok(())
    }

    fn run_until_exit(&mut self) {
        let tid = self.cur_tid.expect("set by process_one");
        loop {
            let r = self.run_gdb_cmd("continue");
            self.append_answer(None);
            if matches!(r, RunResult::Exit | RunResult::Error) {
                break;
            }
        }
        self.move_to(tid, ThreadPos::new(tid, LineLoc::Middle, None), false);
    }

    fn run_next(&mut self) {
        let tid = self.cur_tid.expect("set by process_one");
        match self.run_gdb_cmd("next") {
            RunResult::Clone | RunResult::Timeout => {
                self.append_answer(None);
                self.into_middle(tid);
            }
            RunResult::Exit | RunResult::Error => {
                self.append_answer(None);
                self.move_to(tid, ThreadPos::new(tid, LineLoc::Middle, None), false);
            }
            RunResult::Success => {
                let (position, level) = thread_position(self.adapter.as_mut(), &self.table, &self.srcdir);
                debug_assert_eq!(level, 0, "next() never lands deeper than the frame it started in");
                self.append_answer(Some(position.pc));
                self.move_to(
                    tid,
                    ThreadPos::new(tid, LineLoc::Before, position.file_line),
                    true,
                );
            }
        }
    }

    fn run_finish(&mut self) {
        let tid = self.cur_tid.expect("set by process_one");
        match self.run_gdb_cmd("finish") {
            RunResult::Clone | RunResult::Exit | RunResult::Error => self.append_answer(None),
            RunResult::Timeout => {}
            RunResult::Success => {
                let (position, level) = thread_position(self.adapter.as_mut(), &self.table, &self.srcdir);
                if level == 0 {
                    self.append_answer(Some(position.pc));
                    self.move_to(
                        tid,
                        ThreadPos::new(tid, LineLoc::Before, position.file_line),
                        true,
                    );
                }
            }
        }
    }

    fn run_until_and_next(&mut self, file_line: Option<FileLine>) -> Result<(), TraceError> {
        let had_target = file_line.is_some();
        self.run_until(file_line)?;
        if had_target {
            self.run_next();
        }
        Ok(())
    }

    pub fn close(&mut self) {
        self.adapter.quit();
    }
}
