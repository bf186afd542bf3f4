//! Scriptable [`DebuggerAdapter`] used by every test in this crate.
//!
//! A real debugger session is driven by one thread stepping, and another
//! (the debugger's own) occasionally reporting a new clone. `FakeAdapter`
//! models both without a subprocess: callers pre-load each thread's frame
//! trajectory and the fake walks it forward one step per `step`/`next`/
//! `continue`/`finish` call, recording every command it was asked to run
//! so assertions can inspect the exact sequence a state machine emitted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{BreakpointHandle, BreakpointOpts, DebuggerAdapter, Frame, StepOutcome, ThreadHandle};
use crate::error::DebuggerError;

/// One step of a scripted thread: the frame it lands in, and whether that
/// step should report a timeout instead of landing anywhere.
#[derive(Clone, Debug)]
pub struct ScriptedStep {
    pub frame: Frame,
    pub timeout: bool,
}

impl ScriptedStep {
    pub fn at(name: &str, file: &str, line: u32, pc: u64) -> Self {
        ScriptedStep {
            frame: Frame {
                name: Some(name.to_string()),
                pc,
                source_location: Some((PathBuf::from(file), line)),
                block: None,
            },
            timeout: false,
        }
    }

    pub fn timeout_at(name: &str, file: &str, line: u32, pc: u64) -> Self {
        let mut s = ScriptedStep::at(name, file, line, pc);
        s.timeout = true;
        s
    }
}

struct ThreadScript {
    steps: Vec<ScriptedStep>,
    cursor: usize,
    dead: bool,
}

struct FakeBreakpoint {
    valid: bool,
}

impl BreakpointHandle for FakeBreakpoint {
    fn is_valid(&self) -> bool {
        self.valid
    }
    fn delete(&mut self) {
        self.valid = false;
    }
}

/// In-memory stand-in for a live debugger session.
pub struct FakeAdapter {
    threads: HashMap<u32, ThreadScript>,
    order: Vec<u32>,
    selected: Option<u32>,
    line_table_dump: String,
    base_address: u64,
    pending_clones: Vec<u32>,
    new_thread_count: u32,
    skipped_functions: Vec<String>,
    executed: Vec<String>,
    live: bool,
}

impl FakeAdapter {
    pub fn new() -> Self {
        FakeAdapter {
            threads: HashMap::new(),
            order: Vec::new(),
            selected: None,
            line_table_dump: String::new(),
            base_address: 0x5555_5555_0000,
            pending_clones: Vec::new(),
            new_thread_count: 0,
            skipped_functions: Vec::new(),
            executed: Vec::new(),
            live: true,
        }
    }

    /// Registers a thread with a scripted trajectory of frames. The first
    /// registered thread becomes the initially selected one.
    pub fn add_thread(&mut self, tid: u32, steps: Vec<ScriptedStep>) {
        if self.selected.is_none() {
            self.selected = Some(tid);
        }
        self.order.push(tid);
        self.threads.insert(
            tid,
            ThreadScript {
                steps,
                cursor: 0,
                dead: false,
            },
        );
    }

    /// Marks a previously-registered thread as exited; `thread_is_valid`
    /// returns false for it from this point on.
    pub fn kill_thread(&mut self, tid: u32) {
        if let Some(script) = self.threads.get_mut(&tid) {
            script.dead = true;
        }
    }

    /// Queues a clone notification to be reported the next time a step
    /// command runs, modeling the asynchronous way a real debugger
    /// delivers `thread-created` while the tracer is mid-command.
    pub fn queue_clone(&mut self, new_tid: u32) {
        self.pending_clones.push(new_tid);
    }

    pub fn set_line_table_dump(&mut self, dump: impl Into<String>) {
        self.line_table_dump = dump.into();
    }

    pub fn executed_commands(&self) -> &[String] {
        &self.executed
    }

    pub fn skipped_functions(&self) -> &[String] {
        &self.skipped_functions
    }

    pub fn kill(&mut self) {
        self.live = false;
    }

    /// `steps[cursor]` is always the thread's current frame, including
    /// before any command has run against it. A command moves the cursor
    /// to the next scripted step unless that step is flagged as a
    /// timeout, in which case the cursor holds still. Once the script
    /// runs out of steps the thread just stays put, so short scripts are
    /// usable for tests that don't care about onward progress.
    fn advance(&mut self) -> StepOutcome {
        if let Some(new_tid) = self.pending_clones.pop() {
            self.new_thread_count += 1;
            if !self.threads.contains_key(&new_tid) {
                self.add_thread(new_tid, Vec::new());
            }
        }
        let Some(tid) = self.selected else {
            return StepOutcome::DebuggerError("no thread selected".into());
        };
        let Some(script) = self.threads.get_mut(&tid) else {
            return StepOutcome::DebuggerError(format!("unknown thread {tid}"));
        };
        if script.steps.is_empty() {
            return StepOutcome::DebuggerError(format!("thread {tid} has no scripted frames"));
        }
        let next = script.cursor + 1;
        if next >= script.steps.len() {
            return StepOutcome::Success;
        }
        if script.steps[next].timeout {
            StepOutcome::Timeout
        } else {
            script.cursor = next;
            StepOutcome::Success
        }
    }
}

impl Default for FakeAdapter {
    fn default() -> Self {
        FakeAdapter::new()
    }
}

impl DebuggerAdapter for FakeAdapter {
    fn load_executable(&mut self, _path: &Path) -> Result<(), DebuggerError> {
        Ok(())
    }

    fn set_args(&mut self, _argv: &[String]) {}

    fn start(&mut self) -> Result<(), DebuggerError> {
        self.live = true;
        Ok(())
    }

    fn quit(&mut self) {
        self.live = false;
    }

    fn execute(&mut self, cmd: &str) -> Result<String, DebuggerError> {
        self.executed.push(cmd.to_string());
        Ok(String::new())
    }

    fn execute_with_timeout(&mut self, cmd: &str, _timeout: Duration) -> StepOutcome {
        self.executed.push(cmd.to_string());
        self.advance()
    }

    fn selected_thread(&self) -> Option<ThreadHandle> {
        self.selected.map(|global_num| ThreadHandle { global_num })
    }

    fn list_threads(&self) -> Vec<ThreadHandle> {
        self.order
            .iter()
            .map(|&global_num| ThreadHandle { global_num })
            .collect()
    }

    fn switch_thread(&mut self, global_num: u32) -> bool {
        if self.threads.contains_key(&global_num) {
            self.selected = Some(global_num);
            true
        } else {
            false
        }
    }

    fn thread_is_valid(&mut self, global_num: u32) -> bool {
        self.threads.get(&global_num).map(|t| !t.dead).unwrap_or(false)
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn newest_frame(&mut self) -> Option<Frame> {
        let tid = self.selected?;
        let script = self.threads.get(&tid)?;
        script.steps.get(script.cursor).map(|s| s.frame.clone())
    }

    fn older_frame(&mut self, _frame: &Frame) -> Option<Frame> {
        None
    }

    fn read_register(&mut self, name: &str) -> Option<u64> {
        if name == "pc" || name == "rip" {
            self.newest_frame().map(|f| f.pc)
        } else {
            None
        }
    }

    fn read_memory(&mut self, _addr: u64, len: usize) -> Result<Vec<u8>, DebuggerError> {
        Ok(vec![0; len])
    }

    fn write_memory(&mut self, _addr: u64, _bytes: &[u8]) -> Result<(), DebuggerError> {
        Ok(())
    }

    fn set_breakpoint(
        &mut self,
        location: &str,
        _opts: BreakpointOpts,
    ) -> Result<Box<dyn BreakpointHandle>, DebuggerError> {
        self.executed.push(format!("break {location}"));
        Ok(Box::new(FakeBreakpoint { valid: true }))
    }

    fn load_base_address(&mut self, _path: &Path) -> Option<u64> {
        Some(self.base_address)
    }

    fn install_clone_catchpoint(&mut self) -> Result<(), DebuggerError> {
        Ok(())
    }

    fn inside_clone(&mut self) -> bool {
        self.newest_frame()
            .and_then(|f| f.name)
            .map(|n| n == "clone")
            .unwrap_or(false)
    }

    fn skip_function(&mut self, name: &str) -> Result<(), DebuggerError> {
        self.skipped_functions.push(name.to_string());
        Ok(())
    }

    fn new_thread_count(&self) -> u32 {
        self.new_thread_count
    }

    fn drain_new_thread_count(&mut self, n: u32) {
        self.new_thread_count = self.new_thread_count.saturating_sub(n);
    }

    fn line_table_dump(&mut self) -> Result<String, DebuggerError> {
        Ok(self.line_table_dump.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_through_scripted_frames_in_order() {
        let mut a = FakeAdapter::new();
        a.add_thread(
            1,
            vec![
                ScriptedStep::at("main", "a.c", 10, 0x1000),
                ScriptedStep::at("main", "a.c", 11, 0x1010),
            ],
        );
        assert_eq!(a.newest_frame().unwrap().pc, 0x1000);
        assert_eq!(a.execute_with_timeout("step", Duration::from_secs(1)), StepOutcome::Success);
        assert_eq!(a.newest_frame().unwrap().pc, 0x1010);
    }

    #[test]
    fn reports_timeout_without_advancing_past_the_scripted_step() {
        let mut a = FakeAdapter::new();
        a.add_thread(
            1,
            vec![
                ScriptedStep::at("main", "a.c", 10, 0x1000),
                ScriptedStep::timeout_at("main", "a.c", 11, 0x1010),
            ],
        );
        assert_eq!(
            a.execute_with_timeout("step", Duration::from_secs(1)),
            StepOutcome::Timeout
        );
        assert_eq!(a.newest_frame().unwrap().pc, 0x1000);
    }

    #[test]
    fn queued_clone_surfaces_as_a_new_thread_count() {
        let mut a = FakeAdapter::new();
        a.add_thread(1, vec![ScriptedStep::at("main", "a.c", 10, 0x1000)]);
        a.queue_clone(2);
        assert_eq!(a.new_thread_count(), 0);
        a.execute_with_timeout("step", Duration::from_secs(1));
        assert_eq!(a.new_thread_count(), 1);
        assert!(a.switch_thread(2));
    }
}
