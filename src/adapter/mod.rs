//! The narrow, synchronous interface over the host debugger.
//!
//! `DebuggerAdapter` is the seam between the Tracer/Replayer state
//! machines and whatever actually drives the inferior. Two
//! implementations exist: [`gdb::GdbAdapter`], which talks GDB's MI
//! protocol over a child process's pipes, and [`fake::FakeAdapter`], a
//! scriptable stand-in used by every unit/integration test in this
//! crate.

pub mod fake;
pub mod gdb;
pub mod timeout;

use std::path::Path;
use std::time::Duration;

use crate::error::DebuggerError;

/// Outcome of a single debugger command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    Timeout,
    DebuggerError(String),
}

/// A frame on a thread's call stack, walked newest-to-oldest.
#[derive(Clone, Debug)]
pub struct Frame {
    pub name: Option<String>,
    pub pc: u64,
    /// Source location this frame resolves to, if any (`file`, `line`).
    pub source_location: Option<(std::path::PathBuf, u32)>,
    /// `[start, end)` PC range of the enclosing function block, used by
    /// `Tracer::add_blacklist` to enumerate every line in the function.
    pub block: Option<(u64, u64)>,
}

/// A thread as seen by the debugger. `global_num` is GDB's stable
/// cross-inferior thread id, carried elsewhere in this crate as `tid`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ThreadHandle {
    pub global_num: u32,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BreakpointOpts {
    pub internal: bool,
    pub temporary: bool,
    pub silent: bool,
}

impl BreakpointOpts {
    /// The options `run_until` always uses.
    pub fn internal_temporary() -> Self {
        BreakpointOpts {
            internal: true,
            temporary: true,
            silent: true,
        }
    }
}

/// Handle to a breakpoint created through the adapter. Dropping it does
/// *not* delete the breakpoint — callers must call `delete()` explicitly;
/// every `run_until` scope is responsible for deleting its temporary
/// breakpoint on all exit paths, including early return on timeout.
pub trait BreakpointHandle {
    fn is_valid(&self) -> bool;
    fn delete(&mut self);
}

pub trait DebuggerAdapter {
    fn load_executable(&mut self, path: &Path) -> Result<(), DebuggerError>;
    fn set_args(&mut self, argv: &[String]);
    fn start(&mut self) -> Result<(), DebuggerError>;
    fn quit(&mut self);

    fn execute(&mut self, cmd: &str) -> Result<String, DebuggerError>;
    fn execute_with_timeout(&mut self, cmd: &str, timeout: Duration) -> StepOutcome;

    fn selected_thread(&self) -> Option<ThreadHandle>;
    fn list_threads(&self) -> Vec<ThreadHandle>;
    fn switch_thread(&mut self, global_num: u32) -> bool;
    /// Whether `global_num` is still a live thread in the inferior; a
    /// thread that has exited stays in the tracer's bookkeeping (its
    /// scheduling weight just drops to zero) but can no longer be
    /// switched to or stepped.
    fn thread_is_valid(&mut self, global_num: u32) -> bool;
    /// Any inferior thread is still valid.
    fn is_live(&self) -> bool;

    fn newest_frame(&mut self) -> Option<Frame>;
    /// Walks one frame older than `frame`; `None` at the bottom of the
    /// stack.
    fn older_frame(&mut self, frame: &Frame) -> Option<Frame>;

    fn read_register(&mut self, name: &str) -> Option<u64>;
    fn read_memory(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, DebuggerError>;
    fn write_memory(&mut self, addr: u64, bytes: &[u8]) -> Result<(), DebuggerError>;

    fn set_breakpoint(
        &mut self,
        location: &str,
        opts: BreakpointOpts,
    ) -> Result<Box<dyn BreakpointHandle>, DebuggerError>;

    fn load_base_address(&mut self, path: &Path) -> Option<u64>;

    fn install_clone_catchpoint(&mut self) -> Result<(), DebuggerError>;
    /// True iff the newest frame's name is literally `clone` — the sole
    /// new-thread discovery mechanism.
    fn inside_clone(&mut self) -> bool;

    fn skip_function(&mut self, name: &str) -> Result<(), DebuggerError>;

    /// Pending new-thread notifications accumulated since the last
    /// drain. The host debugger delivers these from its own thread; the
    /// adapter is responsible for the thread-safe counter.
    fn new_thread_count(&self) -> u32;
    fn drain_new_thread_count(&mut self, n: u32);

    /// Raw `maintenance info line-table`-style dump used to build the
    /// `LineTable`.
    fn line_table_dump(&mut self) -> Result<String, DebuggerError>;
}
