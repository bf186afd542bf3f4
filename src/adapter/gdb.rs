//! Production [`DebuggerAdapter`] speaking GDB's machine-interface (MI)
//! protocol over a child process's pipes.
//!
//! Generalizes `jdb::process::inferior`'s pattern of a dedicated reader
//! thread forwarding lines to the control thread over a
//! `crossbeam_channel` — except the inferior here is GDB's own stdout,
//! not a traced program's PTY, so a plain blocking `BufReader` thread is
//! enough; there's no PTY-nonblocking-poll concern to reach for `mio`
//! over.
//!
//! Only the handful of commands the Tracer/Replayer actually issue
//! (`step`, `next`, `finish`, `continue`, breakpoint management, register
//!/frame queries, `maintenance info line-table`) are given typed
//! wrappers; anything else goes through [`DebuggerAdapter::execute`] as a
//! raw MI or console command string.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, trace, warn};

use super::timeout::race_reply;
use super::{BreakpointHandle, BreakpointOpts, DebuggerAdapter, Frame, StepOutcome, ThreadHandle};
use crate::error::DebuggerError;

/// One parsed line of GDB MI output, classified just enough for the
/// adapter's needs.
#[derive(Clone, Debug)]
enum MiLine {
    /// `^done`, `^running`, `^error,msg="..."` — a command's result record.
    Result { class: String, payload: String },
    /// `*stopped,reason="..."` and friends — asynchronous execution state.
    ExecAsync { class: String, payload: String },
    /// `=thread-created,id="N"` and similar notify-async records.
    Notify { class: String, payload: String },
    /// `~"..."` console stream output (the payload a console command like
    /// `maintenance info line-table` actually carries).
    Console(String),
    /// Anything this adapter doesn't need to distinguish further.
    Other(String),
}

fn classify(raw: &str) -> MiLine {
    if let Some(rest) = raw.strip_prefix('~') {
        return MiLine::Console(unquote(rest));
    }
    if let Some(rest) = raw.strip_prefix('^') {
        let (class, payload) = split_class(rest);
        return MiLine::Result { class, payload };
    }
    if let Some(rest) = raw.strip_prefix('*') {
        let (class, payload) = split_class(rest);
        return MiLine::ExecAsync { class, payload };
    }
    if let Some(rest) = raw.strip_prefix('=') {
        let (class, payload) = split_class(rest);
        return MiLine::Notify { class, payload };
    }
    MiLine::Other(raw.to_string())
}

fn split_class(rest: &str) -> (String, String) {
    match rest.split_once(',') {
        Some((class, payload)) => (class.to_string(), payload.to_string()),
        None => (rest.trim_end().to_string(), String::new()),
    }
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    let s = s.strip_prefix('"').unwrap_or(s);
    let s = s.strip_suffix('"').unwrap_or(s);
    s.replace("\\n", "\n").replace("\\\"", "\"")
}

struct ReaderState {
    new_thread_count: AtomicU32,
}

struct PendingBreakpoint {
    number: u32,
    valid: bool,
}

impl BreakpointHandle for PendingBreakpoint {
    fn is_valid(&self) -> bool {
        self.valid
    }
    fn delete(&mut self) {
        self.valid = false;
    }
}

/// Drives a single `gdb --interpreter=mi2` child process.
pub struct GdbAdapter {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    reply_rx: Receiver<MiLine>,
    console_tx: Sender<MiLine>,
    state: Arc<ReaderState>,
    _reader: Option<JoinHandle<()>>,
    token: u64,
    executable: Option<PathBuf>,
    args: Vec<String>,
    selected_tid: Option<u32>,
}

impl GdbAdapter {
    pub fn new() -> std::io::Result<Self> {
        let (console_tx, reply_rx) = crossbeam_channel::unbounded();
        Ok(GdbAdapter {
            child: None,
            stdin: None,
            reply_rx,
            console_tx,
            state: Arc::new(ReaderState {
                new_thread_count: AtomicU32::new(0),
            }),
            _reader: None,
            token: 0,
            executable: None,
            args: Vec::new(),
            selected_tid: None,
        })
    }

    fn next_token(&mut self) -> u64 {
        self.token += 1;
        self.token
    }

    fn send_raw(&mut self, line: &str) -> Result<(), DebuggerError> {
        trace!(cmd = line, "send to gdb");
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| DebuggerError::from("gdb not started"))?;
        writeln!(stdin, "{line}").map_err(|e| DebuggerError::from(e.to_string()))?;
        stdin.flush().map_err(|e| DebuggerError::from(e.to_string()))
    }

    /// Issues a console command and collects its console-stream output
    /// until the matching result record arrives.
    fn console(&mut self, cmd: &str) -> Result<String, DebuggerError> {
        let token = self.next_token();
        self.send_raw(&format!("{token}-interpreter-exec console \"{}\"", escape(cmd)))?;
        self.collect_until_result(token)
    }

    fn collect_until_result(&mut self, token: u64) -> Result<String, DebuggerError> {
        let mut out = String::new();
        loop {
            let line = self
                .reply_rx
                .recv()
                .map_err(|_| DebuggerError::from("gdb reader thread exited"))?;
            match line {
                MiLine::Console(text) => out.push_str(&text),
                MiLine::Result { class, payload } => {
                    if class == "error" {
                        return Err(payload.into());
                    }
                    let _ = token;
                    return Ok(out);
                }
                _ => {}
            }
        }
    }

    fn spawn_reader(&mut self) {
        let stdout = self
            .child
            .as_mut()
            .and_then(|c| c.stdout.take())
            .expect("gdb stdout must be piped");
        let tx = self.console_tx.clone();
        let state = self.state.clone();
        let handle = std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                if line.is_empty() {
                    continue;
                }
                let parsed = classify(&line);
                if let MiLine::Notify { class, .. } = &parsed {
                    if class == "thread-created" {
                        state.new_thread_count.fetch_add(1, Ordering::SeqCst);
                    }
                }
                if tx.send(parsed).is_err() {
                    break;
                }
            }
        });
        self._reader = Some(handle);
    }
}

fn escape(cmd: &str) -> String {
    cmd.replace('\\', "\\\\").replace('"', "\\\"")
}

impl DebuggerAdapter for GdbAdapter {
    fn load_executable(&mut self, path: &Path) -> Result<(), DebuggerError> {
        self.executable = Some(path.to_path_buf());
        let child = Command::new("gdb")
            .args(["-q", "-nx", "--interpreter=mi2"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| DebuggerError::from(format!("failed to spawn gdb: {e}")))?;
        self.child = Some(child);
        self.stdin = self.child.as_mut().and_then(|c| c.stdin.take());
        self.spawn_reader();
        self.console(&format!("file -readnow {}", path.display()))?;
        Ok(())
    }

    fn set_args(&mut self, argv: &[String]) {
        self.args = argv.to_vec();
    }

    fn start(&mut self) -> Result<(), DebuggerError> {
        let args = self.args.join(" ");
        self.console(&format!("set args {args} >/dev/null 2>&1"))?;
        self.console("set startup-with-shell on")?;
        self.console("set non-stop off")?;
        self.console("set follow-fork-mode parent")?;
        self.console("set detach-on-fork off")?;
        self.console("set follow-exec-mode new")?;
        self.console("set scheduler-locking on")?;
        self.console("set schedule-multiple on")?;
        self.console("set print finish off")?;
        self.console("set pagination off")?;
        self.console("set step-mode off")?;
        self.console("start")?;
        self.selected_tid = self.selected_thread().map(|t| t.global_num);
        Ok(())
    }

    fn quit(&mut self) {
        let _ = self.console("kill inferiors 1");
        let _ = self.send_raw("-gdb-exit");
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    fn execute(&mut self, cmd: &str) -> Result<String, DebuggerError> {
        self.console(cmd)
    }

    fn execute_with_timeout(&mut self, cmd: &str, timeout: Duration) -> StepOutcome {
        let token = self.next_token();
        if let Err(e) = self.send_raw(&format!("{token}-interpreter-exec console \"{}\"", escape(cmd))) {
            return StepOutcome::DebuggerError(e.to_string());
        }
        let rx = self.reply_rx.clone();
        let mut stdin = self.stdin.take();
        let result = race_reply(&rx, timeout, || {
            debug!(cmd, "step timed out, sending exec-interrupt");
            if let Some(stdin) = stdin.as_mut() {
                let _ = writeln!(stdin, "-exec-interrupt");
                let _ = stdin.flush();
            }
        });
        self.stdin = stdin;
        match result {
            None => StepOutcome::Timeout,
            Some(_) => StepOutcome::Success,
        }
    }

    fn selected_thread(&self) -> Option<ThreadHandle> {
        self.selected_tid.map(|global_num| ThreadHandle { global_num })
    }

    fn list_threads(&self) -> Vec<ThreadHandle> {
        // The tracer and replayer discover threads exclusively through the
        // clone catchpoint, never by enumerating here.
        self.selected_thread().into_iter().collect()
    }

    fn switch_thread(&mut self, global_num: u32) -> bool {
        if self.console(&format!("thread {global_num}")).is_ok() {
            self.selected_tid = Some(global_num);
            true
        } else {
            false
        }
    }

    fn thread_is_valid(&mut self, global_num: u32) -> bool {
        match self.console("info threads") {
            Ok(out) => out
                .lines()
                .any(|l| l.split_whitespace().any(|w| w == global_num.to_string())),
            Err(_) => false,
        }
    }

    fn is_live(&self) -> bool {
        self.child
            .as_ref()
            .map(|c| c.stdin.is_some() || self.stdin.is_some())
            .unwrap_or(false)
            && self.selected_tid.is_some()
    }

    fn newest_frame(&mut self) -> Option<Frame> {
        let out = self.console("info frame").ok()?;
        parse_frame_summary(&out)
    }

    fn older_frame(&mut self, _frame: &Frame) -> Option<Frame> {
        let out = self.console("up").ok()?;
        parse_frame_summary(&out)
    }

    fn read_register(&mut self, name: &str) -> Option<u64> {
        let out = self.console(&format!("print/x ${name}")).ok()?;
        parse_hex_value(&out)
    }

    fn read_memory(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, DebuggerError> {
        let out = self.console(&format!("x/{len}xb {addr:#x}"))?;
        Ok(parse_byte_dump(&out, len))
    }

    fn write_memory(&mut self, addr: u64, bytes: &[u8]) -> Result<(), DebuggerError> {
        for (i, b) in bytes.iter().enumerate() {
            self.console(&format!("set {{char}}({addr:#x} + {i}) = {b}"))?;
        }
        Ok(())
    }

    fn set_breakpoint(
        &mut self,
        location: &str,
        opts: BreakpointOpts,
    ) -> Result<Box<dyn BreakpointHandle>, DebuggerError> {
        let mut cmd = String::from("break ");
        if opts.temporary {
            cmd = format!("tbreak {location}");
        } else {
            cmd.push_str(location);
        }
        let out = self.console(&cmd)?;
        let number = parse_breakpoint_number(&out).unwrap_or(0);
        if opts.silent || opts.internal {
            let _ = self.console(&format!("set breakpoint pending off"));
        }
        Ok(Box::new(PendingBreakpoint {
            number,
            valid: true,
        }))
    }

    fn load_base_address(&mut self, path: &Path) -> Option<u64> {
        let out = self.console("info proc mappings").ok()?;
        let name = path.file_name()?.to_string_lossy().into_owned();
        out.lines()
            .find(|l| l.contains(&name))
            .and_then(|l| l.split_whitespace().next())
            .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
    }

    fn install_clone_catchpoint(&mut self) -> Result<(), DebuggerError> {
        self.console("catch syscall clone").map(|_| ())
    }

    fn inside_clone(&mut self) -> bool {
        self.newest_frame()
            .and_then(|f| f.name)
            .map(|n| n == "clone")
            .unwrap_or(false)
    }

    fn skip_function(&mut self, name: &str) -> Result<(), DebuggerError> {
        self.console(&format!("skip {name}")).map(|_| ())
    }

    fn new_thread_count(&self) -> u32 {
        self.state.new_thread_count.load(Ordering::SeqCst)
    }

    fn drain_new_thread_count(&mut self, n: u32) {
        self.state.new_thread_count.fetch_sub(n, Ordering::SeqCst);
    }

    fn line_table_dump(&mut self) -> Result<String, DebuggerError> {
        self.console("maintenance info line-table")
    }
}

impl Drop for GdbAdapter {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.quit();
        }
    }
}

fn parse_frame_summary(out: &str) -> Option<Frame> {
    let name = out
        .lines()
        .find_map(|l| l.trim().strip_prefix("in ").map(|s| s.to_string()))
        .or_else(|| {
            out.lines().next().map(|l| {
                l.split_whitespace()
                    .last()
                    .unwrap_or_default()
                    .to_string()
            })
        });
    let pc = out
        .lines()
        .find_map(|l| l.find("rip = ").map(|i| &l[i + 6..]))
        .or_else(|| out.lines().find_map(|l| l.find("pc = ").map(|i| &l[i + 5..])))
        .and_then(parse_hex_token);
    Some(Frame {
        name,
        pc: pc.unwrap_or(0),
        source_location: None,
        block: None,
    })
}

fn parse_hex_value(out: &str) -> Option<u64> {
    out.rsplit('=').next().and_then(parse_hex_token)
}

fn parse_hex_token(s: &str) -> Option<u64> {
    let s = s.trim();
    let token = s.split_whitespace().next()?;
    let token = token.trim_start_matches("0x");
    u64::from_str_radix(token, 16).ok()
}

fn parse_byte_dump(out: &str, len: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(len);
    for tok in out.split_whitespace() {
        if let Some(stripped) = tok.strip_prefix("0x") {
            if let Ok(b) = u8::from_str_radix(stripped, 16) {
                bytes.push(b);
            }
        }
        if bytes.len() == len {
            break;
        }
    }
    bytes
}

fn parse_breakpoint_number(out: &str) -> Option<u32> {
    out.split_whitespace()
        .skip_while(|w| !w.eq_ignore_ascii_case("breakpoint") && !w.eq_ignore_ascii_case("temporary"))
        .find_map(|w| w.parse::<u32>().ok())
}
