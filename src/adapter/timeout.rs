//! Cooperative cancellation for otherwise-blocking debugger commands.
//!
//! Unsticking a blocking debugger call by signalling its process from a
//! side channel is simple but racy against whatever the process was doing
//! when the signal landed. This module instead prefers the debugger's own
//! async-command protocol: issue the command, wait for its reply with a
//! bound, and if the bound elapses, send an interrupt request over the
//! same channel rather than an out-of-band OS signal.
//!
//! This module provides that race as a reusable primitive: wait on a
//! reply channel up to `timeout`, and if nothing arrives in time, invoke
//! `on_timeout` (which sends `-exec-interrupt` in [`super::gdb`]) and then
//! block for the debugger's confirmation that the command was actually
//! interrupted, so the adapter never returns to the caller while a
//! command is still in flight underneath it.

use std::time::Duration;

use crossbeam_channel::Receiver;

/// Waits for a reply on `reply_rx`. If none arrives within `timeout`,
/// calls `on_timeout` once and then blocks until *some* reply follows
/// (the interrupted-state confirmation), returning `None` to signal that
/// the original command timed out rather than completed normally.
pub fn race_reply<T>(
    reply_rx: &Receiver<T>,
    timeout: Duration,
    on_timeout: impl FnOnce(),
) -> Option<T> {
    crossbeam_channel::select! {
        recv(reply_rx) -> msg => msg.ok(),
        default(timeout) => {
            on_timeout();
            // Drain the eventual interrupted-state confirmation so the
            // next command doesn't race against this one's leftovers,
            // but report the original command as timed out.
            let _ = reply_rx.recv();
            None
        }
    }
}
