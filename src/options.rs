use std::path::PathBuf;

use clap::Parser;

/// Records one randomized execution of a multithreaded program as a
/// per-thread source-location trace.
#[derive(Parser, Debug)]
#[command(name = "jdb-trace", version, about)]
pub struct TraceOptions {
    /// Path to the run's JSON configuration file.
    pub config: PathBuf,

    /// Override the logging filter (defaults to `RUST_LOG`, then `info`).
    #[arg(long)]
    pub log_filter: Option<String>,
}

/// Replays a trace log produced by `jdb-trace` against a fresh debugger
/// session, emitting each recorded stop's PC offset.
#[derive(Parser, Debug)]
#[command(name = "jdb-replay", version, about)]
pub struct ReplayOptions {
    /// Path to the run's JSON configuration file.
    pub config: PathBuf,

    #[arg(long)]
    pub log_filter: Option<String>,
}
