use std::fs::File;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use jdb_trace::adapter::gdb::GdbAdapter;
use jdb_trace::config::Config;
use jdb_trace::logging::init_logging;
use jdb_trace::options::TraceOptions;
use jdb_trace::tracer::blacklist::Blacklist;
use jdb_trace::tracer::{Tracer, TracerConfig};

fn main() -> Result<()> {
    let opts = TraceOptions::parse();
    let _guard = init_logging(opts.log_filter.as_deref())?;

    let config = Config::load(&opts.config).context("loading run configuration")?;
    let log_path = config.log_path()?;
    let blacklist_path = config.blacklist_path()?;

    let log_file = File::create(log_path).with_context(|| format!("creating trace log {}", log_path.display()))?;
    let blacklist_file = File::create(blacklist_path)
        .with_context(|| format!("creating blacklist file {}", blacklist_path.display()))?;

    let adapter = GdbAdapter::new().context("spawning gdb")?;
    let tracer_config = TracerConfig {
        step_timeout: config.step_timeout,
        only_multithread: config.only_multithread,
        go_deeper: config.go_deeper,
        ..TracerConfig::default()
    };
    let mut tracer = Tracer::new(
        Box::new(adapter),
        config.srcdir.clone(),
        tracer_config,
        log_file,
        Blacklist::new(blacklist_file),
    );

    tracer
        .start(&config.executable, &config.args)
        .context("starting tracer session")?;

    info!(executable = %config.executable.display(), "tracer session started");
    let mut steps = 0u64;
    while tracer.step() {
        tracer.update_log();
        steps += 1;
    }
    info!(steps, "tracer session ended");
    tracer.close();

    Ok(())
}
