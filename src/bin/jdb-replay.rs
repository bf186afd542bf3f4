use std::fs::File;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use jdb_trace::adapter::gdb::GdbAdapter;
use jdb_trace::config::Config;
use jdb_trace::logging::init_logging;
use jdb_trace::options::ReplayOptions;
use jdb_trace::replayer::Replayer;
use jdb_trace::trace_log::read_log;

fn main() -> Result<()> {
    let opts = ReplayOptions::parse();
    let _guard = init_logging(opts.log_filter.as_deref())?;

    let config = Config::load(&opts.config).context("loading run configuration")?;
    let log_path = config.log_path()?;
    let output_path = config.output_path()?;

    let records = read_log(log_path).context("reading trace log")?;
    let output_file = File::create(output_path)
        .with_context(|| format!("creating output file {}", output_path.display()))?;

    let adapter = GdbAdapter::new().context("spawning gdb")?;
    let mut replayer = Replayer::new(Box::new(adapter), config.srcdir.clone(), config.step_timeout, output_file);

    replayer
        .start(&config.executable, &config.args)
        .context("starting replay session")?;

    info!(records = records.len(), "replaying trace log");
    for tpos in records {
        if let Err(e) = replayer.process_one(tpos) {
            replayer.close();
            return Err(e).context("replay step failed");
        }
    }
    replayer.close();

    Ok(())
}
