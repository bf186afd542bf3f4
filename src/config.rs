//! JSON run configuration shared by both binaries.
//!
//! Both the tracer and the replayer are handed a path to a config file on
//! the command line rather than through an environment variable, so the
//! same structure loads for either binary; fields the replayer needs but
//! the tracer doesn't (`output`) are simply absent from a tracer config
//! and vice versa.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

fn default_step_time() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    cmd: Vec<String>,
    srcdir: PathBuf,
    #[serde(default = "default_step_time")]
    steptime: f64,
    log: Option<PathBuf>,
    blacklist: Option<PathBuf>,
    output: Option<PathBuf>,
    #[serde(default)]
    only_multithread: bool,
    go_deeper: Option<f64>,
}

/// A fully validated run configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub srcdir: PathBuf,
    pub step_timeout: Duration,
    pub log: Option<PathBuf>,
    pub blacklist: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub only_multithread: bool,
    pub go_deeper: Option<f64>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawConfig = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Config::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let mut cmd = raw.cmd.into_iter();
        let executable = cmd.next().ok_or(ConfigError::EmptyCommand)?;
        let args: Vec<String> = cmd.collect();
        Ok(Config {
            executable: PathBuf::from(executable),
            args,
            srcdir: raw.srcdir,
            step_timeout: Duration::from_secs_f64(raw.steptime),
            log: raw.log,
            blacklist: raw.blacklist,
            output: raw.output,
            only_multithread: raw.only_multithread,
            go_deeper: raw.go_deeper,
        })
    }

    /// Resolves the trace-log path or returns the missing-key error a
    /// tracer run requires it for.
    pub fn log_path(&self) -> Result<&Path, ConfigError> {
        self.log
            .as_deref()
            .ok_or(ConfigError::MissingKey("log"))
    }

    pub fn blacklist_path(&self) -> Result<&Path, ConfigError> {
        self.blacklist
            .as_deref()
            .ok_or(ConfigError::MissingKey("blacklist"))
    }

    pub fn output_path(&self) -> Result<&Path, ConfigError> {
        self.output
            .as_deref()
            .ok_or(ConfigError::MissingKey("output"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(json.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_tracer_style_config() {
        let f = write_config(
            r#"{"cmd": ["a.out", "x"], "srcdir": "/src", "log": "trace.log", "blacklist": "bl.log"}"#,
        );
        let cfg = Config::load(f.path()).unwrap();
        assert_eq!(cfg.executable, PathBuf::from("a.out"));
        assert_eq!(cfg.args, vec!["x".to_string()]);
        assert_eq!(cfg.step_timeout, Duration::from_secs(1));
        assert_eq!(cfg.log_path().unwrap(), Path::new("trace.log"));
    }

    #[test]
    fn missing_cmd_entries_is_an_empty_command_error() {
        let f = write_config(r#"{"cmd": [], "srcdir": "/src"}"#);
        let cfg = Config::load(f.path());
        assert!(matches!(cfg, Err(ConfigError::EmptyCommand)));
    }

    #[test]
    fn missing_output_surfaces_as_missing_key() {
        let f = write_config(r#"{"cmd": ["a.out"], "srcdir": "/src"}"#);
        let cfg = Config::load(f.path()).unwrap();
        assert!(matches!(cfg.output_path(), Err(ConfigError::MissingKey("output"))));
    }

    #[test]
    fn custom_steptime_overrides_default() {
        let f = write_config(r#"{"cmd": ["a.out"], "srcdir": "/src", "steptime": 2.5}"#);
        let cfg = Config::load(f.path()).unwrap();
        assert_eq!(cfg.step_timeout, Duration::from_secs_f64(2.5));
    }

    #[test]
    fn scheduler_knobs_default_off_and_parse_when_present() {
        let f = write_config(r#"{"cmd": ["a.out"], "srcdir": "/src"}"#);
        let cfg = Config::load(f.path()).unwrap();
        assert!(!cfg.only_multithread);
        assert_eq!(cfg.go_deeper, None);

        let f = write_config(
            r#"{"cmd": ["a.out"], "srcdir": "/src", "only_multithread": true, "go_deeper": 0.3}"#,
        );
        let cfg = Config::load(f.path()).unwrap();
        assert!(cfg.only_multithread);
        assert_eq!(cfg.go_deeper, Some(0.3));
    }
}
