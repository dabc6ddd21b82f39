// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Logging configuration snapshot.
//!
//! A `LogConfig` carries everything [`crate::log::LogRoot::reconfigure`]
//! needs. It is cheap to clone and serde-friendly so it can arrive over IPC
//! or from a config file as well as from the command line.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Base verbosity added to the default `status` threshold. Each step
    /// raises the effective level by one (`-v -v` lands on `debug`).
    pub verbosity: i32,
    /// Clamp terminal output to warnings and worse.
    pub quiet: bool,
    /// Per-module overrides, applied in order with last match winning.
    /// Patterns are full verbose prefixes, path prefixes (matching at a `/`
    /// boundary), or `"all"`.
    pub msg_levels: Vec<(String, String)>,
    /// Show the full module prefix on every terminal line, aligned.
    pub module_names: bool,
    /// Prepend wall-clock timestamps to terminal lines.
    pub show_time: bool,
    /// Master switch for terminal output.
    pub use_terminal: bool,
    /// ANSI colors on the terminal (only when stdout is a tty).
    pub color: bool,
    pub log_file: Option<PathBuf>,
    pub stats_file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            verbosity: 0,
            quiet: false,
            msg_levels: Vec::new(),
            module_names: false,
            show_time: false,
            use_terminal: true,
            color: true,
            log_file: None,
            stats_file: None,
        }
    }
}

impl LogConfig {
    /// Parse a `--msg-level` style list: comma-separated `pattern=level`
    /// pairs, e.g. `all=warn,ipc=debug,cmd/parse=trace`. Level names are
    /// validated here; pattern strings are free-form.
    pub fn parse_msg_levels(spec: &str) -> Result<Vec<(String, String)>> {
        let mut out = Vec::new();
        for part in spec.split(',') {
            if part.is_empty() {
                continue;
            }
            let (pattern, level) = part
                .split_once('=')
                .ok_or_else(|| anyhow!("missing '=' in message level entry '{part}'"))?;
            if pattern.is_empty() {
                return Err(anyhow!("empty module pattern in '{part}'"));
            }
            if crate::log::Level::threshold_from_str(level).is_none() {
                return Err(anyhow!("unknown level name '{level}' in '{part}'"));
            }
            out.push((pattern.to_string(), level.to_string()));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_terminal() {
        let cfg = LogConfig::default();
        assert!(cfg.use_terminal);
        assert!(cfg.color);
        assert_eq!(cfg.verbosity, 0);
        assert!(cfg.msg_levels.is_empty());
    }

    #[test]
    fn msg_level_list_parses_in_order() {
        let levels = LogConfig::parse_msg_levels("all=warn,ipc=debug,cmd/parse=none").unwrap();
        assert_eq!(
            levels,
            vec![
                ("all".to_string(), "warn".to_string()),
                ("ipc".to_string(), "debug".to_string()),
                ("cmd/parse".to_string(), "none".to_string()),
            ]
        );
    }

    #[test]
    fn msg_level_list_rejects_bad_entries() {
        assert!(LogConfig::parse_msg_levels("all").is_err());
        assert!(LogConfig::parse_msg_levels("all=loud").is_err());
        assert!(LogConfig::parse_msg_levels("=warn").is_err());
    }

    #[test]
    fn round_trips_through_json() {
        let mut cfg = LogConfig::default();
        cfg.verbosity = 2;
        cfg.msg_levels.push(("ipc".into(), "trace".into()));
        cfg.log_file = Some("/tmp/x.log".into());
        let json = serde_json::to_string(&cfg).unwrap();
        let back: LogConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.verbosity, 2);
        assert_eq!(back.msg_levels.len(), 1);
        assert_eq!(back.log_file, Some(PathBuf::from("/tmp/x.log")));
    }
}
