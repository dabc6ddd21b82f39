// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Message severity levels and their presentation attributes.

use std::fmt;

/// Severity of a log message, ordered from most to least important.
///
/// Numeric values are part of the external interface: they appear in level
/// comparisons, in the `--msg-level` option and in IPC `request_log_messages`
/// arguments. `Stats` is special-cased by the dispatcher and only routed to
/// the stats file and to buffer sinks that explicitly ask for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i8)]
pub enum Level {
    Fatal = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Status = 4,
    Verbose = 5,
    Debug = 6,
    Trace = 7,
    Stats = 8,
}

/// Threshold value meaning "print nothing". Not a message level.
pub const LEVEL_NONE: i8 = -1;

/// Highest valid message level value.
pub const LEVEL_MAX: i8 = Level::Stats as i8;

/// All message levels, in numeric order.
pub const ALL_LEVELS: [Level; 9] = [
    Level::Fatal,
    Level::Error,
    Level::Warn,
    Level::Info,
    Level::Status,
    Level::Verbose,
    Level::Debug,
    Level::Trace,
    Level::Stats,
];

impl Level {
    pub const fn as_i8(self) -> i8 {
        self as i8
    }

    pub fn from_i8(v: i8) -> Option<Level> {
        ALL_LEVELS.get(usize::try_from(v).ok()?).copied()
    }

    /// Canonical lowercase name, as used on the wire and in options.
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Fatal => "fatal",
            Level::Error => "error",
            Level::Warn => "warn",
            Level::Info => "info",
            Level::Status => "status",
            Level::Verbose => "v",
            Level::Debug => "debug",
            Level::Trace => "trace",
            Level::Stats => "stats",
        }
    }

    pub fn from_str(s: &str) -> Option<Level> {
        ALL_LEVELS.iter().copied().find(|l| l.as_str() == s)
    }

    /// Parse a threshold name: a level name or `"none"` for -1.
    pub fn threshold_from_str(s: &str) -> Option<i8> {
        if s == "none" {
            return Some(LEVEL_NONE);
        }
        Level::from_str(s).map(Level::as_i8)
    }

    /// Single-character tag used in log file lines.
    pub fn file_tag(self) -> char {
        // as_str() names are all non-empty ASCII.
        self.as_str().chars().next().unwrap()
    }

    /// ANSI SGR sequence for terminal output, or `None` for the default
    /// color.
    pub fn term_color(self) -> Option<&'static str> {
        match self {
            Level::Fatal => Some("\x1b[31;1m"),
            Level::Error => Some("\x1b[31m"),
            Level::Warn => Some("\x1b[33m"),
            Level::Verbose => Some("\x1b[32m"),
            Level::Debug | Level::Trace => Some("\x1b[90m"),
            Level::Info | Level::Status | Level::Stats => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable color for a module prefix in module-name mode, picked from a small
/// palette by hashing the name.
pub fn prefix_color(name: &str) -> &'static str {
    const PALETTE: [&str; 8] = [
        "\x1b[36m", // cyan
        "\x1b[35m", // magenta
        "\x1b[34m", // blue
        "\x1b[33m", // yellow
        "\x1b[32m", // green
        "\x1b[31m", // red
        "\x1b[96m", // bright cyan
        "\x1b[95m", // bright magenta
    ];
    let mut hash = 0u32;
    for b in name.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(b as u32);
    }
    PALETTE[(hash as usize) % PALETTE.len()]
}

pub const TERM_RESET: &str = "\x1b[0m";
