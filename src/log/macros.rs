// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Level-named logging macros.
//!
//! All of them take a [`crate::log::LogHandle`] (or a reference) and a
//! format string. Formatting cost is only paid when the handle's level test
//! passes; the macros expand to a call through `format_args!` so arguments
//! are not stringified up front.

/// Log at an explicit level: `log_msg!(log, Level::Warn, "...")`.
#[macro_export]
macro_rules! log_msg {
    ($log:expr, $level:expr, $($arg:tt)*) => {
        $log.log($level, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_fatal {
    ($log:expr, $($arg:tt)*) => {
        $log.log($crate::log::Level::Fatal, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($log:expr, $($arg:tt)*) => {
        $log.log($crate::log::Level::Error, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($log:expr, $($arg:tt)*) => {
        $log.log($crate::log::Level::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($log:expr, $($arg:tt)*) => {
        $log.log($crate::log::Level::Info, format_args!($($arg)*))
    };
}

/// Transient status line; overwrites the previous status on the terminal.
#[macro_export]
macro_rules! log_status {
    ($log:expr, $($arg:tt)*) => {
        $log.log($crate::log::Level::Status, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_verbose {
    ($log:expr, $($arg:tt)*) => {
        $log.log($crate::log::Level::Verbose, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_debug {
    ($log:expr, $($arg:tt)*) => {
        $log.log($crate::log::Level::Debug, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_trace {
    ($log:expr, $($arg:tt)*) => {
        $log.log($crate::log::Level::Trace, format_args!($($arg)*))
    };
}

/// Raw samples for the stats file; not routed to terminal or log file.
#[macro_export]
macro_rules! log_stats {
    ($log:expr, $($arg:tt)*) => {
        $log.log($crate::log::Level::Stats, format_args!($($arg)*))
    };
}
