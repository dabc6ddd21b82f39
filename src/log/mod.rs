// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Logging and messaging core.
//!
//! One [`LogRoot`] per process owns the configuration, output files and
//! buffer sinks. Modules log through [`LogHandle`]s, which keep the
//! per-message level test lock-free. See the level-named macros in
//! [`crate::log_error!`] and friends for the usual entry points.

mod buffer;
mod handle;
mod level;
mod macros;
mod ring;
mod root;

pub use buffer::{BufferFilter, LogBuffer, LogEntry, OVERFLOW_PREFIX};
pub use handle::LogHandle;
pub use level::{prefix_color, Level, ALL_LEVELS, LEVEL_MAX, LEVEL_NONE, TERM_RESET};
pub use ring::Ring;
pub use root::LogRoot;
