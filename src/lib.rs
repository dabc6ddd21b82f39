// SPDX-License-Identifier: Apache-2.0 OR MIT

//! logmux: a logging and control core for long-running processes.
//!
//! Three pieces fit together:
//!
//! - [`log`]: a process-wide logging root with per-module handles, a
//!   lock-free level test, terminal status-line rendering, log/stats files
//!   and lossy in-memory capture buffers.
//! - [`command`]: a typed command parser accepting free text, word arrays
//!   and structured JSON, validated against a static command table.
//! - [`ipc`]: a newline-delimited JSON protocol over local sockets,
//!   inherited descriptors and files, bridging external clients to an
//!   application-provided backend.

pub mod command;
pub mod config;
pub mod ipc;
pub mod log;
