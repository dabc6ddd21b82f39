// SPDX-License-Identifier: Apache-2.0 OR MIT

//! JSON IPC over local sockets, inherited descriptors and files.
//!
//! The server side is transport plumbing only: it frames newline-delimited
//! requests, answers the built-in meta-commands, and forwards everything
//! else to a [`ClientApi`] implementation provided by the embedding
//! application. Events flow the other way, from the backend to the client,
//! through a per-session channel.

mod protocol;
mod server;
mod session;

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

pub use protocol::{ClientEvent, IpcError, Reply};
pub use server::{serve_file, IpcServer};
pub use session::SessionParams;

/// What one connected client can do. Implemented by the embedding
/// application; all methods are called from the session task.
pub trait ClientApi: Send + Sync + 'static {
    /// Unique name of this client, e.g. `ipc-3`.
    fn name(&self) -> String;

    /// Protocol/API version reported by `get_version`.
    fn api_version(&self) -> u64;

    /// Microseconds of a monotonic clock, for client-side latency probes.
    fn time_us(&self) -> i64;

    /// Run a legacy free-text command line. Fire-and-forget: errors are
    /// logged, not returned.
    fn execute_text(&self, text: &str);

    /// Run a structured command (the JSON `command` value as received).
    /// Returns the command's result data.
    fn execute_node(&self, command: &Value) -> Result<Value, IpcError>;

    fn get_property(&self, name: &str) -> Result<Value, IpcError>;
    fn get_property_string(&self, name: &str) -> Result<String, IpcError>;
    fn set_property(&self, name: &str, value: Value) -> Result<(), IpcError>;
    fn set_property_string(&self, name: &str, value: &str) -> Result<(), IpcError>;

    /// Start watching a property; changes arrive as
    /// [`ClientEvent::PropertyChange`] tagged with `id`.
    fn observe_property(&self, id: u64, name: &str, as_string: bool) -> Result<(), IpcError>;
    fn unobserve_property(&self, id: u64) -> Result<(), IpcError>;

    /// Start streaming captured log lines at `min_level` and below as
    /// [`ClientEvent::Log`] events. A level of `"no"`/`"off"` stops them.
    fn request_log_messages(&self, min_level: &str) -> Result<(), IpcError>;

    /// Enable or disable delivery of one named event class, or `"all"`.
    fn set_event_enabled(&self, name: &str, enable: bool) -> Result<(), IpcError>;

    fn suspend(&self);
    fn resume(&self);
}

/// Handed one freshly attached client by name; returns its API surface and
/// the event stream the session will forward to the wire.
pub trait ClientBackend: Send + Sync + 'static {
    fn attach(&self, client_name: &str) -> (Arc<dyn ClientApi>, mpsc::UnboundedReceiver<ClientEvent>);
}
