// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Standalone log/control daemon.
//!
//! Runs the logging core with an IPC control surface and a small built-in
//! property store, mainly useful for exercising the protocol end to end:
//!
//! ```text
//! logmuxd --ipc-server /tmp/logmux.sock -v --log-file /tmp/logmux.log
//! echo '{ "command": ["get_property", "pause"] }' | socat - /tmp/logmux.sock
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use serde_json::Value;
use tokio::sync::mpsc;

use logmux::command;
use logmux::config::LogConfig;
use logmux::ipc::{self, ClientApi, ClientBackend, ClientEvent, IpcError};
use logmux::log::{BufferFilter, Level, LogHandle, LogRoot};
use logmux::{log_error, log_info, log_verbose};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Raise the terminal level one step per occurrence
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only print warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Per-module levels, e.g. 'all=warn,ipc=debug'
    #[arg(long, value_name = "LIST")]
    msg_level: Option<String>,

    /// Show module names on every line
    #[arg(long)]
    msg_module: bool,

    /// Show timestamps on every line
    #[arg(long)]
    msg_time: bool,

    /// Disable terminal output entirely
    #[arg(long)]
    no_terminal: bool,

    /// Disable terminal colors
    #[arg(long)]
    no_color: bool,

    /// Append all messages up to debug level to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<std::path::PathBuf>,

    /// Append raw stats samples to this file
    #[arg(long, value_name = "PATH")]
    stats_file: Option<std::path::PathBuf>,

    /// Listen for JSON IPC clients on this socket path (or @name)
    #[arg(long, value_name = "SOCKET")]
    ipc_server: Option<String>,

    /// Read commands from a file, FIFO, or fd://N
    #[arg(long, value_name = "PATH")]
    input_file: Option<String>,
}

impl Args {
    fn to_log_config(&self) -> Result<LogConfig> {
        let mut cfg = LogConfig {
            verbosity: i32::from(self.verbose),
            quiet: self.quiet,
            module_names: self.msg_module,
            show_time: self.msg_time,
            use_terminal: !self.no_terminal,
            color: !self.no_color,
            log_file: self.log_file.clone(),
            stats_file: self.stats_file.clone(),
            ..LogConfig::default()
        };
        if let Some(spec) = &self.msg_level {
            cfg.msg_levels = LogConfig::parse_msg_levels(spec)?;
        }
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (root, log) = LogRoot::new();
    root.reconfigure(&args.to_log_config()?, &log);

    let backend = Backend::new(Arc::clone(&root), log.new_child(Some("core")));

    let server = match &args.ipc_server {
        Some(spec) => Some(
            ipc::IpcServer::listen(
                spec,
                backend.clone() as Arc<dyn ClientBackend>,
                log.new_child(Some("ipc")),
            )
            .await?,
        ),
        None => None,
    };
    if let Some(spec) = &args.input_file {
        ipc::serve_file(
            spec,
            backend.clone() as Arc<dyn ClientBackend>,
            log.new_child(Some("input")),
        )
        .await?;
    }
    if server.is_none() && args.input_file.is_none() {
        log_error!(log, "nothing to do: pass --ipc-server or --input-file\n");
        std::process::exit(1);
    }

    log_info!(log, "ready\n");
    tokio::signal::ctrl_c().await?;
    log_info!(log, "shutting down\n");

    backend.shutdown();
    if let Some(server) = server {
        server.shutdown().await;
    }
    Ok(())
}

/// Shared daemon state behind the per-client API: a property map and the
/// list of attached clients.
struct Backend {
    /// Self-reference so `attach` can hand each client a strong handle.
    me: Weak<Backend>,
    root: Arc<LogRoot>,
    log: LogHandle,
    start: Instant,
    properties: Mutex<HashMap<String, Value>>,
    clients: Mutex<Vec<ClientState>>,
    next_client: AtomicU64,
}

struct ClientState {
    name: String,
    events: mpsc::UnboundedSender<ClientEvent>,
    observed: Vec<(u64, String)>,
    /// Stop signal for the log forwarder task, while streaming is on.
    /// Dropping it makes the task unregister its buffer and exit.
    log_stream: Option<tokio::sync::oneshot::Sender<()>>,
}

impl Backend {
    fn new(root: Arc<LogRoot>, log: LogHandle) -> Arc<Backend> {
        let mut properties = HashMap::new();
        properties.insert("pause".to_string(), Value::Bool(false));
        properties.insert("volume".to_string(), Value::from(100.0));
        properties.insert("speed".to_string(), Value::from(1.0));
        Arc::new_cyclic(|me| Backend {
            me: me.clone(),
            root,
            log,
            start: Instant::now(),
            properties: Mutex::new(properties),
            clients: Mutex::new(Vec::new()),
            next_client: AtomicU64::new(1),
        })
    }

    /// Tell every session to close; used on daemon shutdown.
    fn shutdown(&self) {
        for client in self.clients.lock().unwrap().iter() {
            let _ = client.events.send(ClientEvent::Shutdown);
        }
    }

    fn set_property_value(&self, name: &str, value: Value) -> Result<(), IpcError> {
        let mut props = self.properties.lock().unwrap();
        if !props.contains_key(name) {
            return Err(IpcError::PropertyNotFound);
        }
        props.insert(name.to_string(), value.clone());
        drop(props);

        // Fan out property-change events to every observer.
        for client in self.clients.lock().unwrap().iter() {
            for (id, observed) in &client.observed {
                if observed == name {
                    let _ = client.events.send(ClientEvent::PropertyChange {
                        id: *id,
                        name: name.to_string(),
                        data: value.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn with_client<R>(&self, name: &str, f: impl FnOnce(&mut ClientState) -> R) -> Option<R> {
        let mut clients = self.clients.lock().unwrap();
        clients.iter_mut().find(|c| c.name == name).map(f)
    }

    fn run_command(&self, client_name: &str, cmd: &command::Command) -> Result<Value, IpcError> {
        match cmd.name.as_str() {
            "ignore" => Ok(Value::Null),
            "print-text" => {
                let text = cmd.args[0].as_str().unwrap_or_default();
                log_info!(self.log, "{text}\n");
                Ok(Value::Null)
            }
            "show-text" => {
                let text = cmd.args[0].as_str().unwrap_or_default();
                logmux::log_status!(self.log, "{text}");
                Ok(Value::Null)
            }
            "set" => {
                let name = cmd.args[0].as_str().unwrap_or_default();
                let value = cmd.args[1].as_str().unwrap_or_default();
                self.set_property_value(name, Value::String(value.to_string()))?;
                Ok(Value::Null)
            }
            "quit" => {
                let code = cmd.args[0].as_int().unwrap_or(0);
                log_info!(self.log, "quit requested by {client_name}\n");
                std::process::exit(code as i32);
            }
            _ => Err(IpcError::Unsupported),
        }
    }
}

impl ClientBackend for Backend {
    fn attach(&self, client_name: &str) -> (Arc<dyn ClientApi>, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_client.fetch_add(1, Ordering::Relaxed);
        let name = if client_name.is_empty() {
            format!("client{id}")
        } else {
            client_name.to_string()
        };
        self.clients.lock().unwrap().push(ClientState {
            name: name.clone(),
            events: tx,
            observed: Vec::new(),
            log_stream: None,
        });
        log_verbose!(self.log, "attached client {name}\n");
        let client = Client {
            // attach is only reachable through the owning Arc.
            backend: self.me.upgrade().expect("backend dropped"),
            name,
        };
        (Arc::new(client), rx)
    }
}

/// Per-connection view of the backend.
struct Client {
    backend: Arc<Backend>,
    name: String,
}

impl Drop for Client {
    fn drop(&mut self) {
        // Detach on disconnect: drops observers and the log stream handle.
        self.backend
            .clients
            .lock()
            .unwrap()
            .retain(|c| c.name != self.name);
        log_verbose!(self.backend.log, "detached client {}\n", self.name);
    }
}

impl ClientApi for Client {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn api_version(&self) -> u64 {
        1
    }

    fn time_us(&self) -> i64 {
        self.backend.start.elapsed().as_micros() as i64
    }

    fn execute_text(&self, text: &str) {
        let location = format!("client '{}'", self.name);
        if let Ok(cmd) = command::parse_str(&self.backend.log, text, &location) {
            if let Err(e) = self.backend.run_command(&self.name, &cmd) {
                log_error!(self.backend.log, "{location}: {}: {e}\n", cmd.name);
            }
        }
    }

    fn execute_node(&self, node: &Value) -> Result<Value, IpcError> {
        let cmd = command::parse_node(&self.backend.log, node)
            .map_err(|e| IpcError::Other(e.to_string()))?;
        self.backend.run_command(&self.name, &cmd)
    }

    fn get_property(&self, name: &str) -> Result<Value, IpcError> {
        self.backend
            .properties
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or(IpcError::PropertyNotFound)
    }

    fn get_property_string(&self, name: &str) -> Result<String, IpcError> {
        self.get_property(name).map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
    }

    fn set_property(&self, name: &str, value: Value) -> Result<(), IpcError> {
        self.backend.set_property_value(name, value)
    }

    fn set_property_string(&self, name: &str, value: &str) -> Result<(), IpcError> {
        self.backend
            .set_property_value(name, Value::String(value.to_string()))
    }

    fn observe_property(&self, id: u64, name: &str, _as_string: bool) -> Result<(), IpcError> {
        self.backend
            .with_client(&self.name, |c| c.observed.push((id, name.to_string())))
            .ok_or(IpcError::Unsupported)
    }

    fn unobserve_property(&self, id: u64) -> Result<(), IpcError> {
        self.backend
            .with_client(&self.name, |c| c.observed.retain(|(i, _)| *i != id))
            .ok_or(IpcError::Unsupported)
    }

    fn request_log_messages(&self, min_level: &str) -> Result<(), IpcError> {
        if min_level == "no" || min_level == "off" {
            // Dropping the stop sender ends the forwarder task.
            let _ = self.backend.with_client(&self.name, |c| c.log_stream = None);
            return Ok(());
        }
        let Some(level) = Level::from_str(min_level) else {
            return Err(IpcError::InvalidParameter);
        };

        // A capture buffer feeds the client's event channel; the wakeup
        // pokes a forwarder task that drains it outside the logging lock.
        let (wake_tx, mut wake_rx) = mpsc::unbounded_channel::<()>();
        let buffer = self.backend.root.register_buffer(
            256,
            BufferFilter::AtMost(level),
            Some(Box::new(move || {
                let _ = wake_tx.send(());
            })),
        );
        let events = self
            .backend
            .with_client(&self.name, |c| c.events.clone())
            .ok_or(IpcError::Unsupported)?;
        let root = Arc::clone(&self.backend.root);
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            'run: loop {
                tokio::select! {
                    _ = &mut stop_rx => break 'run,
                    woken = wake_rx.recv() => {
                        if woken.is_none() {
                            break 'run;
                        }
                        while let Some(entry) = buffer.read() {
                            let sent = events.send(ClientEvent::Log {
                                prefix: entry.prefix,
                                level: entry.level,
                                text: entry.text,
                            });
                            if sent.is_err() {
                                break 'run;
                            }
                        }
                    }
                }
            }
            root.unregister_buffer(&buffer);
        });
        // Replacing the sender drops any previous stream's stop handle.
        let _ = self
            .backend
            .with_client(&self.name, |c| c.log_stream = Some(stop_tx));
        Ok(())
    }

    fn set_event_enabled(&self, _name: &str, _enable: bool) -> Result<(), IpcError> {
        // All event classes are always on in this daemon.
        Ok(())
    }

    fn suspend(&self) {}

    fn resume(&self) {}
}
