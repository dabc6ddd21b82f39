// SPDX-License-Identifier: Apache-2.0 OR MIT

//! One IPC session: a bidirectional line-oriented conversation with a
//! single client.
//!
//! The session task multiplexes two sources: request lines from the
//! transport and events from the backend. Requests get exactly one reply
//! line each; events are written whenever they arrive. A write failure
//! from a vanished peer silences the write side but keeps consuming
//! commands; any other write error, read EOF, a read error or a backend
//! shutdown ends the session.

use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec};

use super::protocol::{ClientEvent, IpcError, Reply};
use super::ClientApi;
use crate::log::LogHandle;

/// Upper bound on one request line. Protects against a client streaming an
/// unterminated line forever.
const MAX_LINE: usize = 1024 * 1024;

pub struct SessionParams {
    pub client: Arc<dyn ClientApi>,
    pub events: mpsc::UnboundedReceiver<ClientEvent>,
    pub log: LogHandle,
    /// False for receive-only transports (plain files); no replies or
    /// events are ever written.
    pub writable: bool,
}

/// Drive one session to completion.
pub async fn run<S>(stream: S, mut params: SessionParams)
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    let name = params.client.name();
    let log = params.log;
    crate::log_verbose!(log, "client {name} connected\n");

    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut lines = FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_LINE));
    let mut writable = params.writable;

    loop {
        tokio::select! {
            event = params.events.recv() => {
                match event {
                    None | Some(ClientEvent::Shutdown) => {
                        crate::log_verbose!(log, "client {name}: backend shutdown\n");
                        break;
                    }
                    Some(event) => {
                        if let Some(json) = event.to_json() {
                            if !write_line(&mut write_half, &mut writable, &log, &json.to_string()).await {
                                break;
                            }
                        }
                    }
                }
            }
            line = lines.next() => {
                match line {
                    None => break, // EOF
                    Some(Err(e)) => {
                        crate::log_error!(log, "client {name}: read error: {e}\n");
                        break;
                    }
                    Some(Ok(line)) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() || trimmed.starts_with('#') {
                            continue;
                        }
                        if trimmed.starts_with('{') {
                            let reply = handle_request(params.client.as_ref(), trimmed);
                            if !write_line(&mut write_half, &mut writable, &log, &reply.to_line()).await {
                                break;
                            }
                        } else {
                            // Legacy mode: the line is a free-text command,
                            // no reply is sent.
                            params.client.execute_text(trimmed);
                        }
                    }
                }
            }
        }
    }
    crate::log_verbose!(log, "client {name} disconnected\n");
}

/// Write one line. Returns false when the session must close: a dead peer
/// descriptor only flips `writable` off, every other I/O error is fatal.
async fn write_line<W: AsyncWrite + Unpin>(
    w: &mut W,
    writable: &mut bool,
    log: &LogHandle,
    line: &str,
) -> bool {
    if !*writable {
        return true;
    }
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');
    match w.write_all(&buf).await {
        Ok(()) => true,
        Err(e) if peer_gone(&e) => {
            // The attached handle may still have local work to do, so the
            // session keeps reading with its write side silenced.
            crate::log_warn!(log, "write error, dropping further output: {e}\n");
            *writable = false;
            true
        }
        Err(e) => {
            crate::log_error!(log, "write error: {e}\n");
            false
        }
    }
}

/// "Descriptor no longer valid" error kinds: the peer went away.
fn peer_gone(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
    )
}

/// Process one JSON request line and build its reply. Never touches the
/// transport; errors all turn into error replies.
fn handle_request(client: &dyn ClientApi, line: &str) -> Reply {
    let parsed: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            return Reply::new(Err(IpcError::Other(format!("JSON parse error: {e}"))), None)
        }
    };
    let request_id = parsed.get("request_id").and_then(Value::as_i64);
    let Some(command) = parsed.get("command") else {
        return Reply::new(Err(IpcError::InvalidParameter), request_id);
    };
    Reply::new(dispatch(client, command), request_id)
}

/// Route a command value: built-in meta-commands are handled here with
/// strict argument checks, anything else goes to the backend whole.
fn dispatch(client: &dyn ClientApi, command: &Value) -> Result<Option<Value>, IpcError> {
    let args = match command {
        Value::Array(items) => items.as_slice(),
        // Non-array commands (e.g. a command string) go straight through.
        _ => return client.execute_node(command).map(Some),
    };
    let Some(name) = args.first().and_then(Value::as_str) else {
        return Err(IpcError::InvalidParameter);
    };
    let rest = &args[1..];

    match name {
        "client_name" => {
            check_arity(rest, 0)?;
            Ok(Some(Value::String(client.name())))
        }
        "get_version" => {
            check_arity(rest, 0)?;
            Ok(Some(Value::from(client.api_version())))
        }
        "get_time_us" => {
            check_arity(rest, 0)?;
            Ok(Some(Value::from(client.time_us())))
        }
        "get_property" => {
            check_arity(rest, 1)?;
            client.get_property(str_arg(rest, 0)?).map(Some)
        }
        "get_property_string" => {
            check_arity(rest, 1)?;
            client
                .get_property_string(str_arg(rest, 0)?)
                .map(|s| Some(Value::String(s)))
        }
        "set_property" => {
            check_arity(rest, 2)?;
            client
                .set_property(str_arg(rest, 0)?, rest[1].clone())
                .map(|()| None)
        }
        "set_property_string" => {
            check_arity(rest, 2)?;
            client
                .set_property_string(str_arg(rest, 0)?, str_arg(rest, 1)?)
                .map(|()| None)
        }
        "observe_property" | "observe_property_string" => {
            check_arity(rest, 2)?;
            let id = int_arg(rest, 0)?;
            client
                .observe_property(id, str_arg(rest, 1)?, name.ends_with("_string"))
                .map(|()| None)
        }
        "unobserve_property" => {
            check_arity(rest, 1)?;
            client.unobserve_property(int_arg(rest, 0)?).map(|()| None)
        }
        "request_log_messages" => {
            check_arity(rest, 1)?;
            client.request_log_messages(str_arg(rest, 0)?).map(|()| None)
        }
        "enable_event" | "disable_event" => {
            check_arity(rest, 1)?;
            client
                .set_event_enabled(str_arg(rest, 0)?, name == "enable_event")
                .map(|()| None)
        }
        "suspend" => {
            check_arity(rest, 0)?;
            client.suspend();
            Ok(None)
        }
        "resume" => {
            check_arity(rest, 0)?;
            client.resume();
            Ok(None)
        }
        _ => client.execute_node(command).map(Some),
    }
}

fn check_arity(rest: &[Value], expected: usize) -> Result<(), IpcError> {
    if rest.len() == expected {
        Ok(())
    } else {
        Err(IpcError::InvalidParameter)
    }
}

fn str_arg(rest: &[Value], index: usize) -> Result<&str, IpcError> {
    rest[index].as_str().ok_or(IpcError::InvalidParameter)
}

fn int_arg(rest: &[Value], index: usize) -> Result<u64, IpcError> {
    rest[index].as_u64().ok_or(IpcError::InvalidParameter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Minimal scripted backend recording calls.
    struct FakeClient {
        calls: Mutex<Vec<String>>,
    }

    impl FakeClient {
        fn new() -> FakeClient {
            FakeClient { calls: Mutex::new(Vec::new()) }
        }
        fn record(&self, s: impl Into<String>) {
            self.calls.lock().unwrap().push(s.into());
        }
    }

    impl ClientApi for FakeClient {
        fn name(&self) -> String {
            "test-client".into()
        }
        fn api_version(&self) -> u64 {
            1
        }
        fn time_us(&self) -> i64 {
            123
        }
        fn execute_text(&self, text: &str) {
            self.record(format!("text:{text}"));
        }
        fn execute_node(&self, command: &Value) -> Result<Value, IpcError> {
            self.record(format!("node:{command}"));
            Ok(Value::Null)
        }
        fn get_property(&self, name: &str) -> Result<Value, IpcError> {
            match name {
                "pause" => Ok(json!(false)),
                _ => Err(IpcError::PropertyNotFound),
            }
        }
        fn get_property_string(&self, name: &str) -> Result<String, IpcError> {
            self.get_property(name).map(|v| v.to_string())
        }
        fn set_property(&self, name: &str, value: Value) -> Result<(), IpcError> {
            self.record(format!("set:{name}={value}"));
            Ok(())
        }
        fn set_property_string(&self, name: &str, value: &str) -> Result<(), IpcError> {
            self.record(format!("sets:{name}={value}"));
            Ok(())
        }
        fn observe_property(&self, id: u64, name: &str, as_string: bool) -> Result<(), IpcError> {
            self.record(format!("observe:{id}:{name}:{as_string}"));
            Ok(())
        }
        fn unobserve_property(&self, id: u64) -> Result<(), IpcError> {
            self.record(format!("unobserve:{id}"));
            Ok(())
        }
        fn request_log_messages(&self, min_level: &str) -> Result<(), IpcError> {
            self.record(format!("logs:{min_level}"));
            Ok(())
        }
        fn set_event_enabled(&self, name: &str, enable: bool) -> Result<(), IpcError> {
            self.record(format!("event:{name}:{enable}"));
            Ok(())
        }
        fn suspend(&self) {
            self.record("suspend");
        }
        fn resume(&self) {
            self.record("resume");
        }
    }

    fn request(client: &FakeClient, line: &str) -> Value {
        serde_json::from_str(&handle_request(client, line).to_line()).unwrap()
    }

    #[test]
    fn builtin_with_data_reply() {
        let c = FakeClient::new();
        let v = request(&c, r#"{"command": ["client_name"], "request_id": 5}"#);
        assert_eq!(v, json!({"error": "success", "data": "test-client", "request_id": 5}));
    }

    #[test]
    fn request_id_is_optional() {
        let c = FakeClient::new();
        let v = request(&c, r#"{"command": ["get_property", "pause"]}"#);
        assert_eq!(v, json!({"error": "success", "data": false}));
    }

    #[test]
    fn property_errors_map_to_codes() {
        let c = FakeClient::new();
        let v = request(&c, r#"{"command": ["get_property", "bogus"], "request_id": 1}"#);
        assert_eq!(v["error"], "property not found");
    }

    #[test]
    fn arity_and_types_are_checked_before_invoking() {
        let c = FakeClient::new();
        for bad in [
            r#"{"command": ["get_property"]}"#,
            r#"{"command": ["get_property", "a", "b"]}"#,
            r#"{"command": ["get_property", 5]}"#,
            r#"{"command": ["observe_property", "x", "pause"]}"#,
            r#"{"command": []}"#,
            r#"{"command": [12]}"#,
            r#"{"no_command": true}"#,
        ] {
            let v = request(&c, bad);
            assert_eq!(v["error"], "invalid parameter", "input: {bad}");
        }
        assert!(c.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn malformed_json_still_gets_a_reply() {
        let c = FakeClient::new();
        let v = request(&c, r#"{"command": ["client_name""#);
        assert!(v["error"].as_str().unwrap().contains("JSON parse error"));
    }

    #[test]
    fn unknown_commands_fall_through_to_the_backend() {
        let c = FakeClient::new();
        let v = request(&c, r#"{"command": ["show-text", "hi", 100]}"#);
        assert_eq!(v["error"], "success");
        let calls = c.calls.lock().unwrap();
        assert_eq!(calls.as_slice(), [r#"node:["show-text","hi",100]"#]);
    }

    #[test]
    fn observe_string_variant_sets_the_flag() {
        let c = FakeClient::new();
        request(&c, r#"{"command": ["observe_property_string", 9, "pause"]}"#);
        assert_eq!(c.calls.lock().unwrap().as_slice(), ["observe:9:pause:true"]);
    }

    /// Writer that fails every write with a fixed error kind.
    struct FailingWriter(std::io::ErrorKind);

    impl AsyncWrite for FailingWriter {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &[u8],
        ) -> std::task::Poll<Result<usize, std::io::Error>> {
            std::task::Poll::Ready(Err(std::io::Error::new(self.0, "injected")))
        }
        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), std::io::Error>> {
            std::task::Poll::Ready(Ok(()))
        }
        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), std::io::Error>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn dead_peer_only_silences_writes() {
        let log = LogHandle::null();
        let mut w = FailingWriter(std::io::ErrorKind::BrokenPipe);
        let mut writable = true;
        assert!(write_line(&mut w, &mut writable, log, "x").await);
        assert!(!writable, "a gone peer flips the write side off");
        // Suppressed writes are silent no-ops, not new attempts.
        assert!(write_line(&mut w, &mut writable, log, "y").await);
    }

    #[tokio::test]
    async fn other_write_errors_close_the_session() {
        let log = LogHandle::null();
        let mut w = FailingWriter(std::io::ErrorKind::PermissionDenied);
        let mut writable = true;
        assert!(!write_line(&mut w, &mut writable, log, "x").await);
    }
}
