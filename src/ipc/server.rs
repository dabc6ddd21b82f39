// SPDX-License-Identifier: Apache-2.0 OR MIT

//! IPC transports: listening local sockets (filesystem or abstract
//! namespace) and single fixed clients over inherited descriptors, FIFOs
//! and plain files.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use nix::sys::socket::{self, AddressFamily, Backlog, SockFlag, SockType, UnixAddr};
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::session::{self, SessionParams};
use super::ClientBackend;
use crate::log::LogHandle;

/// A running IPC listener. Dropping it does not stop the accept loop; call
/// [`IpcServer::shutdown`].
pub struct IpcServer {
    token: CancellationToken,
    task: JoinHandle<()>,
    /// Socket file to unlink on shutdown, for filesystem sockets.
    path: Option<PathBuf>,
}

impl IpcServer {
    /// Bind `spec` and start accepting clients. `spec` is a filesystem path
    /// or `@name` for the abstract socket namespace. A stale socket file at
    /// the path is replaced.
    pub async fn listen(
        spec: &str,
        backend: Arc<dyn ClientBackend>,
        log: LogHandle,
    ) -> Result<IpcServer> {
        let (listener, path) = if let Some(name) = spec.strip_prefix('@') {
            (bind_abstract(name)?, None)
        } else {
            (bind_path(spec)?, Some(PathBuf::from(spec)))
        };
        crate::log_info!(log, "listening on '{spec}'\n");

        let token = CancellationToken::new();
        let accept_token = token.clone();
        let task = tokio::spawn(async move {
            accept_loop(listener, backend, log, accept_token).await;
        });
        Ok(IpcServer { token, task, path })
    }

    /// Stop accepting, end all sessions, and remove the socket file.
    pub async fn shutdown(self) {
        self.token.cancel();
        let _ = self.task.await;
        if let Some(path) = &self.path {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn bind_path(path: &str) -> Result<UnixListener> {
    // A previous instance may have left its socket behind.
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("can't replace '{path}'")),
    }
    let listener = std::os::unix::net::UnixListener::bind(path)
        .with_context(|| format!("can't bind '{path}'"))?;
    // Commands can be sensitive; keep the socket owner-only.
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("can't restrict permissions on '{path}'"))?;
    listener
        .set_nonblocking(true)
        .context("can't set socket nonblocking")?;
    UnixListener::from_std(listener).context("can't register socket with the runtime")
}

fn bind_abstract(name: &str) -> Result<UnixListener> {
    let fd = socket::socket(
        AddressFamily::Unix,
        SockType::Stream,
        SockFlag::SOCK_CLOEXEC,
        None,
    )
    .context("can't create socket")?;
    let addr = UnixAddr::new_abstract(name.as_bytes())
        .with_context(|| format!("bad abstract socket name '@{name}'"))?;
    socket::bind(fd.as_raw_fd(), &addr).with_context(|| format!("can't bind '@{name}'"))?;
    socket::listen(&fd, Backlog::MAXCONN).context("can't listen")?;
    let listener = std::os::unix::net::UnixListener::from(fd);
    listener
        .set_nonblocking(true)
        .context("can't set socket nonblocking")?;
    UnixListener::from_std(listener).context("can't register socket with the runtime")
}

async fn accept_loop(
    listener: UnixListener,
    backend: Arc<dyn ClientBackend>,
    log: LogHandle,
    token: CancellationToken,
) {
    let mut next_id = 1u64;
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let name = format!("ipc-{next_id}");
                        next_id += 1;
                        let (client, events) = backend.attach(&name);
                        let params = SessionParams {
                            client,
                            events,
                            log: log.new_child(None),
                            writable: true,
                        };
                        let session_token = token.clone();
                        tokio::spawn(async move {
                            tokio::select! {
                                _ = session_token.cancelled() => {}
                                _ = session::run(stream, params) => {}
                            }
                        });
                    }
                    Err(e) => {
                        crate::log_error!(log, "accept failed: {e}\n");
                        // Transient failures (fd exhaustion) should not spin.
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }
}

/// Attach a single fixed client over `spec`: `fd://N` for an inherited
/// descriptor (read-write), or a path to a FIFO (opened read-write) or a
/// plain file (receive-only, e.g. a command script). Returns the session
/// task.
pub async fn serve_file(
    spec: &str,
    backend: Arc<dyn ClientBackend>,
    log: LogHandle,
) -> Result<JoinHandle<()>> {
    let (file, writable, name) = if let Some(fd) = spec.strip_prefix("fd://") {
        let fd: i32 = fd.parse().with_context(|| format!("bad fd in '{spec}'"))?;
        // SAFETY: the descriptor number comes from the user, who hands us
        // ownership of it by naming it here. Nothing else in this process
        // uses it.
        let owned = unsafe { OwnedFd::from_raw_fd(fd) };
        (std::fs::File::from(owned), true, format!("fd{fd}"))
    } else {
        let is_fifo = std::fs::metadata(spec)
            .with_context(|| format!("can't stat '{spec}'"))?
            .file_type()
            .is_fifo();
        // A FIFO is opened read-write so it stays open across writer
        // turnover and replies can be sent; a plain file is a one-way
        // command script.
        let file = std::fs::File::options()
            .read(true)
            .write(is_fifo)
            .open(spec)
            .with_context(|| format!("can't open '{spec}'"))?;
        (file, is_fifo, "ipc-file".to_string())
    };

    let (client, events) = backend.attach(&name);
    let params = SessionParams {
        client,
        events,
        log,
        writable,
    };
    let stream = tokio::fs::File::from_std(file);
    Ok(tokio::spawn(session::run(stream, params)))
}
