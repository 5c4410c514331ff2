//! Remote listener owned by the primary instance
//!
//! Binds the configured port on the loopback interface only and serves one
//! request/response exchange per accepted connection. Decoded commands are
//! handed to a [`RemoteCommandHandler`] (the GUI seam) and acknowledged once
//! accepted for processing; malformed or unexpected traffic is dropped
//! without a reply.
//!
//! A failure on one connection never reaches the accept loop or any other
//! connection.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::protocol::{read_message, Envelope};

/// Default read deadline for an accepted connection
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound on concurrently handled connections. The port is
/// loopback-only, so this is a stall guard, not flood protection.
const MAX_CONCURRENT_CONNECTIONS: usize = 32;

/// Commands the listener hands to the GUI layer.
///
/// Both calls must return quickly relative to the read deadline; the
/// listener acknowledges once the command is accepted for processing, not
/// once the GUI has acted on it.
pub trait RemoteCommandHandler: Send + Sync + 'static {
    /// Open the forwarded library files in the running instance
    fn open_files(&self, paths: Vec<String>);

    /// Raise the main window
    fn focus_main_window(&self);
}

/// Command forwarded from a secondary launch, for channel-based handlers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    /// Open these library files
    OpenFiles(Vec<String>),
    /// Raise the main window
    FocusMainWindow,
}

/// A GUI event loop can consume remote commands straight from a channel.
/// Send failures mean the receiver is gone (application shutting down) and
/// are ignored.
impl RemoteCommandHandler for mpsc::UnboundedSender<RemoteEvent> {
    fn open_files(&self, paths: Vec<String>) {
        let _ = self.send(RemoteEvent::OpenFiles(paths));
    }

    fn focus_main_window(&self) {
        let _ = self.send(RemoteEvent::FocusMainWindow);
    }
}

/// Listener startup failures
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The port is already bound by another process
    #[error("failed to bind 127.0.0.1:{port}: {source}")]
    BindFailure {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// Factory for the accept loop
pub struct RemoteListener {
    instance_id: String,
    read_timeout: Duration,
    handler: Arc<dyn RemoteCommandHandler>,
}

impl RemoteListener {
    /// Create a listener that answers PING with `instance_id` and forwards
    /// commands to `handler`
    pub fn new(instance_id: impl Into<String>, handler: Arc<dyn RemoteCommandHandler>) -> Self {
        Self {
            instance_id: instance_id.into(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            handler,
        }
    }

    /// Set the per-connection read deadline
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Bind `127.0.0.1:port` and start accepting connections.
    ///
    /// Port 0 asks the OS for a free port; the bound port is available from
    /// [`ListenerHandle::port`].
    pub async fn start(self, port: u16) -> Result<ListenerHandle, ListenerError> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::BindFailure { port, source })?;
        let local_port = listener
            .local_addr()
            .map_err(|source| ListenerError::BindFailure { port, source })?
            .port();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(
            listener,
            self.instance_id,
            self.handler,
            self.read_timeout,
            shutdown_rx,
        ));

        info!(port = local_port, "remote listener started");
        Ok(ListenerHandle {
            port: local_port,
            shutdown: shutdown_tx,
            task,
        })
    }
}

/// Owner of the bound port for the lifetime of the primary instance.
///
/// Dropping the handle also stops the accept loop, but [`stop`] should be
/// preferred on shutdown so the port is known to be released before the
/// process reports it has exited.
///
/// [`stop`]: ListenerHandle::stop
#[derive(Debug)]
pub struct ListenerHandle {
    port: u16,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// The actually bound port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop accepting connections and release the port.
    ///
    /// In-flight exchanges are allowed to finish; no new connections are
    /// accepted once this begins.
    pub async fn stop(self) {
        let port = self.port;
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "accept loop task failed");
        }
        info!(port, "remote listener stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    instance_id: String,
    handler: Arc<dyn RemoteCommandHandler>,
    read_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let permits = Arc::new(Semaphore::new(MAX_CONCURRENT_CONNECTIONS));

    loop {
        let accepted = tokio::select! {
            // Fires on stop() and when the handle is dropped
            _ = shutdown.changed() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                // Shutdown stays observable even while every permit is held
                // by a stalled connection
                let permit = tokio::select! {
                    _ = shutdown.changed() => break,
                    permit = Arc::clone(&permits).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break, // semaphore closed, unreachable in practice
                    },
                };
                let instance_id = instance_id.clone();
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let _permit = permit;
                    handle_connection(stream, peer, instance_id, handler, read_timeout).await;
                });
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
            }
        }
    }

    debug!("accept loop exited");
}

/// Serve exactly one request/response exchange, then close.
///
/// Malformed traffic, unexpected tags, and expired read deadlines all end
/// the same way: the connection is dropped without a reply.
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    instance_id: String,
    handler: Arc<dyn RemoteCommandHandler>,
    read_timeout: Duration,
) {
    let request = match timeout(read_timeout, read_message(&mut stream)).await {
        Ok(Ok(bytes)) => match Envelope::decode(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(%peer, error = %e, "dropping malformed request");
                return;
            }
        },
        Ok(Err(e)) => {
            debug!(%peer, error = %e, "read failed");
            return;
        }
        Err(_) => {
            debug!(%peer, "read deadline exceeded");
            return;
        }
    };

    let reply = match request {
        Envelope::Ping => Envelope::Pong(instance_id),
        Envelope::SendCommandLineArguments(args) => {
            debug!(%peer, count = args.len(), "received forwarded arguments");
            handler.open_files(args);
            Envelope::Ok
        }
        Envelope::Focus => {
            handler.focus_main_window();
            Envelope::Ok
        }
        other => {
            // A request-side peer has no business sending response tags
            debug!(%peer, tag = other.tag(), "dropping unexpected request");
            return;
        }
    };

    if let Err(e) = write_reply(&mut stream, &reply).await {
        debug!(%peer, error = %e, "failed to write reply");
    }
}

async fn write_reply(stream: &mut TcpStream, reply: &Envelope) -> std::io::Result<()> {
    let payload = reply
        .encode()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    stream.write_all(&payload).await?;
    stream.shutdown().await
}
