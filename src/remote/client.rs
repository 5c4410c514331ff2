//! Remote client for contacting a running primary instance
//!
//! Every call opens one loopback connection, sends one request, awaits one
//! response, and closes. No connection reuse and no pipelining; the wire
//! stays stateless and all policy lives in the coordinator.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::protocol::{read_message, Envelope, ProtocolError};

/// Default per-call timeout covering connect, send, and response
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(1);

/// No primary instance could be reached on the configured port.
///
/// This is the expected signal during startup when this process is the first
/// instance. It drives role selection and is never an application error; the
/// variants exist for debug logging only.
#[derive(Debug, Error)]
pub enum Unreachable {
    /// Connection could not be established (typically refused)
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// The exchange did not complete within the configured timeout
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The connection dropped mid-exchange
    #[error("connection failed: {0}")]
    Io(#[source] std::io::Error),

    /// The peer answered with bytes that do not decode
    #[error("malformed response: {0}")]
    Malformed(#[source] ProtocolError),

    /// The peer answered with a well-formed but wrong message
    #[error("unexpected reply: {0}")]
    UnexpectedReply(&'static str),

    /// The request violates protocol bounds and was never sent
    #[error("request not sent: {0}")]
    InvalidRequest(#[source] ProtocolError),
}

/// Short-lived client for the remote listener port
#[derive(Debug, Clone)]
pub struct RemoteClient {
    port: u16,
    timeout: Duration,
}

impl RemoteClient {
    /// Create a client for the given loopback port with the default timeout
    pub fn new(port: u16) -> Self {
        Self {
            port,
            timeout: DEFAULT_CLIENT_TIMEOUT,
        }
    }

    /// Set the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Target port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Liveness probe: PING the port and return the primary instance's
    /// identifier from its PONG.
    pub async fn probe(&self) -> Result<String, Unreachable> {
        match self.exchange(Envelope::Ping).await? {
            Envelope::Pong(id) => Ok(id),
            other => Err(Unreachable::UnexpectedReply(other.tag())),
        }
    }

    /// Forward command-line arguments to the primary instance
    pub async fn send_arguments(&self, args: &[String]) -> Result<(), Unreachable> {
        self.expect_ok(Envelope::SendCommandLineArguments(args.to_vec()))
            .await
    }

    /// Ask the primary instance to raise its main window
    pub async fn request_focus(&self) -> Result<(), Unreachable> {
        self.expect_ok(Envelope::Focus).await
    }

    async fn expect_ok(&self, request: Envelope) -> Result<(), Unreachable> {
        match self.exchange(request).await? {
            Envelope::Ok => Ok(()),
            other => Err(Unreachable::UnexpectedReply(other.tag())),
        }
    }

    /// One connection, one request, one response. The whole exchange runs
    /// under a single deadline so a stalled peer cannot hold the caller past
    /// the configured timeout.
    async fn exchange(&self, request: Envelope) -> Result<Envelope, Unreachable> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, self.port));
        let tag = request.tag();
        // Reject out-of-bounds payloads here rather than sending bytes the
        // listener will silently drop
        let payload = request.encode().map_err(Unreachable::InvalidRequest)?;

        let exchange = async {
            let mut stream = TcpStream::connect(addr).await.map_err(Unreachable::Connect)?;
            stream
                .write_all(&payload)
                .await
                .map_err(Unreachable::Io)?;
            // Half-close the write side so the listener sees end-of-message
            stream.shutdown().await.map_err(Unreachable::Io)?;

            let bytes = read_message(&mut stream).await.map_err(Unreachable::Io)?;
            Envelope::decode(&bytes).map_err(Unreachable::Malformed)
        };

        let result = timeout(self.timeout, exchange)
            .await
            .map_err(|_| Unreachable::Timeout(self.timeout))?;

        if let Err(e) = &result {
            debug!(port = self.port, request = tag, error = %e, "remote exchange failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_defaults() {
        let client = RemoteClient::new(8786);
        assert_eq!(client.port(), 8786);
        assert_eq!(client.timeout, DEFAULT_CLIENT_TIMEOUT);
    }

    #[test]
    fn test_client_with_timeout() {
        let client = RemoteClient::new(8786).with_timeout(Duration::from_millis(250));
        assert_eq!(client.timeout, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_oversized_argument_is_rejected_before_sending() {
        use crate::remote::protocol::MAX_STRING_BYTES;

        // Encoding fails up front, so the port is never contacted
        let client = RemoteClient::new(1);
        let err = client
            .send_arguments(&["x".repeat(MAX_STRING_BYTES + 1)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Unreachable::InvalidRequest(ProtocolError::Oversized)
        ));
    }

    #[tokio::test]
    async fn test_probe_refused_port_is_unreachable() {
        // Bind and drop to get a port with nothing listening
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let client = RemoteClient::new(port).with_timeout(Duration::from_millis(500));
        let err = client.probe().await.unwrap_err();
        assert!(matches!(
            err,
            Unreachable::Connect(_) | Unreachable::Timeout(_)
        ));
    }
}
