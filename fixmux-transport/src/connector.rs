/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Outbound connection establishment.
//!
//! The session layer never opens sockets itself; it asks a [`Connector`] for a
//! byte stream. [`TcpConnector`] is the production implementation.

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// A bidirectional byte stream carrying FIX traffic.
pub trait FixStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> FixStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Boxed stream returned by connectors.
pub type BoxedStream = Box<dyn FixStream>;

/// Opens connections to counterparty endpoints.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connects to `host:port`, giving up after `timeout`.
    ///
    /// # Errors
    /// Returns `io::ErrorKind::TimedOut` when the deadline passes, or the
    /// underlying connect error.
    async fn connect(&self, host: &str, port: u16, timeout: Duration) -> io::Result<BoxedStream>;
}

/// Plain TCP connector.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    nodelay: bool,
}

impl TcpConnector {
    /// Creates a connector with `TCP_NODELAY` enabled.
    #[must_use]
    pub const fn new() -> Self {
        Self { nodelay: true }
    }

    /// Sets whether `TCP_NODELAY` is applied to new sockets.
    #[must_use]
    pub const fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16, timeout: Duration) -> io::Result<BoxedStream> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {} ms", timeout.as_millis()),
                )
            })??;

        if self.nodelay
            && let Err(e) = stream.set_nodelay(true)
        {
            warn!(host, port, error = %e, "failed to set TCP_NODELAY");
        }
        debug!(host, port, "tcp connection established");
        Ok(Box::new(stream))
    }
}
