//! A minimal wrapper around [`tokio::net::TcpListener`].
//!
//! # Why
//! The event engine's acceptor task (§4.5) only ever does two things to a listening
//! socket: bind it once, and accept connections from it in a loop "until the kernel
//! reports no more". On tokio that loop is just a `while let Ok(...) = listener.accept()`
//! — tokio's own internal readiness-driven scheduling already gives the cooperative,
//! non-blocking behavior the spec describes for the acceptor, so this wrapper only
//! exists to give the acceptor a named, testable seam instead of reaching for
//! `tokio::net::TcpListener` directly everywhere, mirroring how the teacher workspace
//! wraps the same type in its own `broker-transport-tcp` analogue.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};

#[derive(Debug, Error)]
pub enum ListenError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),
}

/// A bound TCP listener plus the address it resolved to.
#[derive(Debug)]
pub struct TcpListener {
    inner: TokioTcpListener,
    local_addr: SocketAddr,
}

impl TcpListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self, ListenError> {
        let inner = TokioTcpListener::bind(addr)
            .await
            .map_err(|source| ListenError::Bind { addr, source })?;
        let local_addr = inner
            .local_addr()
            .map_err(|source| ListenError::Bind { addr, source })?;
        tracing::info!(%local_addr, "listening");
        Ok(Self { inner, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts the next inbound connection. The acceptor task loops calling this; tokio
    /// suspends the task (not an OS thread) between readiness events, which is the
    /// async-runtime equivalent of the spec's "accept all pending connections, then
    /// arm and return to the event loop" acceptor discipline.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ListenError> {
        self.inner.accept().await.map_err(ListenError::Accept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_to_ephemeral_port_reports_real_addr() {
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .expect("bind should succeed");
        assert_ne!(listener.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn accept_returns_connected_peer() {
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = listener.local_addr();

        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });

        let (_, peer_addr) = listener.accept().await.expect("accept should succeed");
        let _client = client.await.unwrap();
        assert_eq!(peer_addr.ip(), addr.ip());
    }
}
