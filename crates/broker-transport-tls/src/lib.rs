//! The vault port's TLS layer: server and client configuration loading, the handshake
//! itself, and peer common-name extraction.
//!
//! # Why
//! Grounded in the teacher's `spark-transport-tls` crate (`tokio-rustls` + `rustls` for
//! the handshake, a dedicated `thiserror` enum per failure domain), reduced to what the
//! spec actually needs: mandatory client-certificate verification and CN extraction.
//! The teacher's `ArcSwap`-backed hot-reload wrapper (`HotReloadingServerConfig`) is not
//! carried over — the spec never asks for certificate rotation without a restart, so
//! the server config here is loaded once at startup and handed to one
//! [`tokio_rustls::TlsAcceptor`] for the process lifetime (see `DESIGN.md`).
//!
//! # How
//! [`accept`] drives the handshake exactly the way §10.6 of the design documents:
//! `TlsAcceptor::accept` internally loops over partial reads/writes, suspending the
//! task at each one, which is tokio's cooperative-scheduling substitute for the spec's
//! hand-rolled WANT_READ/WANT_WRITE re-arm loop.

mod client_config;
mod error;
mod identity;
mod pem;
mod server_config;

pub use client_config::build_agent_client_config;
pub use error::{TlsHandshakeError, TlsSetupError};
pub use identity::peer_common_name;
pub use server_config::build_vault_server_config;

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;

/// Drives one TLS handshake to completion over an accepted TCP stream.
pub async fn accept(
    server_config: Arc<rustls::ServerConfig>,
    stream: TcpStream,
) -> Result<TlsStream<TcpStream>, TlsHandshakeError> {
    let acceptor = TlsAcceptor::from(server_config);
    acceptor
        .accept(stream)
        .await
        .map_err(TlsHandshakeError::Handshake)
}
