//! Shared vocabulary for the agent broker workspace.
//!
//! # Why
//! Every other crate in this workspace — transports, registry, router, daemon, agent —
//! needs the same small set of types to talk about a connection without depending on
//! each other's internals: an opaque [`ConnectionHandle`], the tunnel/lifecycle
//! enums from the connection state machine, the bounded [`InboundBuffer`] that turns
//! a byte stream into discrete command lines, and the [`BrokerError`] taxonomy that
//! every downstream crate's own error type eventually maps into.
//!
//! # What
//! This crate has no I/O and no async runtime dependency. It is pure data plus the
//! line-framing algorithm, so it can be unit tested without sockets or TLS.

pub mod buffer;
pub mod error;
pub mod handle;
pub mod limits;

pub use buffer::InboundBuffer;
pub use error::BrokerError;
pub use handle::{ConnectionHandle, HandleAllocator};

/// Which listening port accepted this connection, and therefore which protocol it speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TunnelMode {
    /// The plaintext lobby port: a single ENROLL/CSR request-response, then close.
    Enrollment,
    /// The mTLS vault port: long-lived, authenticated, command-dispatching.
    Secure,
}

/// Lifecycle state of a registered connection, per §3 of the connection data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnState {
    /// Accepted, TLS handshake (or enrollment read) not yet complete.
    AwaitingHandshake,
    /// Handshake complete and identity verified; commands are being dispatched.
    Authenticated,
    /// Teardown has started; no further commands should be dispatched.
    Closing,
}
