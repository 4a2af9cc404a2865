use thiserror::Error;

/// The broker's internal error taxonomy (§7 of the design).
///
/// Every lower crate defines its own narrower `thiserror` enum for its own failure
/// domain (TLS handshake errors, sqlite errors, DNS resolution errors) and converts
/// into one of these variants at the boundary. This is the type the event engine
/// switches on to decide the observable behavior: tear down the connection, reply
/// with a wire-level `ERROR:` line, or just log and continue.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Socket read/write failure, or the peer closed the connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// TLS handshake failure, missing client certificate, or CA verification failure.
    #[error("tls error: {0}")]
    Tls(String),

    /// The verified certificate common name's DNS A-records do not include the peer's
    /// socket IP (or the identity resolver failed outright).
    #[error("identity error: socket IP does not match DNS records for '{hostname}'")]
    Identity { hostname: String },

    /// Malformed command frame or inbound-buffer overflow.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The connection's verified identity is not permitted to perform this operation.
    #[error("access denied")]
    AccessDenied,

    /// `GET` referenced a key with no stored value.
    #[error("key '{0}' not found")]
    NotFound(String),

    /// A bounded resource (topic count, subscribers-per-topic) is exhausted.
    #[error("capacity exceeded: {0}")]
    Capacity(String),
}

impl BrokerError {
    /// Whether this error, once surfaced during an authenticated read-dispatch cycle,
    /// should tear the connection down rather than just produce a wire-level reply.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(self, BrokerError::Transport(_) | BrokerError::Tls(_) | BrokerError::Identity { .. })
    }

    /// The wire-level reply line for errors that do *not* tear the connection down.
    /// Fatal errors (see [`Self::is_fatal_to_connection`]) have no reply: the connection
    /// is simply removed.
    pub fn wire_reply(&self) -> Option<String> {
        match self {
            BrokerError::Protocol(_) => Some("ERROR: Invalid command.\n".to_owned()),
            BrokerError::AccessDenied => Some("ERROR: Access denied.\n".to_owned()),
            BrokerError::NotFound(key) => Some(format!("ERROR: Key '{key}' not found.\n")),
            BrokerError::Capacity(_) => None, // silently dropped per §7
            BrokerError::Transport(_) | BrokerError::Tls(_) | BrokerError::Identity { .. } => None,
        }
    }
}
