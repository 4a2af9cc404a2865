use thiserror::Error;

#[derive(Debug, Error)]
pub enum TlsSetupError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{path}' contains no PEM-encoded certificates")]
    NoCertificates { path: String },
    #[error("'{path}' contains no PEM-encoded private key")]
    NoPrivateKey { path: String },
    #[error("failed to build client certificate verifier: {0}")]
    Verifier(String),
    #[error("invalid TLS server configuration: {0}")]
    Config(#[from] rustls::Error),
}

#[derive(Debug, Error)]
pub enum TlsHandshakeError {
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] std::io::Error),
    #[error("peer presented no client certificate")]
    NoPeerCertificate,
    #[error("peer certificate has no parseable subject common name")]
    NoCommonName,
}
