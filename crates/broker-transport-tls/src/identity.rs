use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use x509_parser::prelude::*;

use crate::error::TlsHandshakeError;

/// Extracts the subject common name from the peer certificate rustls captured during
/// the handshake, mirroring `auth_verify_mtls`'s `X509_NAME_get_text_by_NID(..., NID_commonName, ...)`
/// call in `original_source/src/auth.c`, minus the OpenSSL dependency.
pub fn peer_common_name(stream: &TlsStream<TcpStream>) -> Result<String, TlsHandshakeError> {
    let (_, connection) = stream.get_ref();
    let peer_certs = connection
        .peer_certificates()
        .ok_or(TlsHandshakeError::NoPeerCertificate)?;
    let leaf = peer_certs
        .first()
        .ok_or(TlsHandshakeError::NoPeerCertificate)?;

    let (_, cert) =
        X509Certificate::from_der(leaf.as_ref()).map_err(|_| TlsHandshakeError::NoCommonName)?;

    cert.subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_owned)
        .ok_or(TlsHandshakeError::NoCommonName)
}
