use std::path::Path;
use std::sync::Arc;

use rustls::RootCertStore;
use rustls::server::WebPkiClientVerifier;

use crate::error::TlsSetupError;
use crate::pem::{load_certs, load_private_key};

/// Builds a `rustls::ServerConfig` requiring and verifying a client certificate against
/// the broker's CA, per §6 ("peer certificates are required and verified against the
/// CA"). Loaded once at startup from the three configured TLS material paths.
pub fn build_vault_server_config(
    cert_path: &Path,
    key_path: &Path,
    ca_path: &Path,
) -> Result<Arc<rustls::ServerConfig>, TlsSetupError> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let mut roots = RootCertStore::empty();
    for ca_cert in load_certs(ca_path)? {
        roots
            .add(ca_cert)
            .map_err(|err| TlsSetupError::Verifier(err.to_string()))?;
    }

    let client_verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|err| TlsSetupError::Verifier(err.to_string()))?;

    let config = rustls::ServerConfig::builder()
        .with_client_cert_verifier(client_verifier)
        .with_single_cert(certs, key)?;

    Ok(Arc::new(config))
}
