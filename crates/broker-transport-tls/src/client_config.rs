use std::path::Path;
use std::sync::Arc;

use rustls::RootCertStore;

use crate::error::TlsSetupError;
use crate::pem::{load_certs, load_private_key};

/// Builds the agent side's `rustls::ClientConfig`: presents its own client certificate
/// (the mutual half of mTLS) and verifies the broker's server certificate against the
/// same CA, per §6's TLS requirements applied symmetrically to the agent.
pub fn build_agent_client_config(
    cert_path: &Path,
    key_path: &Path,
    ca_path: &Path,
) -> Result<Arc<rustls::ClientConfig>, TlsSetupError> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let mut roots = RootCertStore::empty();
    for ca_cert in load_certs(ca_path)? {
        roots
            .add(ca_cert)
            .map_err(|err| TlsSetupError::Verifier(err.to_string()))?;
    }

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)
        .map_err(|err| TlsSetupError::Verifier(err.to_string()))?;

    Ok(Arc::new(config))
}
