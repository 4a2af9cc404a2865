use std::fs;
use std::path::Path;

use broker_core::limits::CERTIFICATE_VALIDITY_DAYS;
use rcgen::{CertificateSigningRequestParams, Issuer, KeyPair};
use thiserror::Error;
use time::Duration;

type CaIssuer = Issuer<'static, KeyPair>;

#[derive(Debug, Error)]
pub enum CaError {
    #[error("failed to read CA material '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse CA certificate or key: {0}")]
    Parse(String),
    #[error("no valid CSR block found in request")]
    MissingCsrBlock,
    #[error("failed to parse certificate signing request: {0}")]
    InvalidCsr(String),
    #[error("certificate signing failed: {0}")]
    Signing(String),
}

/// Signs client CSRs against the broker's own CA, per the enrollment flow in
/// `original_source/src/enroll.c`: the original shells out to `openssl x509 -req ...
/// -CA ca.crt -CAkey ca.key -CAcreateserial -days 365`. This replaces the `system()`
/// call with an in-process `rcgen` signing operation — no temp files, no shelling out,
/// same 365-day default validity (§6).
pub struct CaSigner {
    issuer: CaIssuer,
    validity: Duration,
}

impl CaSigner {
    pub fn load(ca_cert_path: &Path, ca_key_path: &Path) -> Result<Self, CaError> {
        let cert_pem = fs::read_to_string(ca_cert_path).map_err(|source| CaError::Read {
            path: ca_cert_path.display().to_string(),
            source,
        })?;
        let key_pem = fs::read_to_string(ca_key_path).map_err(|source| CaError::Read {
            path: ca_key_path.display().to_string(),
            source,
        })?;

        let issuer_key = KeyPair::from_pem(&key_pem).map_err(|e| CaError::Parse(e.to_string()))?;
        let issuer = Issuer::from_ca_cert_pem(&cert_pem, issuer_key)
            .map_err(|e| CaError::Parse(e.to_string()))?;

        Ok(Self {
            issuer,
            validity: Duration::days(CERTIFICATE_VALIDITY_DAYS as i64),
        })
    }

    /// Extracts the `-----BEGIN CERTIFICATE REQUEST-----` PEM block from the raw
    /// enrollment request buffer, mirroring `strstr(request_buffer, "-----BEGIN
    /// CERTIFICATE REQUEST-----")` in `enroll.c`.
    pub fn extract_csr_block(request: &str) -> Result<&str, CaError> {
        let start = request
            .find("-----BEGIN CERTIFICATE REQUEST-----")
            .ok_or(CaError::MissingCsrBlock)?;
        Ok(&request[start..])
    }

    /// Signs a PEM-encoded CSR, returning the signed leaf certificate as PEM. The leaf's
    /// validity window is `[now, now + 365d]`, matching `enroll.c`'s `-days 365`.
    pub fn sign_csr(&self, csr_pem: &str) -> Result<String, CaError> {
        let mut csr = CertificateSigningRequestParams::from_pem(csr_pem)
            .map_err(|e| CaError::InvalidCsr(e.to_string()))?;

        csr.params.not_before = time::OffsetDateTime::now_utc();
        csr.params.not_after = csr.params.not_before + self.validity;

        let signed = csr
            .signed_by(&self.issuer)
            .map_err(|e| CaError::Signing(e.to_string()))?;
        Ok(signed.pem())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_csr_block_finds_embedded_pem() {
        let request = "ENROLL new-agent.example\n-----BEGIN CERTIFICATE REQUEST-----\nMIIB...\n-----END CERTIFICATE REQUEST-----\n";
        let block = CaSigner::extract_csr_block(request).unwrap();
        assert!(block.starts_with("-----BEGIN CERTIFICATE REQUEST-----"));
    }

    #[test]
    fn extract_csr_block_rejects_missing_pem() {
        let request = "ENROLL new-agent.example\nnot a csr\n";
        assert!(CaSigner::extract_csr_block(request).is_err());
    }
}
