//! Peer certificate helpers for the verification hook.
//!
//! Verification callbacks receive the peer's end-entity certificate as PEM,
//! so the DER bytes rustls hands the verifier are re-armoured here. Parsed
//! summaries are only used for log output.
//!
//! Reference: `x509-parser` crate (rusticata, MIT/Apache-2.0)

use data_encoding::BASE64;
use x509_parser::prelude::*;

use crate::error::{BuildError, Result};

/// Base64 characters per PEM body line (RFC 7468).
const PEM_LINE_WIDTH: usize = 64;

/// Encode a DER certificate as a PEM `CERTIFICATE` block.
pub fn encode_certificate_pem(der: &[u8]) -> String {
    let body = BASE64.encode(der);
    let mut pem = String::with_capacity(body.len() + body.len() / PEM_LINE_WIDTH + 64);
    pem.push_str("-----BEGIN CERTIFICATE-----\n");
    for line in body.as_bytes().chunks(PEM_LINE_WIDTH) {
        // Base64 output is ASCII.
        pem.push_str(std::str::from_utf8(line).unwrap_or_default());
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}

/// Subject, issuer, and serial of a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    pub subject: String,
    pub issuer: String,
    pub serial: String,
}

/// Parse a DER certificate far enough to describe it.
pub fn summarize_certificate(der: &[u8]) -> Result<CertificateSummary> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| BuildError::CertificateParse(format!("X.509 parse error: {e}")))?;

    Ok(CertificateSummary {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        serial: cert.raw_serial_as_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DnType, KeyPair};

    fn self_signed(common_name: &str) -> Vec<u8> {
        let key = KeyPair::generate().expect("key generation");
        let mut params = CertificateParams::new(vec!["localhost".to_string()]).expect("params");
        params
            .distinguished_name
            .push(DnType::CommonName, common_name);
        params.self_signed(&key).expect("self-signed").der().to_vec()
    }

    #[test]
    fn pem_round_trips_through_rustls_pemfile() {
        let der = self_signed("round trip");
        let pem = encode_certificate_pem(&der);
        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----\n"));
        assert!(pem.ends_with("-----END CERTIFICATE-----\n"));

        let parsed: Vec<_> = rustls_pemfile::certs(&mut pem.as_bytes())
            .collect::<std::result::Result<_, _>>()
            .expect("valid PEM");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].as_ref(), der.as_slice());
    }

    #[test]
    fn pem_lines_are_wrapped() {
        let pem = encode_certificate_pem(&[0u8; 200]);
        for line in pem.lines() {
            assert!(line.len() <= PEM_LINE_WIDTH || line.starts_with("-----"));
        }
    }

    #[test]
    fn summary_reports_subject() {
        let der = self_signed("summary test");
        let summary = summarize_certificate(&der).expect("parses");
        assert!(summary.subject.contains("summary test"));
        // Self-signed: issuer equals subject.
        assert_eq!(summary.subject, summary.issuer);
        assert!(!summary.serial.is_empty());
    }

    #[test]
    fn summary_rejects_garbage() {
        assert!(summarize_certificate(b"not a certificate").is_err());
        assert!(summarize_certificate(b"").is_err());
    }
}
