//! Server certificate verifier that adds the peer verification hook.
//!
//! `CallbackServerCertVerifier` runs the regular WebPKI chain and hostname
//! checks first. Only a server that passes them is shown to the hook, with
//! its name and PEM-encoded end-entity certificate. A non-zero hook result
//! fails the handshake.
//!
//! Signature verification is delegated to the wrapped WebPKI verifier.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::{DigitallySignedStruct, Error as TlsError, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tracing::debug;

use chancred_core::bridge::VERIFY_ACCEPT;
use chancred_core::primitive::VerifyPeerOptions;

use crate::cert_extract::{encode_certificate_pem, summarize_certificate};

#[derive(Debug)]
pub struct CallbackServerCertVerifier {
    inner: Arc<WebPkiServerVerifier>,
    options: VerifyPeerOptions,
}

impl CallbackServerCertVerifier {
    pub fn new(inner: Arc<WebPkiServerVerifier>, options: VerifyPeerOptions) -> Self {
        Self { inner, options }
    }
}

/// Textual form of the name the client connected to.
fn server_name_text(server_name: &ServerName<'_>) -> Option<String> {
    match server_name {
        ServerName::DnsName(name) => Some(name.as_ref().to_owned()),
        ServerName::IpAddress(ip) => Some(std::net::IpAddr::from(*ip).to_string()),
        _ => None,
    }
}

impl ServerCertVerifier for CallbackServerCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        let verified = self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        )?;

        let name = server_name_text(server_name);
        let cert_pem = encode_certificate_pem(end_entity.as_ref());
        let result = self.options.invoke(name.as_deref(), Some(&cert_pem));
        if result == VERIFY_ACCEPT {
            return Ok(verified);
        }

        let subject = summarize_certificate(end_entity.as_ref())
            .map(|summary| summary.subject)
            .unwrap_or_default();
        debug!(
            server_name = name.as_deref().unwrap_or(""),
            %subject,
            result,
            "peer rejected by verification hook"
        );
        Err(TlsError::General(format!(
            "peer rejected by verification hook (result {result})"
        )))
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}
