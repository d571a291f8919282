//! Building channel credentials from PEM material.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::bridge::VerifyUserdata;
use crate::config::CredentialsConfig;
use crate::dispatch::Dispatcher;
use crate::error::{CredentialsError, Result};
use crate::pem::PemBuffer;
use crate::primitive::{KeyCertPair, SslCredentialsRequest, TlsPrimitive};
use crate::roots::get_ssl_roots_override;
use crate::store::{ChannelCredentials, Retained};
use crate::verify::VerifyOptions;

/// Creates channel credentials on one TLS primitive.
///
/// Verification callbacks attached to credentials from this context run on
/// its [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct CredentialsContext {
    primitive: Arc<dyn TlsPrimitive>,
    dispatcher: Dispatcher,
}

impl CredentialsContext {
    /// Bind a primitive to a dispatcher and register the process-wide
    /// default roots as the primitive's roots override hook.
    pub fn new(primitive: Arc<dyn TlsPrimitive>, dispatcher: Dispatcher) -> Self {
        primitive.set_ssl_roots_override_callback(get_ssl_roots_override);
        Self {
            primitive,
            dispatcher,
        }
    }

    pub fn primitive(&self) -> &Arc<dyn TlsPrimitive> {
        &self.primitive
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Create SSL channel credentials.
    ///
    /// - No key and no chain: anonymous client credentials. Missing
    ///   `root_certs` fall back to the default roots.
    /// - Key and chain: client credentials presenting that certificate.
    /// - Only one of them: [`CredentialsError::InvalidArgument`].
    ///
    /// The returned store keeps every supplied buffer and the verification
    /// callback alive for as long as it exists.
    pub fn channel_credentials(
        &self,
        root_certs: Option<PemBuffer>,
        private_key: Option<PemBuffer>,
        cert_chain: Option<PemBuffer>,
        options: Option<VerifyOptions>,
    ) -> Result<ChannelCredentials> {
        let pem_key_cert_pair = match (&private_key, &cert_chain) {
            (None, None) => None,
            (Some(private_key), Some(cert_chain)) => Some(KeyCertPair {
                private_key: private_key.clone(),
                cert_chain: cert_chain.clone(),
            }),
            (Some(_), None) => {
                return Err(CredentialsError::InvalidArgument(
                    "private key supplied without a certificate chain".into(),
                ))
            }
            (None, Some(_)) => {
                return Err(CredentialsError::InvalidArgument(
                    "certificate chain supplied without a private key".into(),
                ))
            }
        };

        let callback = options.and_then(|o| o.check_server_identity().cloned());
        let verify_options = callback
            .clone()
            .map(|cb| VerifyUserdata::new(cb, self.dispatcher.clone()).into_peer_options());

        let request = SslCredentialsRequest {
            pem_root_certs: root_certs.clone(),
            pem_key_cert_pair,
            verify_options,
        };
        let anonymous = request.pem_key_cert_pair.is_none();

        let mut retained = Vec::with_capacity(4);
        retained.extend(root_certs.map(Retained::RootCerts));
        retained.extend(private_key.map(Retained::PrivateKey));
        retained.extend(cert_chain.map(Retained::CertChain));
        retained.extend(callback.map(Retained::VerifyCallback));

        let raw = self.primitive.ssl_credentials_create(request);
        let creds = ChannelCredentials::wrap(self.primitive.clone(), raw, retained)
            .ok_or_else(|| {
                warn!(anonymous, "TLS primitive could not create channel credentials");
                CredentialsError::Construction
            })?;

        debug!(
            raw = creds.raw().id(),
            anonymous,
            verify_callback = creds.verify_callback().is_some(),
            "created channel credentials"
        );
        Ok(creds)
    }

    /// Create channel credentials described by configuration.
    pub fn channel_credentials_from_config(
        &self,
        config: &CredentialsConfig,
    ) -> Result<ChannelCredentials> {
        let material = config.load_material()?;
        self.channel_credentials(
            material.root_certs,
            material.private_key,
            material.cert_chain,
            material.verify_options,
        )
    }
}
