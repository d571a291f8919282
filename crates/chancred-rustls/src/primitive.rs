//! [`TlsPrimitive`] backed by `rustls`.
//!
//! Each channel credential is a ready `rustls::ClientConfig` plus the call
//! metadata layered onto it by composition. Call credentials are static
//! metadata lists. Raw ids index into a table guarded by one mutex.
//!
//! Roots come from the request, then from the registered override hook.
//! With neither, creation fails: rustls has no built-in root store here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tracing::{debug, warn};

use chancred_core::primitive::{
    KeyCertPair, RawCallCredentials, RawChannelCredentials, SslCredentialsRequest, TlsPrimitive,
};
use chancred_core::roots::{RootsOverrideCallback, RootsOverrideResult};
use chancred_core::{CallCredentials, PemBuffer};

use crate::error::{BuildError, Result};
use crate::verifier::CallbackServerCertVerifier;

/// Header name and value attached to each call.
pub type CallMetadata = Vec<(String, String)>;

pub struct RustlsPrimitive {
    provider: Arc<CryptoProvider>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    channels: HashMap<RawChannelCredentials, ChannelEntry>,
    calls: HashMap<RawCallCredentials, Arc<CallMetadata>>,
    roots_hook: Option<RootsOverrideCallback>,
}

#[derive(Clone)]
struct ChannelEntry {
    config: Arc<ClientConfig>,
    layers: Vec<Arc<CallMetadata>>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl Default for RustlsPrimitive {
    fn default() -> Self {
        Self::new()
    }
}

impl RustlsPrimitive {
    /// Primitive using the `ring` crypto provider.
    pub fn new() -> Self {
        Self::with_provider(Arc::new(rustls::crypto::ring::default_provider()))
    }

    pub fn with_provider(provider: Arc<CryptoProvider>) -> Self {
        Self {
            provider,
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create call credentials that attach fixed metadata to every call.
    pub fn call_credentials_from_metadata<K, V>(
        this: &Arc<Self>,
        metadata: impl IntoIterator<Item = (K, V)>,
    ) -> Option<CallCredentials>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let metadata: CallMetadata = metadata
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let raw = {
            let mut state = this.state();
            let raw = RawCallCredentials::from_raw(state.next_id());
            state.calls.insert(raw, Arc::new(metadata));
            raw
        };
        CallCredentials::wrap(this.clone(), Some(raw))
    }

    /// The client configuration for a live channel credential.
    pub fn client_config(&self, raw: RawChannelCredentials) -> Option<Arc<ClientConfig>> {
        Some(self.state().channels.get(&raw)?.config.clone())
    }

    /// All metadata a live channel credential attaches to calls, in
    /// composition order.
    pub fn call_metadata(&self, raw: RawChannelCredentials) -> CallMetadata {
        self.state()
            .channels
            .get(&raw)
            .map(|entry| {
                entry
                    .layers
                    .iter()
                    .flat_map(|layer| layer.iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn live_count(&self) -> usize {
        self.state().channels.len()
    }

    fn resolve_roots(&self, explicit: Option<PemBuffer>) -> Result<PemBuffer> {
        if let Some(roots) = explicit {
            return Ok(roots);
        }
        // Copy the hook out; it locks process state of its own.
        let hook = self.state().roots_hook;
        match hook.map(|hook| hook()) {
            Some((RootsOverrideResult::Ok, Some(pem))) => Ok(pem),
            _ => Err(BuildError::MissingRoots),
        }
    }

    fn build_client_config(&self, request: SslCredentialsRequest) -> Result<ClientConfig> {
        let roots = Arc::new(load_root_store(&self.resolve_roots(request.pem_root_certs)?)?);

        let builder = ClientConfig::builder_with_provider(self.provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| BuildError::TlsConfiguration(format!("TLS version config: {e}")))?;

        let builder = match request.verify_options {
            Some(options) => {
                let webpki =
                    WebPkiServerVerifier::builder_with_provider(roots, self.provider.clone())
                        .build()
                        .map_err(|e| {
                            BuildError::TlsConfiguration(format!("server verifier: {e}"))
                        })?;
                builder
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(CallbackServerCertVerifier::new(
                        webpki, options,
                    )))
            }
            None => builder.with_root_certificates(roots),
        };

        match request.pem_key_cert_pair {
            Some(KeyCertPair {
                private_key,
                cert_chain,
            }) => builder
                .with_client_auth_cert(load_certs(&cert_chain)?, load_private_key(&private_key)?)
                .map_err(|e| BuildError::TlsConfiguration(format!("client cert config: {e}"))),
            None => Ok(builder.with_no_client_auth()),
        }
    }
}

fn load_certs(pem: &PemBuffer) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = pem.as_bytes();
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| BuildError::Pem(format!("certificates: {e}")))?;
    if certs.is_empty() {
        return Err(BuildError::Pem("no certificates found".into()));
    }
    Ok(certs)
}

fn load_private_key(pem: &PemBuffer) -> Result<PrivateKeyDer<'static>> {
    let mut reader = pem.as_bytes();
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| BuildError::Pem(format!("private key: {e}")))?
        .ok_or_else(|| BuildError::Pem("no private key found".into()))
}

fn load_root_store(pem: &PemBuffer) -> Result<RootCertStore> {
    let mut store = RootCertStore::empty();
    for cert in load_certs(pem)? {
        store
            .add(cert)
            .map_err(|e| BuildError::CertificateParse(format!("root certificate: {e}")))?;
    }
    Ok(store)
}

impl TlsPrimitive for RustlsPrimitive {
    fn ssl_credentials_create(
        &self,
        request: SslCredentialsRequest,
    ) -> Option<RawChannelCredentials> {
        let config = match self.build_client_config(request) {
            Ok(config) => Arc::new(config),
            Err(e) => {
                warn!(error = %e, "failed to build TLS client config");
                return None;
            }
        };

        let mut state = self.state();
        let raw = RawChannelCredentials::from_raw(state.next_id());
        state.channels.insert(
            raw,
            ChannelEntry {
                config,
                layers: Vec::new(),
            },
        );
        debug!(raw = raw.id(), "created channel credentials");
        Some(raw)
    }

    fn composite_channel_credentials_create(
        &self,
        channel: RawChannelCredentials,
        call: RawCallCredentials,
    ) -> Option<RawChannelCredentials> {
        let mut state = self.state();
        let Some(layer) = state.calls.get(&call).cloned() else {
            warn!(raw = call.id(), "composite with unknown call credentials");
            return None;
        };
        let Some(mut entry) = state.channels.get(&channel).cloned() else {
            warn!(raw = channel.id(), "composite with unknown channel credentials");
            return None;
        };
        entry.layers.push(layer);

        let raw = RawChannelCredentials::from_raw(state.next_id());
        state.channels.insert(raw, entry);
        Some(raw)
    }

    fn channel_credentials_release(&self, creds: RawChannelCredentials) {
        let entry = self.state().channels.remove(&creds);
        if entry.is_none() {
            warn!(raw = creds.id(), "release of unknown channel credentials");
        }
        // The config may hold the last reference to a verification hook.
        drop(entry);
    }

    fn call_credentials_release(&self, creds: RawCallCredentials) {
        if self.state().calls.remove(&creds).is_none() {
            warn!(raw = creds.id(), "release of unknown call credentials");
        }
    }

    fn set_ssl_roots_override_callback(&self, callback: RootsOverrideCallback) {
        self.state().roots_hook = Some(callback);
    }
}
