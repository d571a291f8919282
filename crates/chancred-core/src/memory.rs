//! In-memory [`TlsPrimitive`] that records what it is asked to do.
//!
//! Suitable for tests and for exercising the credential lifecycle without a
//! TLS stack. It checks only that PEM inputs look like PEM, counts every
//! create and release per raw id, supports failure injection, and can replay
//! the verification hook the way a TLS layer would during a handshake.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::bridge::VERIFY_ACCEPT;
use crate::call::CallCredentials;
use crate::pem::PemBuffer;
use crate::primitive::{
    KeyCertPair, RawCallCredentials, RawChannelCredentials, SslCredentialsRequest, TlsPrimitive,
    VerifyPeerOptions,
};
use crate::roots::{RootsOverrideCallback, RootsOverrideResult};

const PEM_MARKER: &[u8] = b"-----BEGIN";

#[derive(Default)]
pub struct MemoryPrimitive {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    channels: HashMap<RawChannelCredentials, ChannelEntry>,
    calls: HashSet<RawCallCredentials>,
    releases: HashMap<RawChannelCredentials, usize>,
    call_releases: HashMap<RawCallCredentials, usize>,
    created: usize,
    composites: Vec<RawChannelCredentials>,
    composite_attempts: usize,
    fail_composite_at: Option<usize>,
    fail_next_create: bool,
    roots_hook: Option<RootsOverrideCallback>,
    roots_hook_calls: usize,
}

#[derive(Clone, Default)]
struct ChannelEntry {
    roots: Option<PemBuffer>,
    roots_from_override: bool,
    key_cert_pair: Option<KeyCertPair>,
    verify_options: Option<VerifyPeerOptions>,
    layers: Vec<RawCallCredentials>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl MemoryPrimitive {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create call credentials owned by this primitive.
    pub fn call_credentials(this: &Arc<Self>) -> Option<CallCredentials> {
        let raw = this.create_call_credentials();
        CallCredentials::wrap(this.clone(), Some(raw))
    }

    pub fn create_call_credentials(&self) -> RawCallCredentials {
        let mut state = self.state();
        let raw = RawCallCredentials::from_raw(state.next_id());
        state.calls.insert(raw);
        raw
    }

    /// Make the next `ssl_credentials_create` return the null handle.
    pub fn fail_next_create(&self) {
        self.state().fail_next_create = true;
    }

    /// Make the `attempt`-th composite creation from now on (1-based) fail.
    pub fn fail_composite_at(&self, attempt: usize) {
        let mut state = self.state();
        state.fail_composite_at = Some(state.composite_attempts + attempt);
    }

    /// Run the stored verification hook for `raw`, as a handshake would.
    ///
    /// Returns `None` if `raw` is not live, and accepts when the credential
    /// carries no hook.
    pub fn simulate_handshake(
        &self,
        raw: RawChannelCredentials,
        server_name: Option<&str>,
        cert_pem: Option<&str>,
    ) -> Option<i32> {
        let options = self.state().channels.get(&raw)?.verify_options.clone();
        // The hook may block on another thread; the lock is not held here.
        Some(match options {
            Some(options) => options.invoke(server_name, cert_pem),
            None => VERIFY_ACCEPT,
        })
    }

    pub fn is_live(&self, raw: RawChannelCredentials) -> bool {
        self.state().channels.contains_key(&raw)
    }

    pub fn is_call_live(&self, raw: RawCallCredentials) -> bool {
        self.state().calls.contains(&raw)
    }

    pub fn live_count(&self) -> usize {
        self.state().channels.len()
    }

    /// Channel credentials created so far, composites included.
    pub fn created_count(&self) -> usize {
        self.state().created
    }

    /// Composite credentials created so far, in creation order.
    pub fn composites(&self) -> Vec<RawChannelCredentials> {
        self.state().composites.clone()
    }

    pub fn release_count(&self, raw: RawChannelCredentials) -> usize {
        self.state().releases.get(&raw).copied().unwrap_or(0)
    }

    pub fn call_release_count(&self, raw: RawCallCredentials) -> usize {
        self.state().call_releases.get(&raw).copied().unwrap_or(0)
    }

    pub fn total_releases(&self) -> usize {
        self.state().releases.values().sum()
    }

    /// Root certs a live credential was created with.
    pub fn roots(&self, raw: RawChannelCredentials) -> Option<PemBuffer> {
        self.state().channels.get(&raw)?.roots.clone()
    }

    /// Whether a live credential's roots came from the override hook.
    pub fn roots_from_override(&self, raw: RawChannelCredentials) -> bool {
        self.state()
            .channels
            .get(&raw)
            .is_some_and(|entry| entry.roots_from_override)
    }

    pub fn key_cert_pair(&self, raw: RawChannelCredentials) -> Option<KeyCertPair> {
        self.state().channels.get(&raw)?.key_cert_pair.clone()
    }

    pub fn has_verify_options(&self, raw: RawChannelCredentials) -> bool {
        self.state()
            .channels
            .get(&raw)
            .is_some_and(|entry| entry.verify_options.is_some())
    }

    /// Call credentials layered onto a live composite, in order.
    pub fn layers(&self, raw: RawChannelCredentials) -> Vec<RawCallCredentials> {
        self.state()
            .channels
            .get(&raw)
            .map(|entry| entry.layers.clone())
            .unwrap_or_default()
    }

    pub fn has_roots_hook(&self) -> bool {
        self.state().roots_hook.is_some()
    }

    pub fn roots_hook_calls(&self) -> usize {
        self.state().roots_hook_calls
    }
}

fn looks_like_pem(pem: &PemBuffer) -> bool {
    pem.as_bytes()
        .windows(PEM_MARKER.len())
        .any(|window| window == PEM_MARKER)
}

impl TlsPrimitive for MemoryPrimitive {
    fn ssl_credentials_create(
        &self,
        request: SslCredentialsRequest,
    ) -> Option<RawChannelCredentials> {
        let hook = {
            let mut state = self.state();
            if std::mem::take(&mut state.fail_next_create) {
                return None;
            }
            state.roots_hook
        };

        let mut roots_from_override = false;
        let roots = match request.pem_root_certs {
            Some(roots) => Some(roots),
            // The hook reads process state; call it without holding our lock.
            None => match hook {
                Some(hook) => {
                    self.state().roots_hook_calls += 1;
                    match hook() {
                        (RootsOverrideResult::Ok, Some(pem)) => {
                            roots_from_override = true;
                            Some(pem)
                        }
                        _ => None,
                    }
                }
                None => None,
            },
        };

        let pem_inputs = roots.iter().chain(
            request
                .pem_key_cert_pair
                .iter()
                .flat_map(|pair| [&pair.private_key, &pair.cert_chain]),
        );
        for pem in pem_inputs {
            if !looks_like_pem(pem) {
                warn!(?pem, "rejecting malformed PEM input");
                return None;
            }
        }

        let mut state = self.state();
        let raw = RawChannelCredentials::from_raw(state.next_id());
        state.channels.insert(
            raw,
            ChannelEntry {
                roots,
                roots_from_override,
                key_cert_pair: request.pem_key_cert_pair,
                verify_options: request.verify_options,
                layers: Vec::new(),
            },
        );
        state.created += 1;
        Some(raw)
    }

    fn composite_channel_credentials_create(
        &self,
        channel: RawChannelCredentials,
        call: RawCallCredentials,
    ) -> Option<RawChannelCredentials> {
        let mut state = self.state();
        state.composite_attempts += 1;
        if state.fail_composite_at == Some(state.composite_attempts) {
            state.fail_composite_at = None;
            return None;
        }
        if !state.calls.contains(&call) {
            return None;
        }

        let mut entry = state.channels.get(&channel)?.clone();
        entry.layers.push(call);

        let raw = RawChannelCredentials::from_raw(state.next_id());
        state.channels.insert(raw, entry);
        state.created += 1;
        state.composites.push(raw);
        Some(raw)
    }

    fn channel_credentials_release(&self, creds: RawChannelCredentials) {
        let entry = {
            let mut state = self.state();
            *state.releases.entry(creds).or_insert(0) += 1;
            state.channels.remove(&creds)
        };
        if entry.is_none() {
            warn!(raw = creds.id(), "release of unknown channel credentials");
        }
        // Entry (and the buffers it shares) dropped outside the lock.
        drop(entry);
    }

    fn call_credentials_release(&self, creds: RawCallCredentials) {
        let mut state = self.state();
        *state.call_releases.entry(creds).or_insert(0) += 1;
        if !state.calls.remove(&creds) {
            warn!(raw = creds.id(), "release of unknown call credentials");
        }
    }

    fn set_ssl_roots_override_callback(&self, callback: RootsOverrideCallback) {
        self.state().roots_hook = Some(callback);
    }
}
