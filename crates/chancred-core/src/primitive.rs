//! The seam between credential wrappers and the TLS layer.
//!
//! A [`TlsPrimitive`] owns the real credential objects and hands out opaque
//! raw identifiers for them. Creation returns `None` for failure (the null
//! handle). Releasing a raw credential twice is undefined for the primitive;
//! [`CredentialHandle`](crate::handle::CredentialHandle) is what guarantees
//! it happens exactly once.
//!
//! Implementations:
//! - [`MemoryPrimitive`](crate::memory::MemoryPrimitive): in-memory, records
//!   every create/release, used by tests.
//! - `chancred_rustls::RustlsPrimitive`: builds `rustls::ClientConfig`s.

use std::fmt;

use crate::bridge::VerifyUserdata;
use crate::pem::PemBuffer;
use crate::roots::RootsOverrideCallback;

/// Opaque identifier of a channel credential owned by a [`TlsPrimitive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawChannelCredentials(u64);

impl RawChannelCredentials {
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// Opaque identifier of a call credential owned by a [`TlsPrimitive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawCallCredentials(u64);

impl RawCallCredentials {
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// Client private key and certificate chain, both PEM-encoded.
#[derive(Debug, Clone)]
pub struct KeyCertPair {
    pub private_key: PemBuffer,
    pub cert_chain: PemBuffer,
}

/// Signature of the function the TLS layer calls to verify a peer.
///
/// Returns `0` to accept the peer, anything else to reject it.
pub type VerifyPeerFn = fn(Option<&str>, Option<&str>, Option<&VerifyUserdata>) -> i32;

/// Peer verification hook handed to the TLS layer at creation time.
#[derive(Clone)]
pub struct VerifyPeerOptions {
    pub verify_peer_callback: VerifyPeerFn,
    pub verify_peer_callback_userdata: Option<VerifyUserdata>,
}

impl VerifyPeerOptions {
    /// Run the verification hook for a peer, the way the TLS layer does
    /// during a handshake.
    pub fn invoke(&self, server_name: Option<&str>, cert_pem: Option<&str>) -> i32 {
        (self.verify_peer_callback)(
            server_name,
            cert_pem,
            self.verify_peer_callback_userdata.as_ref(),
        )
    }
}

impl fmt::Debug for VerifyPeerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifyPeerOptions")
            .field(
                "has_userdata",
                &self.verify_peer_callback_userdata.is_some(),
            )
            .finish()
    }
}

/// Everything needed to create an SSL channel credential.
///
/// `pem_root_certs == None` means "use the roots override hook, then the
/// primitive's own defaults".
#[derive(Debug, Clone, Default)]
pub struct SslCredentialsRequest {
    pub pem_root_certs: Option<PemBuffer>,
    pub pem_key_cert_pair: Option<KeyCertPair>,
    pub verify_options: Option<VerifyPeerOptions>,
}

/// Create, compose, and release operations on opaque credential handles.
///
/// Implementations must be `Send + Sync`: handles are released from
/// whichever thread drops the last reference to a credential store.
pub trait TlsPrimitive: Send + Sync {
    /// Create an SSL channel credential. `None` signals failure.
    fn ssl_credentials_create(
        &self,
        request: SslCredentialsRequest,
    ) -> Option<RawChannelCredentials>;

    /// Layer call credentials on top of a channel credential, producing a
    /// new channel credential. The inputs remain owned by the caller.
    fn composite_channel_credentials_create(
        &self,
        channel: RawChannelCredentials,
        call: RawCallCredentials,
    ) -> Option<RawChannelCredentials>;

    /// Release a channel credential. Must be called exactly once per
    /// credential.
    fn channel_credentials_release(&self, creds: RawChannelCredentials);

    /// Release a call credential. Must be called exactly once per credential.
    fn call_credentials_release(&self, creds: RawCallCredentials);

    /// Register the hook consulted when a request carries no root certs.
    fn set_ssl_roots_override_callback(&self, callback: RootsOverrideCallback);
}

impl fmt::Debug for dyn TlsPrimitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn TlsPrimitive")
    }
}
