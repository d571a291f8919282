//! The channel credential object handed to callers.
//!
//! A [`ChannelCredentials`] owns one [`CredentialHandle`] and a retained set
//! of everything the native credential points into: the PEM buffers it was
//! built from, its verification callback, or, for composed credentials, the
//! constituent credentials. The store is immutable after construction and
//! shared by cloning; the handle is released once, when the last clone
//! drops, and before the retained values are dropped.

use std::fmt;
use std::sync::Arc;

use crate::call::CallCredentials;
use crate::handle::CredentialHandle;
use crate::pem::PemBuffer;
use crate::primitive::{RawChannelCredentials, TlsPrimitive};
use crate::verify::VerifyCallback;

/// A value kept alive for as long as the credential store exists.
#[derive(Debug, Clone)]
pub enum Retained {
    RootCerts(PemBuffer),
    PrivateKey(PemBuffer),
    CertChain(PemBuffer),
    VerifyCallback(VerifyCallback),
    Channel(ChannelCredentials),
    Call(CallCredentials),
}

/// Shared, immutable channel credentials.
///
/// Cloning shares the store; it never duplicates the native credential.
#[derive(Clone)]
pub struct ChannelCredentials {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    raw: RawChannelCredentials,
    // Declared before `retained` so the native credential is released before
    // the buffers it references are dropped.
    handle: CredentialHandle,
    retained: Vec<Retained>,
}

impl ChannelCredentials {
    /// Wrap a raw credential together with the values it must keep alive.
    ///
    /// Returns `None` for the null handle. Must only be called with
    /// credentials that no other store owns.
    pub fn wrap(
        primitive: Arc<dyn TlsPrimitive>,
        raw: Option<RawChannelCredentials>,
        retained: Vec<Retained>,
    ) -> Option<Self> {
        Self::from_handle(CredentialHandle::wrap(primitive, raw)?, retained)
    }

    /// Build a store around an owned handle. Returns `None` if the handle
    /// was already released.
    pub fn from_handle(handle: CredentialHandle, retained: Vec<Retained>) -> Option<Self> {
        let raw = handle.raw()?;
        Some(Self {
            inner: Arc::new(StoreInner {
                raw,
                handle,
                retained,
            }),
        })
    }

    /// The wrapped raw credential.
    pub fn raw(&self) -> RawChannelCredentials {
        self.inner.raw
    }

    pub fn primitive(&self) -> &Arc<dyn TlsPrimitive> {
        self.inner.handle.primitive()
    }

    pub fn retained(&self) -> &[Retained] {
        &self.inner.retained
    }

    pub fn root_certs(&self) -> Option<&PemBuffer> {
        self.inner.retained.iter().find_map(|r| match r {
            Retained::RootCerts(pem) => Some(pem),
            _ => None,
        })
    }

    pub fn private_key(&self) -> Option<&PemBuffer> {
        self.inner.retained.iter().find_map(|r| match r {
            Retained::PrivateKey(pem) => Some(pem),
            _ => None,
        })
    }

    pub fn cert_chain(&self) -> Option<&PemBuffer> {
        self.inner.retained.iter().find_map(|r| match r {
            Retained::CertChain(pem) => Some(pem),
            _ => None,
        })
    }

    pub fn verify_callback(&self) -> Option<&VerifyCallback> {
        self.inner.retained.iter().find_map(|r| match r {
            Retained::VerifyCallback(cb) => Some(cb),
            _ => None,
        })
    }

    /// Returns `true` if both values share the same store.
    pub fn ptr_eq(&self, other: &ChannelCredentials) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ChannelCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelCredentials")
            .field("raw", &self.inner.raw)
            .field("retained", &self.inner.retained.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryPrimitive;
    use crate::primitive::SslCredentialsRequest;

    #[test]
    fn wrap_null_returns_none() {
        let primitive = Arc::new(MemoryPrimitive::new());
        assert!(ChannelCredentials::wrap(primitive, None, Vec::new()).is_none());
    }

    #[test]
    fn last_clone_releases_handle_once() {
        let primitive = Arc::new(MemoryPrimitive::new());
        let raw = primitive.ssl_credentials_create(SslCredentialsRequest::default());
        let creds = ChannelCredentials::wrap(primitive.clone(), raw, Vec::new()).unwrap();
        let raw = creds.raw();

        let shared = creds.clone();
        assert!(shared.ptr_eq(&creds));
        drop(creds);
        assert!(primitive.is_live(raw));

        drop(shared);
        assert!(!primitive.is_live(raw));
        assert_eq!(primitive.release_count(raw), 1);
    }

    #[test]
    fn retained_buffers_outlive_handle() {
        let primitive = Arc::new(MemoryPrimitive::new());
        let roots = PemBuffer::from("ROOTS");
        let raw = primitive.ssl_credentials_create(SslCredentialsRequest {
            pem_root_certs: Some(roots.clone()),
            ..Default::default()
        });
        let creds = ChannelCredentials::wrap(
            primitive.clone(),
            raw,
            vec![Retained::RootCerts(roots.clone())],
        )
        .unwrap();

        assert!(creds.root_certs().unwrap().ptr_eq(&roots));
        assert!(creds.private_key().is_none());
        assert!(creds.cert_chain().is_none());
        assert!(creds.verify_callback().is_none());

        drop(creds);
        // Store and primitive both let go of their references.
        assert_eq!(roots.ref_count(), 1);
    }
}
