//! Owning wrapper around one raw channel credential.

use std::sync::Arc;

use tracing::trace;

use crate::primitive::{RawChannelCredentials, TlsPrimitive};

/// Owns exactly one [`RawChannelCredentials`] and releases it exactly once.
///
/// The raw id is taken out of the handle before the primitive's release is
/// called, so neither a second [`release`](Self::release) nor the later
/// `Drop` can reach the primitive again.
#[derive(Debug)]
pub struct CredentialHandle {
    raw: Option<RawChannelCredentials>,
    primitive: Arc<dyn TlsPrimitive>,
}

impl CredentialHandle {
    /// Take ownership of a raw credential returned by `primitive`.
    ///
    /// Returns `None` for the null handle. Must only be called with
    /// credentials that no other handle owns.
    pub fn wrap(
        primitive: Arc<dyn TlsPrimitive>,
        raw: Option<RawChannelCredentials>,
    ) -> Option<Self> {
        let raw = raw?;
        Some(Self {
            raw: Some(raw),
            primitive,
        })
    }

    /// The wrapped raw credential, or `None` once released.
    pub fn raw(&self) -> Option<RawChannelCredentials> {
        self.raw
    }

    pub fn is_null(&self) -> bool {
        self.raw.is_none()
    }

    pub fn primitive(&self) -> &Arc<dyn TlsPrimitive> {
        &self.primitive
    }

    /// Release the credential. No-op if it was already released.
    pub fn release(&mut self) {
        if let Some(raw) = self.raw.take() {
            trace!(raw = raw.id(), "releasing channel credentials");
            self.primitive.channel_credentials_release(raw);
        }
    }

    /// Give up ownership without releasing.
    pub fn into_raw(mut self) -> Option<RawChannelCredentials> {
        self.raw.take()
    }
}

impl Drop for CredentialHandle {
    fn drop(&mut self) {
        self.release();
    }
}
