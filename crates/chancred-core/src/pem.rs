//! Shared, immutable PEM byte buffers.
//!
//! A TLS primitive may keep pointers into the PEM material it was built
//! from. [`PemBuffer`] is an `Arc<[u8]>`, so the primitive and the
//! credential store hold the same allocation and the bytes stay alive as
//! long as either side does.

use std::fmt;
use std::sync::Arc;

/// PEM-encoded bytes shared between a credential store and the primitive.
#[derive(Clone, PartialEq, Eq)]
pub struct PemBuffer(Arc<[u8]>);

impl PemBuffer {
    /// Copy `bytes` into a new shared buffer.
    pub fn new(bytes: impl AsRef<[u8]>) -> Self {
        Self(Arc::from(bytes.as_ref()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the contents as UTF-8, if they are.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if both buffers share the same allocation.
    pub fn ptr_eq(&self, other: &PemBuffer) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Number of live references to this allocation, including `self`.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl From<&[u8]> for PemBuffer {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

impl From<&str> for PemBuffer {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl From<String> for PemBuffer {
    fn from(s: String) -> Self {
        Self(Arc::from(s.into_bytes()))
    }
}

impl From<Vec<u8>> for PemBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Arc::from(bytes))
    }
}

impl AsRef<[u8]> for PemBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// Key material must not end up in logs.
impl fmt::Debug for PemBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PemBuffer({} bytes)", self.0.len())
    }
}
