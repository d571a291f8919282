//! Call-level credentials, as seen by composition.
//!
//! Creating call credentials belongs to the TLS primitive; this wrapper only
//! provides shared ownership of the raw handle so a composed channel
//! credential can keep its constituents alive.

use std::fmt;
use std::sync::Arc;

use crate::primitive::{RawCallCredentials, TlsPrimitive};

/// Shared handle to one raw call credential. Released when the last clone
/// drops.
#[derive(Clone)]
pub struct CallCredentials {
    inner: Arc<CallInner>,
}

struct CallInner {
    raw: RawCallCredentials,
    primitive: Arc<dyn TlsPrimitive>,
}

impl CallCredentials {
    /// Take ownership of a raw call credential. Returns `None` for the null
    /// handle.
    pub fn wrap(
        primitive: Arc<dyn TlsPrimitive>,
        raw: Option<RawCallCredentials>,
    ) -> Option<Self> {
        Some(Self {
            inner: Arc::new(CallInner {
                raw: raw?,
                primitive,
            }),
        })
    }

    pub fn raw(&self) -> RawCallCredentials {
        self.inner.raw
    }

    pub fn ptr_eq(&self, other: &CallCredentials) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Drop for CallInner {
    fn drop(&mut self) {
        self.primitive.call_credentials_release(self.raw);
    }
}

impl fmt::Debug for CallCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallCredentials")
            .field("raw", &self.inner.raw)
            .finish()
    }
}
