//! Process-wide default root certificates.
//!
//! When a credential is created without explicit root certs, the TLS
//! primitive asks its roots override hook. [`CredentialsContext`] registers
//! [`get_ssl_roots_override`] as that hook, which serves whatever was last
//! passed to [`set_default_roots_pem`].
//!
//! The default roots are meant to be set once during startup, before
//! credentials relying on them are created. The cell is mutex-guarded, so a
//! later replacement is safe but only affects credentials created after it.
//!
//! [`CredentialsContext`]: crate::construct::CredentialsContext

use std::sync::{Mutex, PoisonError};

use tracing::info;

use crate::pem::PemBuffer;

/// Outcome of a roots override lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootsOverrideResult {
    /// An override is set and was returned.
    Ok,
    /// No override is set; the primitive falls back to its own defaults.
    Fail,
}

/// Signature of the roots override hook registered with a primitive.
pub type RootsOverrideCallback = fn() -> (RootsOverrideResult, Option<PemBuffer>);

/// A replaceable root certificate buffer.
#[derive(Debug, Default)]
pub struct RootsOverride {
    pem: Mutex<Option<PemBuffer>>,
}

impl RootsOverride {
    pub const fn new() -> Self {
        Self {
            pem: Mutex::new(None),
        }
    }

    /// Replace the buffer with a copy of `pem`, dropping the previous one.
    pub fn set(&self, pem: &[u8]) {
        let replacement = PemBuffer::new(pem);
        let previous = self
            .pem
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(replacement);
        // Dropped outside the lock.
        drop(previous);
    }

    pub fn lookup(&self) -> (RootsOverrideResult, Option<PemBuffer>) {
        match self
            .pem
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            Some(pem) => (RootsOverrideResult::Ok, Some(pem)),
            None => (RootsOverrideResult::Fail, None),
        }
    }
}

static DEFAULT_ROOTS: RootsOverride = RootsOverride::new();

/// Set the process-wide default root certificates.
pub fn set_default_roots_pem(pem: &[u8]) {
    DEFAULT_ROOTS.set(pem);
    info!(bytes = pem.len(), "default root certificates replaced");
}

/// The roots override hook: returns the process-wide default roots, if set.
pub fn get_ssl_roots_override() -> (RootsOverrideResult, Option<PemBuffer>) {
    DEFAULT_ROOTS.lookup()
}
