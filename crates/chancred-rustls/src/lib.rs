//! `rustls` backend for channel credentials.
//!
//! [`RustlsPrimitive`] turns credential requests into `rustls::ClientConfig`s.
//! When a request carries a verification hook, the config's server verifier
//! is a [`CallbackServerCertVerifier`] that runs the hook after the usual
//! WebPKI checks.

pub mod cert_extract;
pub mod error;
pub mod primitive;
pub mod verifier;

pub use error::BuildError;
pub use primitive::{CallMetadata, RustlsPrimitive};
pub use verifier::CallbackServerCertVerifier;
