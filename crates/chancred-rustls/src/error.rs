//! Error types for building rustls configurations from PEM material.
//!
//! These never reach callers of [`TlsPrimitive`](chancred_core::TlsPrimitive):
//! a failed build is logged and reported as the null handle, which the core
//! turns into `CredentialsError::Construction`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid PEM input: {0}")]
    Pem(String),

    #[error("no root certificates available")]
    MissingRoots,

    #[error("TLS configuration error: {0}")]
    TlsConfiguration(String),

    #[error("certificate parse error: {0}")]
    CertificateParse(String),
}

pub type Result<T> = std::result::Result<T, BuildError>;
