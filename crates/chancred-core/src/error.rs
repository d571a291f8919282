//! Error types for channel credential construction and composition.
//!
//! Verification outcomes are deliberately absent: a rejected peer is the
//! normal result of the bridge (see [`crate::bridge`]), never an error that
//! reaches the caller of a construction or composition operation.

use thiserror::Error;

use crate::dispatch::DispatchError;

/// Errors that can occur within the `chancred-core` crate.
#[derive(Debug, Error)]
pub enum CredentialsError {
    // --- Construction ---
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("could not create credentials")]
    Construction,

    // --- Composition ---
    #[error("failed to compose channel and call credentials")]
    Composition,

    // --- Configuration ---
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // --- Dispatcher ---
    #[error("dispatcher error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Result type alias using [`CredentialsError`].
pub type Result<T> = std::result::Result<T, CredentialsError>;
