//! Peer verification options and callbacks.
//!
//! A verification callback is either a closure ([`VerifyCallback::Direct`])
//! or the name of a method registered on the
//! [`Dispatcher`](crate::dispatch::Dispatcher) ([`VerifyCallback::Named`]).
//! It receives the server name and the peer's PEM certificate and returns
//! `Ok(())` to accept the peer. Returning [`VerifyRejection`] or panicking
//! rejects it.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::error::{CredentialsError, Result};

/// Options key carrying the server identity check.
pub const CHECK_SERVER_IDENTITY: &str = "checkServerIdentity";

/// The reason a verification callback rejected a peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct VerifyRejection(String);

impl VerifyRejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    pub fn reason(&self) -> &str {
        &self.0
    }
}

/// Result returned by verification callbacks.
pub type VerifyResult = std::result::Result<(), VerifyRejection>;

/// Closure form of a verification callback.
pub type VerifyFn = dyn Fn(Option<&str>, Option<&str>) -> VerifyResult + Send + Sync;

/// Name of a method in the dispatcher's method table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodName(Arc<str>);

impl MethodName {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A user-supplied server identity check.
#[derive(Clone)]
pub enum VerifyCallback {
    /// Called directly with `(server_name, certificate)`.
    Direct(Arc<VerifyFn>),
    /// Looked up by name in the dispatcher's method table.
    Named(MethodName),
}

impl VerifyCallback {
    pub fn direct<F>(f: F) -> Self
    where
        F: Fn(Option<&str>, Option<&str>) -> VerifyResult + Send + Sync + 'static,
    {
        Self::Direct(Arc::new(f))
    }

    pub fn named(name: impl AsRef<str>) -> Self {
        Self::Named(MethodName::new(name))
    }

    /// Returns `true` if both values refer to the same closure or name.
    pub fn same_as(&self, other: &VerifyCallback) -> bool {
        match (self, other) {
            (Self::Direct(a), Self::Direct(b)) => Arc::ptr_eq(a, b),
            (Self::Named(a), Self::Named(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for VerifyCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(_) => f.write_str("VerifyCallback::Direct(..)"),
            Self::Named(name) => write!(f, "VerifyCallback::Named({name})"),
        }
    }
}

/// Additional peer verification options for one construction call.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    check_server_identity: Option<VerifyCallback>,
}

impl VerifyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_check_server_identity(mut self, callback: VerifyCallback) -> Self {
        self.check_server_identity = Some(callback);
        self
    }

    pub fn check_server_identity(&self) -> Option<&VerifyCallback> {
        self.check_server_identity.as_ref()
    }

    /// Read options from a configuration table.
    ///
    /// The only recognised key is `checkServerIdentity`, whose value must be
    /// a method name. Any other value shape is a type error; unknown keys
    /// are ignored.
    pub fn from_table(table: &toml::Table) -> Result<Self> {
        let check_server_identity = match table.get(CHECK_SERVER_IDENTITY) {
            None => None,
            Some(toml::Value::String(name)) => Some(VerifyCallback::named(name)),
            Some(other) => {
                return Err(CredentialsError::Type(format!(
                    "expected callable or method name for {CHECK_SERVER_IDENTITY}, got {}",
                    other.type_str()
                )))
            }
        };
        Ok(Self {
            check_server_identity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_table_accepts_method_name() {
        let table: toml::Table = toml::from_str(r#"checkServerIdentity = "pin_check""#).unwrap();
        let options = VerifyOptions::from_table(&table).unwrap();
        match options.check_server_identity() {
            Some(VerifyCallback::Named(name)) => assert_eq!(name.as_str(), "pin_check"),
            other => panic!("unexpected callback: {other:?}"),
        }
    }

    #[test]
    fn from_table_without_key_has_no_callback() {
        let table = toml::Table::new();
        let options = VerifyOptions::from_table(&table).unwrap();
        assert!(options.check_server_identity().is_none());
    }

    #[test]
    fn from_table_rejects_integer() {
        let table: toml::Table = toml::from_str("checkServerIdentity = 42").unwrap();
        let err = VerifyOptions::from_table(&table).unwrap_err();
        assert!(matches!(err, CredentialsError::Type(_)));
        assert!(err.to_string().contains("integer"));
    }

    #[test]
    fn from_table_rejects_table_value() {
        let table: toml::Table =
            toml::from_str("[checkServerIdentity]\nname = \"x\"").unwrap();
        let err = VerifyOptions::from_table(&table).unwrap_err();
        assert!(matches!(err, CredentialsError::Type(_)));
    }

    #[test]
    fn same_as_compares_identity() {
        let a = VerifyCallback::direct(|_, _| Ok(()));
        let b = a.clone();
        let c = VerifyCallback::direct(|_, _| Ok(()));
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
        assert!(VerifyCallback::named("m").same_as(&VerifyCallback::named("m")));
        assert!(!a.same_as(&VerifyCallback::named("m")));
    }

    #[test]
    fn rejection_displays_reason() {
        let rejection = VerifyRejection::new("pin mismatch");
        assert_eq!(rejection.to_string(), "pin mismatch");
        assert_eq!(rejection.reason(), "pin mismatch");
    }
}
