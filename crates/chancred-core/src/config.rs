//! File-based credentials configuration.
//!
//! ```toml
//! root_certs = "/etc/chancred/roots.pem"
//! private_key = "/etc/chancred/client.key"
//! cert_chain = "/etc/chancred/client.pem"
//! default_roots = "/etc/chancred/default-roots.pem"
//!
//! [verify]
//! checkServerIdentity = "pin_server"
//! ```
//!
//! Paths are relative to the working directory. `checkServerIdentity` names
//! a method registered on the dispatcher.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::error::{CredentialsError, Result};
use crate::pem::PemBuffer;
use crate::roots::set_default_roots_pem;
use crate::verify::VerifyOptions;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub root_certs: Option<PathBuf>,

    #[serde(default)]
    pub private_key: Option<PathBuf>,

    #[serde(default)]
    pub cert_chain: Option<PathBuf>,

    /// Process-wide default roots, applied by [`apply_default_roots`](Self::apply_default_roots).
    #[serde(default)]
    pub default_roots: Option<PathBuf>,

    /// Raw verification options, validated by [`VerifyOptions::from_table`].
    #[serde(default)]
    pub verify: Option<toml::Table>,
}

/// PEM material and options read from a [`CredentialsConfig`].
#[derive(Debug, Clone, Default)]
pub struct CredentialsMaterial {
    pub root_certs: Option<PemBuffer>,
    pub private_key: Option<PemBuffer>,
    pub cert_chain: Option<PemBuffer>,
    pub verify_options: Option<VerifyOptions>,
}

impl CredentialsConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: CredentialsConfig =
            toml::from_str(contents).map_err(|e| CredentialsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the shape of the configuration without touching the files.
    pub fn validate(&self) -> Result<()> {
        if self.private_key.is_some() != self.cert_chain.is_some() {
            return Err(CredentialsError::Config(
                "private_key and cert_chain must be set together".into(),
            ));
        }
        if let Some(verify) = &self.verify {
            VerifyOptions::from_table(verify)?;
        }
        Ok(())
    }

    /// Read the configured PEM files and verification options.
    pub fn load_material(&self) -> Result<CredentialsMaterial> {
        Ok(CredentialsMaterial {
            root_certs: read_pem(self.root_certs.as_deref())?,
            private_key: read_pem(self.private_key.as_deref())?,
            cert_chain: read_pem(self.cert_chain.as_deref())?,
            verify_options: self
                .verify
                .as_ref()
                .map(VerifyOptions::from_table)
                .transpose()?,
        })
    }

    /// Install `default_roots` as the process-wide default roots.
    ///
    /// Returns `false` when the configuration names none.
    pub fn apply_default_roots(&self) -> Result<bool> {
        let Some(path) = &self.default_roots else {
            return Ok(false);
        };
        let pem = fs::read(path)?;
        set_default_roots_pem(&pem);
        info!(path = %path.display(), "applied default root certificates");
        Ok(true)
    }
}

fn read_pem(path: Option<&Path>) -> Result<Option<PemBuffer>> {
    let Some(path) = path else {
        return Ok(None);
    };
    Ok(Some(PemBuffer::from(fs::read(path)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::VerifyCallback;
    use std::io::Write;

    #[test]
    fn empty_config_is_valid() {
        let config = CredentialsConfig::from_toml("").unwrap();
        assert!(config.root_certs.is_none());
        assert!(config.verify.is_none());
        let material = config.load_material().unwrap();
        assert!(material.root_certs.is_none());
        assert!(material.verify_options.is_none());
    }

    #[test]
    fn lone_private_key_is_rejected() {
        let err = CredentialsConfig::from_toml(r#"private_key = "client.key""#).unwrap_err();
        assert!(matches!(err, CredentialsError::Config(_)));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = CredentialsConfig::from_toml(r#"roots = "x.pem""#).unwrap_err();
        assert!(matches!(err, CredentialsError::Config(_)));
    }

    #[test]
    fn non_string_callback_is_type_error() {
        let err =
            CredentialsConfig::from_toml("[verify]\ncheckServerIdentity = true").unwrap_err();
        assert!(matches!(err, CredentialsError::Type(_)));
    }

    #[test]
    fn loads_pem_files_and_options() {
        let mut roots = tempfile::NamedTempFile::new().unwrap();
        write!(roots, "-----BEGIN CERTIFICATE-----\nroots\n").unwrap();

        let toml = format!(
            "root_certs = {:?}\n[verify]\ncheckServerIdentity = \"pin\"\n",
            roots.path().display().to_string()
        );
        let config = CredentialsConfig::from_toml(&toml).unwrap();
        let material = config.load_material().unwrap();

        assert_eq!(
            material.root_certs.unwrap().as_bytes(),
            b"-----BEGIN CERTIFICATE-----\nroots\n"
        );
        match material.verify_options.unwrap().check_server_identity() {
            Some(VerifyCallback::Named(name)) => assert_eq!(name.as_str(), "pin"),
            other => panic!("unexpected callback: {other:?}"),
        }
    }

    #[test]
    fn unreadable_files_are_io_errors() {
        let missing = PathBuf::from("/nonexistent/chancred/roots.pem");

        let config = CredentialsConfig {
            root_certs: Some(missing.clone()),
            ..Default::default()
        };
        let err = config.load_material().unwrap_err();
        assert!(matches!(err, CredentialsError::Io(_)));

        let config = CredentialsConfig {
            default_roots: Some(missing.clone()),
            ..Default::default()
        };
        assert!(matches!(config.apply_default_roots(), Err(CredentialsError::Io(_))));

        assert!(matches!(CredentialsConfig::load(&missing), Err(CredentialsError::Io(_))));
    }

    #[test]
    fn load_reads_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "root_certs = \"roots.pem\"\n[verify]\ncheckServerIdentity = \"pin\"\n"
        )
        .unwrap();

        let config = CredentialsConfig::load(file.path()).unwrap();
        assert_eq!(config.root_certs.as_deref(), Some(Path::new("roots.pem")));
        assert!(config.private_key.is_none());
        assert_eq!(
            config.verify.unwrap().get("checkServerIdentity").and_then(|v| v.as_str()),
            Some("pin")
        );
    }

    #[test]
    fn apply_default_roots_without_path_is_noop() {
        let config = CredentialsConfig::default();
        assert!(!config.apply_default_roots().unwrap());
    }
}
