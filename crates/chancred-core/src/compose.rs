//! Layering call credentials onto channel credentials.

use tracing::{debug, warn};

use crate::call::CallCredentials;
use crate::error::{CredentialsError, Result};
use crate::handle::CredentialHandle;
use crate::store::{ChannelCredentials, Retained};

impl ChannelCredentials {
    /// Compose these channel credentials with `extras`, in order.
    ///
    /// With no extras this returns `self` (the same store). Otherwise each
    /// step composes the running credential with the next call credential.
    /// The intermediate credential from the previous step is released as
    /// soon as the next step succeeds, or when a step fails. The base
    /// credential is never released here.
    ///
    /// The result keeps `self` and every call credential alive.
    pub fn compose(&self, extras: &[CallCredentials]) -> Result<ChannelCredentials> {
        if extras.is_empty() {
            return Ok(self.clone());
        }

        let primitive = self.primitive().clone();
        let mut retained = Vec::with_capacity(extras.len() + 1);
        retained.push(Retained::Channel(self.clone()));

        // Owns the credential created by the previous step, if any.
        let mut current: Option<CredentialHandle> = None;

        for (step, call) in extras.iter().enumerate() {
            retained.push(Retained::Call(call.clone()));

            let channel = match current.as_ref().and_then(CredentialHandle::raw) {
                Some(intermediate) => intermediate,
                None => self.raw(),
            };
            let composed = primitive.composite_channel_credentials_create(channel, call.raw());

            // Replacing `current` drops, and so releases, the previous
            // intermediate. On failure the early return does the same.
            current = Some(CredentialHandle::wrap(primitive.clone(), composed).ok_or_else(|| {
                warn!(step, "failed to compose channel and call credentials");
                CredentialsError::Composition
            })?);
        }

        let handle = current.ok_or(CredentialsError::Composition)?;
        let composed =
            ChannelCredentials::from_handle(handle, retained).ok_or(CredentialsError::Composition)?;
        debug!(
            base = self.raw().id(),
            composed = composed.raw().id(),
            layers = extras.len(),
            "composed channel credentials"
        );
        Ok(composed)
    }
}
