//! finishSecret: promote PENDING to CURRENT.

use super::{staging, RotationController};
use crate::error::{Result, RotationError};
use crate::model::{StagingLabel, StepOutcome};
use crate::store::SecretStore;
use crate::target::CredentialTarget;
use tracing::info;

impl<S: SecretStore, T: CredentialTarget> RotationController<S, T> {
    /// Move CURRENT to the version under `token`, PREVIOUS to the old CURRENT,
    /// and clear PENDING.
    ///
    /// The PENDING credential is checked against the database first, so a
    /// finish that runs before setSecret leaves CURRENT where it was.
    pub async fn finish_secret(&self, secret_id: &str, token: &str) -> Result<StepOutcome> {
        let labels = self.store.list_version_labels(secret_id).await?;

        if labels.has_label(token, StagingLabel::Current) {
            if labels.has_label(token, StagingLabel::Pending) {
                staging::clear_pending(&self.store, secret_id, token).await?;
            }
            info!("Version {} already holds CURRENT", token);
            return Ok(StepOutcome::AlreadyCurrent);
        }

        let old_current = labels
            .holder(StagingLabel::Current)
            .ok_or_else(|| {
                RotationError::precondition(format!("secret {secret_id} has no CURRENT version"))
            })?
            .to_string();

        let pending = self.pending_version(secret_id, token).await?;
        self.validate_pending(secret_id, &pending).await?;

        staging::promote(&self.store, secret_id, token, &old_current).await?;
        info!(
            "Version {} of {} is now CURRENT, {} is PREVIOUS",
            token, secret_id, old_current
        );
        Ok(StepOutcome::Completed)
    }
}
