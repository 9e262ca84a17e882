//! createSecret: stage a fresh credential as PENDING.

use super::{staging, RotationController};
use crate::constants::MAX_PASSWORD_GENERATION_ATTEMPTS;
use crate::error::{Result, RotationError};
use crate::model::{CredentialPayload, StagingLabel, StepOutcome};
use crate::store::SecretStore;
use crate::target::CredentialTarget;
use tracing::{debug, info, warn};

impl<S: SecretStore, T: CredentialTarget> RotationController<S, T> {
    /// Generate a new password and store it as a PENDING version under `token`.
    ///
    /// Copies every non-password field from CURRENT. Re-running with the same
    /// token after success changes nothing. Fails with a conflict when another
    /// token already holds PENDING. PENDING left on the CURRENT version is
    /// stale and gets removed first.
    pub async fn create_secret(&self, secret_id: &str, token: &str) -> Result<StepOutcome> {
        let current = self.store.get_current_version(secret_id).await?;
        let mut labels = self.store.list_version_labels(secret_id).await?;

        if let Some(pending) = labels.holder(StagingLabel::Pending) {
            if pending == current.token {
                warn!(
                    "CURRENT version {} of {} still holds PENDING, removing it",
                    current.token, secret_id
                );
                staging::clear_pending(&self.store, secret_id, &current.token).await?;
                labels = self.store.list_version_labels(secret_id).await?;
            } else if pending != token {
                return Err(RotationError::Conflict {
                    pending: pending.to_string(),
                    requested: token.to_string(),
                });
            }
        }

        if self.store.exists(secret_id, token).await? {
            if labels.has_label(token, StagingLabel::Pending) {
                info!("Version {} already staged as PENDING", token);
                return Ok(StepOutcome::AlreadyDone);
            }
            return Err(RotationError::precondition(format!(
                "version {token} of {secret_id} exists but is not PENDING; use a new token"
            )));
        }

        let password = self.fresh_password(&current.payload).await?;
        let candidate = current.payload.with_password(password);
        // The store refuses PENDING atomically if a concurrent create got there first
        self.store
            .put_version(secret_id, token, &candidate, StagingLabel::Pending)
            .await?;

        info!(
            "Staged version {} of {} as PENDING (replacing {})",
            token, secret_id, current.token
        );
        Ok(StepOutcome::Completed)
    }

    async fn fresh_password(&self, current: &CredentialPayload) -> Result<String> {
        for attempt in 1..=MAX_PASSWORD_GENERATION_ATTEMPTS {
            let password = self.store.generate_password(&self.config.password).await?;
            if password != current.password {
                return Ok(password);
            }
            debug!("Generated password equals CURRENT, drawing again (attempt {})", attempt);
        }
        Err(RotationError::precondition(format!(
            "could not generate a password different from CURRENT after {MAX_PASSWORD_GENERATION_ATTEMPTS} attempts"
        )))
    }
}
