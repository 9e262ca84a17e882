//! setSecret: make the database accept the PENDING password.

use super::RotationController;
use crate::error::{Result, RotationError};
use crate::model::{CredentialPayload, SecretVersion, StagingLabel, StepOutcome};
use crate::store::SecretStore;
use crate::target::CredentialTarget;
use tracing::{debug, info, warn};

impl<S: SecretStore, T: CredentialTarget> RotationController<S, T> {
    /// Change the database account's password to the one in the PENDING
    /// version under `token`.
    ///
    /// When the PENDING credential already logs in there is nothing to do.
    /// Otherwise the change is made while logged in as the same account with
    /// the CURRENT credential, falling back to PREVIOUS.
    pub async fn set_secret(&self, secret_id: &str, token: &str) -> Result<StepOutcome> {
        let pending = self.pending_version(secret_id, token).await?;
        let timeout = self.config.connect_timeout;

        match self
            .target
            .authenticate(&self.connection_view(&pending.payload), timeout)
            .await
        {
            Ok(()) => {
                info!("PENDING credential already accepted, password is set");
                return Ok(StepOutcome::AlreadyDone);
            }
            Err(RotationError::Validation(_)) => {
                debug!("PENDING credential not accepted yet");
            }
            Err(e) => return Err(e),
        }

        let current = self.store.get_current_version(secret_id).await?;
        if current.payload.username != pending.payload.username {
            return Err(RotationError::precondition(format!(
                "PENDING version {token} is for user {} but CURRENT is for {}",
                pending.payload.username, current.payload.username
            )));
        }

        let login = self.working_login(secret_id, &current).await?;
        self.target
            .apply_new_password(&login, &pending.payload.password, timeout)
            .await?;

        info!("Database password set from version {}", token);
        Ok(StepOutcome::Completed)
    }

    /// First of CURRENT and PREVIOUS that the database accepts
    async fn working_login(&self, secret_id: &str, current: &SecretVersion) -> Result<CredentialPayload> {
        let mut candidates = vec![current.clone()];

        let labels = self.store.list_version_labels(secret_id).await?;
        if let Some(previous_token) = labels.holder(StagingLabel::Previous) {
            if previous_token != current.token {
                if let Some(previous) = self.store.get_version(secret_id, previous_token).await? {
                    if previous.payload.username == current.payload.username {
                        candidates.push(previous);
                    }
                }
            }
        }

        for candidate in &candidates {
            let login = self.connection_view(&candidate.payload);
            match self
                .target
                .authenticate(&login, self.config.connect_timeout)
                .await
            {
                Ok(()) => {
                    debug!("Logged in with version {}", candidate.token);
                    return Ok(login);
                }
                Err(RotationError::Validation(reason)) => {
                    warn!("Version {} rejected by database: {}", candidate.token, reason);
                }
                Err(e) => return Err(e),
            }
        }

        Err(RotationError::precondition(format!(
            "neither CURRENT nor PREVIOUS credential of {secret_id} can log in; cannot set PENDING password"
        )))
    }
}
