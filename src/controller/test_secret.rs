//! testSecret: prove the PENDING credential works.

use super::RotationController;
use crate::error::Result;
use crate::model::StepOutcome;
use crate::store::SecretStore;
use crate::target::CredentialTarget;
use tracing::info;

impl<S: SecretStore, T: CredentialTarget> RotationController<S, T> {
    /// Log in with the PENDING version under `token`. Changes nothing.
    pub async fn test_secret(&self, secret_id: &str, token: &str) -> Result<StepOutcome> {
        let pending = self.pending_version(secret_id, token).await?;
        self.validate_pending(secret_id, &pending).await?;
        info!("PENDING version {} logs in", token);
        Ok(StepOutcome::Completed)
    }
}
