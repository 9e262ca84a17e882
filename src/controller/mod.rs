//! # Rotation Controller
//!
//! Dispatches rotation requests to the four phase handlers:
//!
//! 1. **createSecret** - stage a new version with a fresh password as PENDING
//! 2. **setSecret** - change the database account's password to the PENDING one
//! 3. **testSecret** - log in with the PENDING credential
//! 4. **finishSecret** - promote PENDING to CURRENT, demote CURRENT to PREVIOUS
//!
//! The controller keeps no state between invocations; everything it needs is
//! read back from the [`SecretStore`], so any step may run in a different
//! process than the one before it. Each handler is safe to repeat with the
//! same token.

use crate::config::RotationConfig;
use crate::error::{Result, RotationError};
use crate::model::{CredentialPayload, RotationRequest, RotationStep, SecretVersion, StagingLabel, StepOutcome};
use crate::observability::metrics;
use crate::store::SecretStore;
use crate::target::CredentialTarget;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

mod create_secret;
mod finish_secret;
mod set_secret;
pub mod staging;
mod test_secret;

/// Four-phase credential rotation state machine
pub struct RotationController<S, T> {
    store: S,
    target: T,
    config: RotationConfig,
}

impl<S, T> std::fmt::Debug for RotationController<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotationController")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: SecretStore, T: CredentialTarget> RotationController<S, T> {
    /// Build a controller around injected store and target handles
    pub fn new(store: S, target: T, config: RotationConfig) -> Self {
        Self {
            store,
            target,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn config(&self) -> &RotationConfig {
        &self.config
    }

    /// Run the step named in `request`.
    ///
    /// Unknown step names are logged and ignored. When the request token
    /// already holds CURRENT the rotation is over and every step is a no-op.
    pub async fn dispatch(&self, request: &RotationRequest) -> Result<StepOutcome> {
        let span = info_span!(
            "rotation.step",
            secret.id = %request.secret_id,
            rotation.token = %request.request_token,
            rotation.step = %request.step
        );
        let step = request.step.metric_label();
        let start = Instant::now();

        let result = self.run_step(request).instrument(span.clone()).await;

        let elapsed = start.elapsed().as_secs_f64();
        let _entered = span.enter();
        match &result {
            Ok(outcome) => {
                metrics::record_step(step, outcome.as_str(), elapsed);
                info!(outcome = outcome.as_str(), "Rotation step {} finished", request.step);
            }
            Err(e) => {
                metrics::record_step_error(step, e.kind(), elapsed);
                error!(
                    kind = e.kind(),
                    retriable = e.is_retriable(),
                    "Rotation step {} failed: {}",
                    request.step,
                    e
                );
            }
        }
        result
    }

    async fn run_step(&self, request: &RotationRequest) -> Result<StepOutcome> {
        if !request.step.is_known() {
            warn!("Ignoring unknown rotation step: {}", request.step);
            return Ok(StepOutcome::Ignored);
        }
        self.check_request(request)?;

        let secret_id = request.secret_id.as_str();
        let token = request.request_token.as_str();

        // finishSecret tidies up after itself when the token is already CURRENT
        if request.step != RotationStep::Finish {
            let labels = self.store.list_version_labels(secret_id).await?;
            if labels.has_label(token, StagingLabel::Current) {
                info!("Version {} already holds CURRENT, nothing to do", token);
                return Ok(StepOutcome::AlreadyCurrent);
            }
        }

        match &request.step {
            RotationStep::Create => self.create_secret(secret_id, token).await,
            RotationStep::Set => self.set_secret(secret_id, token).await,
            RotationStep::Test => self.test_secret(secret_id, token).await,
            RotationStep::Finish => self.finish_secret(secret_id, token).await,
            RotationStep::Unknown(_) => Ok(StepOutcome::Ignored),
        }
    }

    fn check_request(&self, request: &RotationRequest) -> Result<()> {
        if request.request_token.trim().is_empty() {
            return Err(RotationError::precondition("request token must not be empty"));
        }
        if let Some(scoped) = &self.config.secret_id {
            if scoped != &request.secret_id {
                return Err(RotationError::precondition(format!(
                    "rotator is scoped to {scoped}, refusing request for {}",
                    request.secret_id
                )));
            }
        }
        Ok(())
    }

    /// The version stored under `token`, required to hold PENDING
    async fn pending_version(&self, secret_id: &str, token: &str) -> Result<SecretVersion> {
        let version = self
            .store
            .get_version(secret_id, token)
            .await?
            .ok_or_else(|| {
                RotationError::precondition(format!(
                    "no version {token} stored for {secret_id}; run createSecret first"
                ))
            })?;

        if !version.has_label(StagingLabel::Pending) {
            return Err(RotationError::precondition(format!(
                "version {token} of {secret_id} does not hold PENDING"
            )));
        }
        Ok(version)
    }

    /// Payload as it should be used for connecting, with endpoint overrides applied.
    /// Never written back to the store.
    fn connection_view(&self, payload: &CredentialPayload) -> CredentialPayload {
        let mut view = payload.clone();
        view.host = self.config.connect_host(&payload.host).to_string();
        view.port = self.config.connect_port(payload.port);
        view
    }

    /// Log in with the PENDING credential, failing with a validation error
    /// that names the version when the database refuses it
    async fn validate_pending(&self, secret_id: &str, pending: &SecretVersion) -> Result<()> {
        let credential = self.connection_view(&pending.payload);
        match self
            .target
            .authenticate(&credential, self.config.connect_timeout)
            .await
        {
            Ok(()) => Ok(()),
            Err(RotationError::Validation(reason)) => Err(RotationError::Validation(format!(
                "PENDING version {} of {secret_id} cannot log in as {}: {reason}",
                pending.token, pending.payload.username
            ))),
            Err(e) => Err(e),
        }
    }
}
