//! # Rotation Runner
//!
//! Drives one rotation through all four steps in order with the same token.
//!
//! A step that fails with a retriable error is re-invoked with the same
//! token after a Fibonacci backoff. Any other failure stops the rotation;
//! the token must not be reused by a fresh createSecret until the cause is
//! fixed.

use crate::config::RetryPolicy;
use crate::controller::RotationController;
use crate::error::RotationError;
use crate::model::{RotationRequest, RotationStep, StepOutcome};
use crate::store::SecretStore;
use crate::target::CredentialTarget;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};

pub mod backoff;

use backoff::FibonacciBackoff;

/// Result of one step within a rotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: RotationStep,
    pub outcome: StepOutcome,
    pub attempts: u32,
}

/// Summary of a finished rotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationReport {
    pub secret_id: String,
    pub token: String,
    pub steps: Vec<StepReport>,
}

/// A step that failed for good
#[derive(Debug, Error)]
#[error("{step} failed after {attempts} attempt(s): {source}")]
pub struct StepFailure {
    pub step: RotationStep,
    pub attempts: u32,
    #[source]
    pub source: RotationError,
    /// Steps that completed before the failure
    pub completed: Vec<StepReport>,
}

#[derive(Debug)]
pub struct RotationRunner<'a, S, T> {
    controller: &'a RotationController<S, T>,
    retry: RetryPolicy,
}

impl<'a, S: SecretStore, T: CredentialTarget> RotationRunner<'a, S, T> {
    /// Runner using the controller's configured retry policy
    pub fn new(controller: &'a RotationController<S, T>) -> Self {
        let retry = controller.config().retry.clone();
        Self { controller, retry }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run createSecret, setSecret, testSecret and finishSecret for `token`
    pub async fn run(&self, secret_id: &str, token: &str) -> Result<RotationReport, StepFailure> {
        let span = info_span!("rotation.run", secret.id = secret_id, rotation.token = token);
        async move {
            let mut completed = Vec::with_capacity(RotationStep::SEQUENCE.len());
            for step in RotationStep::SEQUENCE {
                let request = RotationRequest::new(secret_id, token, step.clone());
                match self.run_step(&request).await {
                    Ok(report) => completed.push(report),
                    Err((attempts, source)) => {
                        return Err(StepFailure {
                            step,
                            attempts,
                            source,
                            completed,
                        })
                    }
                }
            }
            info!("Rotation of {} with token {} complete", secret_id, token);
            Ok(RotationReport {
                secret_id: secret_id.to_string(),
                token: token.to_string(),
                steps: completed,
            })
        }
        .instrument(span)
        .await
    }

    /// Dispatch one step, retrying retriable failures
    pub async fn run_step(&self, request: &RotationRequest) -> Result<StepReport, (u32, RotationError)> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut backoff =
            FibonacciBackoff::new(self.retry.backoff_min_secs, self.retry.backoff_max_secs);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.controller.dispatch(request).await {
                Ok(outcome) => {
                    return Ok(StepReport {
                        step: request.step.clone(),
                        outcome,
                        attempts: attempt,
                    })
                }
                Err(e) if e.is_retriable() && attempt < max_attempts => {
                    let delay = backoff.next_backoff();
                    warn!(
                        "{} attempt {}/{} failed, retrying in {}s: {}",
                        request.step,
                        attempt,
                        max_attempts,
                        delay.as_secs(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err((attempt, e)),
            }
        }
    }
}
