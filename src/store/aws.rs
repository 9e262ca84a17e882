//! # AWS Secrets Manager Store
//!
//! [`SecretStore`] backed by AWS Secrets Manager.
//!
//! Staging labels map onto the Secrets Manager stages `AWSCURRENT`,
//! `AWSPENDING` and `AWSPREVIOUS`. Version ids are the rotation request
//! tokens, passed as `ClientRequestToken` when a version is written.

use super::SecretStore;
use crate::config::{PasswordPolicy, RotationConfig};
use crate::error::{Result, RotationError};
use crate::model::{CredentialPayload, SecretVersion, StagingLabel, VersionLabels};
use crate::observability::metrics;
use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_secretsmanager::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use std::future::Future;
use std::time::Instant;
use tracing::{debug, debug_span, info, warn, Instrument, Span};

const RESOURCE: &str = "secrets-manager";

/// Error codes caused by the request itself rather than by the service.
/// Retrying these with the same input cannot succeed.
const CLIENT_FAULT_CODES: &[&str] = &[
    "InvalidRequestException",
    "InvalidParameterException",
    "ResourceNotFoundException",
    "ResourceExistsException",
    "MalformedPolicyDocumentException",
    "DecryptionFailure",
];

/// Secrets Manager stage name for a label
#[must_use]
pub fn stage_name(label: StagingLabel) -> &'static str {
    match label {
        StagingLabel::Current => "AWSCURRENT",
        StagingLabel::Pending => "AWSPENDING",
        StagingLabel::Previous => "AWSPREVIOUS",
    }
}

/// Label for a Secrets Manager stage name; custom stages map to `None`
#[must_use]
pub fn label_from_stage(stage: &str) -> Option<StagingLabel> {
    match stage {
        "AWSCURRENT" => Some(StagingLabel::Current),
        "AWSPENDING" => Some(StagingLabel::Pending),
        "AWSPREVIOUS" => Some(StagingLabel::Previous),
        _ => None,
    }
}

fn labels_from_stages(stages: &[String]) -> Vec<StagingLabel> {
    stages.iter().filter_map(|s| label_from_stage(s)).collect()
}

/// Map an SDK failure onto the rotation error taxonomy
fn classify<E, R>(operation: &str, err: &SdkError<E, R>) -> RotationError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = format!("{operation} failed: {}", DisplayErrorContext(err));
    let client_fault = matches!(err, SdkError::ServiceError(_))
        && err
            .code()
            .is_some_and(|code| CLIENT_FAULT_CODES.contains(&code));

    if client_fault {
        RotationError::Precondition(message)
    } else {
        RotationError::unavailable(RESOURCE, message)
    }
}

fn is_not_found<E, R>(err: &SdkError<E, R>) -> bool
where
    E: ProvideErrorMetadata,
{
    matches!(err, SdkError::ServiceError(_)) && err.code() == Some("ResourceNotFoundException")
}

fn parse_payload(secret_id: &str, token: &str, secret_string: Option<&str>) -> Result<CredentialPayload> {
    let raw = secret_string.ok_or_else(|| {
        RotationError::precondition(format!(
            "version {token} of {secret_id} has no string value"
        ))
    })?;
    serde_json::from_str(raw).map_err(|e| {
        RotationError::precondition(format!(
            "version {token} of {secret_id} is not a credential document: {e}"
        ))
    })
}

/// Conflict when PENDING sits on a version other than `token`.
/// PENDING left on the CURRENT version does not count.
fn pending_conflict(labels: &VersionLabels, token: &str) -> Option<RotationError> {
    let holder = labels.holder(StagingLabel::Pending)?;
    if holder == token || labels.has_label(holder, StagingLabel::Current) {
        return None;
    }
    Some(RotationError::Conflict {
        pending: holder.to_string(),
        requested: token.to_string(),
    })
}

/// Record duration and failures of one store call on the current span and in metrics
async fn timed<T, F>(operation: &'static str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let result = call.await;
    let elapsed = start.elapsed();

    let span = Span::current();
    span.record(
        "operation.duration_ms",
        u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
    );
    span.record("operation.success", result.is_ok());
    metrics::record_store_operation(operation, elapsed.as_secs_f64());
    if let Err(e) = &result {
        metrics::increment_store_operation_errors(operation);
        warn!(operation, error = %e, "Secrets Manager call failed");
    }
    result
}

/// AWS Secrets Manager store implementation
pub struct AwsSecretStore {
    client: SecretsManagerClient,
}

impl std::fmt::Debug for AwsSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsSecretStore").finish_non_exhaustive()
    }
}

impl AwsSecretStore {
    /// Create a client from the default credential chain.
    ///
    /// Connect and per-operation timeouts come from `config`, so a hung
    /// Secrets Manager call fails the step instead of stalling it.
    pub async fn new(config: &RotationConfig) -> Self {
        let timeouts = TimeoutConfig::builder()
            .connect_timeout(config.connect_timeout)
            .operation_timeout(config.store_timeout)
            .build();

        let mut loader =
            aws_config::defaults(aws_config::BehaviorVersion::latest()).timeout_config(timeouts);
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.store_endpoint_url {
            info!("Using Secrets Manager endpoint override: {}", endpoint);
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        Self::from_client(SecretsManagerClient::new(&sdk_config))
    }

    #[must_use]
    pub fn from_client(client: SecretsManagerClient) -> Self {
        Self { client }
    }

    async fn describe(&self, secret_id: &str) -> Result<VersionLabels> {
        let response = self
            .client
            .describe_secret()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|e| classify("DescribeSecret", &e))?;

        Ok(response
            .version_ids_to_stages()
            .map(|versions| {
                versions
                    .iter()
                    .map(|(token, stages)| (token.clone(), labels_from_stages(stages)))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl SecretStore for AwsSecretStore {
    async fn get_current_version(&self, secret_id: &str) -> Result<SecretVersion> {
        let span = debug_span!(
            "aws.secret.get_current",
            secret.id = secret_id,
            operation.success = tracing::field::Empty,
            operation.duration_ms = tracing::field::Empty
        );
        timed("get_current", async move {
            let response = self
                .client
                .get_secret_value()
                .secret_id(secret_id)
                .version_stage(stage_name(StagingLabel::Current))
                .send()
                .await
                .map_err(|e| {
                    if is_not_found(&e) {
                        RotationError::precondition(format!(
                            "secret {secret_id} has no CURRENT version"
                        ))
                    } else {
                        classify("GetSecretValue", &e)
                    }
                })?;

            let token = response.version_id().ok_or_else(|| {
                RotationError::precondition(format!(
                    "CURRENT version of {secret_id} has no version id"
                ))
            })?;
            Ok(SecretVersion {
                token: token.to_string(),
                payload: parse_payload(secret_id, token, response.secret_string())?,
                labels: labels_from_stages(response.version_stages()),
            })
        })
        .instrument(span)
        .await
    }

    async fn get_version(&self, secret_id: &str, token: &str) -> Result<Option<SecretVersion>> {
        let span = debug_span!(
            "aws.secret.get_version",
            secret.id = secret_id,
            version.id = token,
            operation.success = tracing::field::Empty,
            operation.duration_ms = tracing::field::Empty
        );
        timed("get_version", async move {
            match self
                .client
                .get_secret_value()
                .secret_id(secret_id)
                .version_id(token)
                .send()
                .await
            {
                Ok(response) => Ok(Some(SecretVersion {
                    token: token.to_string(),
                    payload: parse_payload(secret_id, token, response.secret_string())?,
                    labels: labels_from_stages(response.version_stages()),
                })),
                Err(e) if is_not_found(&e) => {
                    debug!("Version {} of {} has no stored value", token, secret_id);
                    Ok(None)
                }
                Err(e) => Err(classify("GetSecretValue", &e)),
            }
        })
        .instrument(span)
        .await
    }

    async fn exists(&self, secret_id: &str, token: &str) -> Result<bool> {
        let span = debug_span!(
            "aws.secret.exists",
            secret.id = secret_id,
            version.id = token,
            operation.success = tracing::field::Empty,
            operation.duration_ms = tracing::field::Empty
        );
        timed("exists", async move {
            match self
                .client
                .get_secret_value()
                .secret_id(secret_id)
                .version_id(token)
                .send()
                .await
            {
                Ok(_) => Ok(true),
                Err(e) if is_not_found(&e) => Ok(false),
                Err(e) => Err(classify("GetSecretValue", &e)),
            }
        })
        .instrument(span)
        .await
    }

    async fn put_version(
        &self,
        secret_id: &str,
        token: &str,
        payload: &CredentialPayload,
        label: StagingLabel,
    ) -> Result<()> {
        let span = debug_span!(
            "aws.secret.put_version",
            secret.id = secret_id,
            version.id = token,
            version.stage = stage_name(label),
            operation.success = tracing::field::Empty,
            operation.duration_ms = tracing::field::Empty
        );
        timed("put_version", async move {
            let document = serde_json::to_string(payload).map_err(|e| {
                RotationError::precondition(format!("cannot serialise credential document: {e}"))
            })?;

            if label == StagingLabel::Pending {
                let before = self.describe(secret_id).await?;
                if let Some(conflict) = pending_conflict(&before, token) {
                    return Err(conflict);
                }
            }

            self.client
                .put_secret_value()
                .secret_id(secret_id)
                .client_request_token(token)
                .secret_string(document)
                .version_stages(stage_name(label))
                .send()
                .await
                .map_err(|e| classify("PutSecretValue", &e))?;

            // PutSecretValue takes AWSPENDING from whoever held it, so a
            // concurrent writer only shows up when reading the stages back
            if label == StagingLabel::Pending {
                let after = self.describe(secret_id).await?;
                if let Some(conflict) = pending_conflict(&after, token) {
                    return Err(conflict);
                }
            }
            Ok(())
        })
        .instrument(span)
        .await
    }

    async fn list_version_labels(&self, secret_id: &str) -> Result<VersionLabels> {
        let span = debug_span!(
            "aws.secret.describe",
            secret.id = secret_id,
            operation.success = tracing::field::Empty,
            operation.duration_ms = tracing::field::Empty
        );
        timed("describe", self.describe(secret_id))
            .instrument(span)
            .await
    }

    async fn move_label(
        &self,
        secret_id: &str,
        label: StagingLabel,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<()> {
        if from.is_none() && to.is_none() {
            return Ok(());
        }

        let span = debug_span!(
            "aws.secret.move_label",
            secret.id = secret_id,
            version.stage = stage_name(label),
            from = from.unwrap_or("-"),
            to = to.unwrap_or("-"),
            operation.success = tracing::field::Empty,
            operation.duration_ms = tracing::field::Empty
        );
        timed("move_label", async move {
            self.client
                .update_secret_version_stage()
                .secret_id(secret_id)
                .version_stage(stage_name(label))
                .set_remove_from_version_id(from.map(ToString::to_string))
                .set_move_to_version_id(to.map(ToString::to_string))
                .send()
                .await
                .map_err(|e| classify("UpdateSecretVersionStage", &e))?;
            Ok(())
        })
        .instrument(span)
        .await
    }

    async fn generate_password(&self, policy: &PasswordPolicy) -> Result<String> {
        let span = debug_span!(
            "aws.secret.generate_password",
            password.length = policy.length,
            operation.success = tracing::field::Empty,
            operation.duration_ms = tracing::field::Empty
        );
        timed("generate_password", async move {
            let response = self
                .client
                .get_random_password()
                .password_length(i64::from(policy.length))
                .exclude_characters(policy.excluded_characters())
                .send()
                .await
                .map_err(|e| classify("GetRandomPassword", &e))?;
            response
                .random_password()
                .map(ToString::to_string)
                .ok_or_else(|| {
                    RotationError::unavailable(RESOURCE, "GetRandomPassword returned no password")
                })
        })
        .instrument(span)
        .await
    }
}
