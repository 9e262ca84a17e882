//! # Secret Stores
//!
//! Versioned credential storage with staging labels.
//!
//! Implementations:
//! - [`aws::AwsSecretStore`] - AWS Secrets Manager
//! - [`memory::InMemorySecretStore`] - process-local store for tests and embedding

use crate::config::PasswordPolicy;
use crate::error::Result;
use crate::model::{CredentialPayload, SecretVersion, StagingLabel, VersionLabels};
use async_trait::async_trait;

pub mod aws;
pub mod memory;

pub use aws::AwsSecretStore;
pub use memory::InMemorySecretStore;

/// Store trait for versioned credential secrets
///
/// Label semantics follow Secrets Manager: assigning a label to a version
/// takes it away from whichever version held it before, so a label is never
/// held by two versions at once.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Version holding CURRENT.
    /// Fails with a precondition error when no version holds it.
    async fn get_current_version(&self, secret_id: &str) -> Result<SecretVersion>;

    /// Version identified by `token`, or `None` when it has no stored value
    async fn get_version(&self, secret_id: &str, token: &str) -> Result<Option<SecretVersion>>;

    /// Whether a value has been stored under `token`
    async fn exists(&self, secret_id: &str, token: &str) -> Result<bool> {
        Ok(self.get_version(secret_id, token).await?.is_some())
    }

    /// Store a new immutable version and attach `label` to it.
    /// Re-putting identical content under the same token is a no-op.
    ///
    /// Attaching PENDING fails with [`RotationError::Conflict`] when another
    /// version holds it, unless that version is also CURRENT (a stale
    /// leftover that may be taken over).
    ///
    /// [`RotationError::Conflict`]: crate::error::RotationError::Conflict
    async fn put_version(
        &self,
        secret_id: &str,
        token: &str,
        payload: &CredentialPayload,
        label: StagingLabel,
    ) -> Result<()>;

    /// Every known version and the labels it holds
    async fn list_version_labels(&self, secret_id: &str) -> Result<VersionLabels>;

    /// Move `label` from `from` to `to`.
    ///
    /// `from` must hold the label when given. A `to` of `None` only removes it.
    async fn move_label(
        &self,
        secret_id: &str,
        label: StagingLabel,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<()>;

    /// Draw a fresh random password
    async fn generate_password(&self, policy: &PasswordPolicy) -> Result<String>;
}
