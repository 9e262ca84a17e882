//! # In-Memory Secret Store
//!
//! Process-local [`SecretStore`] with the same label semantics as Secrets
//! Manager. Labels are kept as a `label -> token` map, so a label can never be
//! held by two versions.

use super::SecretStore;
use crate::config::PasswordPolicy;
use crate::error::{Result, RotationError};
use crate::model::{CredentialPayload, SecretVersion, StagingLabel, VersionLabels};
use crate::password;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default, Clone)]
struct SecretRecord {
    versions: BTreeMap<String, CredentialPayload>,
    labels: BTreeMap<StagingLabel, String>,
}

impl SecretRecord {
    fn labels_of(&self, token: &str) -> Vec<StagingLabel> {
        self.labels
            .iter()
            .filter(|(_, holder)| holder.as_str() == token)
            .map(|(label, _)| *label)
            .collect()
    }

    fn version(&self, token: &str) -> Option<SecretVersion> {
        self.versions.get(token).map(|payload| SecretVersion {
            token: token.to_string(),
            payload: payload.clone(),
            labels: self.labels_of(token),
        })
    }
}

#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: Mutex<HashMap<String, SecretRecord>>,
}

impl InMemorySecretStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with one secret whose only version holds CURRENT
    #[must_use]
    pub fn with_current(secret_id: &str, token: &str, payload: CredentialPayload) -> Self {
        let store = Self::new();
        store.insert_version(secret_id, token, payload, &[StagingLabel::Current]);
        store
    }

    /// Write a version directly, bypassing immutability checks.
    /// Each label given is taken away from its previous holder.
    pub fn insert_version(
        &self,
        secret_id: &str,
        token: &str,
        payload: CredentialPayload,
        labels: &[StagingLabel],
    ) {
        let mut secrets = self.lock();
        let record = secrets.entry(secret_id.to_string()).or_default();
        record.versions.insert(token.to_string(), payload);
        for label in labels {
            record.labels.insert(*label, token.to_string());
        }
    }

    /// Number of stored versions of a secret
    #[must_use]
    pub fn version_count(&self, secret_id: &str) -> usize {
        self.lock()
            .get(secret_id)
            .map_or(0, |record| record.versions.len())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SecretRecord>> {
        self.secrets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn not_found(secret_id: &str) -> RotationError {
    RotationError::precondition(format!("secret {secret_id} does not exist"))
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get_current_version(&self, secret_id: &str) -> Result<SecretVersion> {
        let secrets = self.lock();
        let record = secrets.get(secret_id).ok_or_else(|| not_found(secret_id))?;
        record
            .labels
            .get(&StagingLabel::Current)
            .and_then(|token| record.version(token))
            .ok_or_else(|| {
                RotationError::precondition(format!("secret {secret_id} has no CURRENT version"))
            })
    }

    async fn get_version(&self, secret_id: &str, token: &str) -> Result<Option<SecretVersion>> {
        let secrets = self.lock();
        let record = secrets.get(secret_id).ok_or_else(|| not_found(secret_id))?;
        Ok(record.version(token))
    }

    async fn put_version(
        &self,
        secret_id: &str,
        token: &str,
        payload: &CredentialPayload,
        label: StagingLabel,
    ) -> Result<()> {
        let mut secrets = self.lock();
        let record = secrets
            .get_mut(secret_id)
            .ok_or_else(|| not_found(secret_id))?;

        if label == StagingLabel::Pending {
            if let Some(holder) = record.labels.get(&StagingLabel::Pending) {
                let stale = record.labels.get(&StagingLabel::Current) == Some(holder);
                if holder != token && !stale {
                    return Err(RotationError::Conflict {
                        pending: holder.clone(),
                        requested: token.to_string(),
                    });
                }
            }
        }

        match record.versions.get(token) {
            Some(existing) if existing != payload => {
                return Err(RotationError::precondition(format!(
                    "version {token} of {secret_id} already exists with different content"
                )));
            }
            Some(_) => {}
            None => {
                record.versions.insert(token.to_string(), payload.clone());
            }
        }
        record.labels.insert(label, token.to_string());
        Ok(())
    }

    async fn list_version_labels(&self, secret_id: &str) -> Result<VersionLabels> {
        let secrets = self.lock();
        let record = secrets.get(secret_id).ok_or_else(|| not_found(secret_id))?;
        Ok(record
            .versions
            .keys()
            .map(|token| (token.clone(), record.labels_of(token)))
            .collect())
    }

    async fn move_label(
        &self,
        secret_id: &str,
        label: StagingLabel,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<()> {
        let mut secrets = self.lock();
        let record = secrets
            .get_mut(secret_id)
            .ok_or_else(|| not_found(secret_id))?;

        if let Some(from) = from {
            if record.labels.get(&label).map(String::as_str) != Some(from) {
                return Err(RotationError::precondition(format!(
                    "version {from} of {secret_id} does not hold {label}"
                )));
            }
        }

        match to {
            Some(to) => {
                if !record.versions.contains_key(to) {
                    return Err(RotationError::precondition(format!(
                        "version {to} of {secret_id} does not exist"
                    )));
                }
                record.labels.insert(label, to.to_string());
            }
            None => {
                record.labels.remove(&label);
            }
        }
        Ok(())
    }

    async fn generate_password(&self, policy: &PasswordPolicy) -> Result<String> {
        password::generate(policy)
    }
}
