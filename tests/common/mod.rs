//! Common test utilities for rotation integration tests
//!
//! Provides a scripted in-memory database target and a seeded store matching
//! the usual scenario: secret `db-cred`, version `v1` CURRENT with user `app`
//! and password `old`. [`ScriptedStore`] wraps the in-memory store to
//! interleave or break individual store calls.

#![allow(dead_code, reason = "Each test binary uses a different subset")]

use async_trait::async_trait;
use credential_rotator::config::PasswordPolicy;
use credential_rotator::store::{InMemorySecretStore, SecretStore};
use credential_rotator::target::CredentialTarget;
use credential_rotator::{
    CredentialPayload, RotationConfig, RotationController, RotationError, Result, SecretVersion,
    StagingLabel, VersionLabels,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use std::time::Duration;

static RUSTLS_INIT: Once = Once::new();

/// Install the ring crypto provider once per test binary
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("Failed to install rustls crypto provider");
    });
}

pub const SECRET_ID: &str = "db-cred";

/// Database double that knows one password per account
#[derive(Debug, Default)]
pub struct FakeDatabase {
    accounts: Mutex<HashMap<String, String>>,
    hosts_seen: Mutex<Vec<(String, u16)>>,
    outages: AtomicU32,
    auth_calls: AtomicU32,
    apply_calls: AtomicU32,
}

impl FakeDatabase {
    pub fn with_account(username: &str, password: &str) -> Self {
        let db = Self::default();
        db.set_password(username, password);
        db
    }

    pub fn set_password(&self, username: &str, password: &str) {
        self.accounts
            .lock()
            .unwrap()
            .insert(username.to_string(), password.to_string());
    }

    pub fn password_of(&self, username: &str) -> Option<String> {
        self.accounts.lock().unwrap().get(username).cloned()
    }

    /// Make the next `calls` calls fail as if the database were unreachable
    pub fn fail_next(&self, calls: u32) {
        self.outages.store(calls, Ordering::SeqCst);
    }

    pub fn auth_calls(&self) -> u32 {
        self.auth_calls.load(Ordering::SeqCst)
    }

    pub fn apply_calls(&self) -> u32 {
        self.apply_calls.load(Ordering::SeqCst)
    }

    pub fn hosts_seen(&self) -> Vec<(String, u16)> {
        self.hosts_seen.lock().unwrap().clone()
    }

    fn take_outage(&self) -> bool {
        self.outages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check_login(&self, credential: &CredentialPayload) -> Result<()> {
        self.hosts_seen
            .lock()
            .unwrap()
            .push((credential.host.clone(), credential.port));

        if self.take_outage() {
            return Err(RotationError::unavailable("fake-db", "connection reset"));
        }
        match self.accounts.lock().unwrap().get(&credential.username) {
            Some(password) if *password == credential.password => Ok(()),
            _ => Err(RotationError::Validation(format!(
                "Access denied for user '{}'",
                credential.username
            ))),
        }
    }
}

#[async_trait]
impl CredentialTarget for FakeDatabase {
    async fn authenticate(&self, credential: &CredentialPayload, _timeout: Duration) -> Result<()> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        self.check_login(credential)
    }

    async fn apply_new_password(
        &self,
        login: &CredentialPayload,
        new_password: &str,
        _timeout: Duration,
    ) -> Result<()> {
        self.check_login(login)?;
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        self.set_password(&login.username, new_password);
        Ok(())
    }
}

pub fn v1_payload() -> CredentialPayload {
    CredentialPayload::new("h", "app", "old", 3306)
}

pub fn seeded_store() -> InMemorySecretStore {
    InMemorySecretStore::with_current(SECRET_ID, "v1", v1_payload())
}

/// Config with retries that do not sleep
pub fn test_config() -> RotationConfig {
    let mut config = RotationConfig::default();
    config.retry.backoff_min_secs = 0;
    config.retry.backoff_max_secs = 0;
    config
}

pub type TestController = RotationController<InMemorySecretStore, FakeDatabase>;

/// Controller over the seeded store and a database that accepts `old` for `app`
pub fn controller() -> TestController {
    RotationController::new(
        seeded_store(),
        FakeDatabase::with_account("app", "old"),
        test_config(),
    )
}

/// In-memory store whose calls can be interleaved or made to fail
#[derive(Debug)]
pub struct ScriptedStore {
    inner: InMemorySecretStore,
    yield_after_list: AtomicBool,
    moves: AtomicUsize,
    fail_move_at: Mutex<Option<usize>>,
}

impl ScriptedStore {
    pub fn new(inner: InMemorySecretStore) -> Self {
        Self {
            inner,
            yield_after_list: AtomicBool::new(false),
            moves: AtomicUsize::new(0),
            fail_move_at: Mutex::new(None),
        }
    }

    /// Hand control back to the runtime after every label listing, so
    /// concurrent steps all read the labels before any of them writes
    pub fn yield_after_list(self) -> Self {
        self.yield_after_list.store(true, Ordering::SeqCst);
        self
    }

    /// Fail the `index`-th `move_label` call (counting from zero) as unreachable
    pub fn fail_move_at(&self, index: usize) {
        *self.fail_move_at.lock().unwrap() = Some(index);
    }

    pub fn inner(&self) -> &InMemorySecretStore {
        &self.inner
    }
}

#[async_trait]
impl SecretStore for ScriptedStore {
    async fn get_current_version(&self, secret_id: &str) -> Result<SecretVersion> {
        self.inner.get_current_version(secret_id).await
    }

    async fn get_version(&self, secret_id: &str, token: &str) -> Result<Option<SecretVersion>> {
        self.inner.get_version(secret_id, token).await
    }

    async fn put_version(
        &self,
        secret_id: &str,
        token: &str,
        payload: &CredentialPayload,
        label: StagingLabel,
    ) -> Result<()> {
        self.inner.put_version(secret_id, token, payload, label).await
    }

    async fn list_version_labels(&self, secret_id: &str) -> Result<VersionLabels> {
        let labels = self.inner.list_version_labels(secret_id).await?;
        if self.yield_after_list.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        Ok(labels)
    }

    async fn move_label(
        &self,
        secret_id: &str,
        label: StagingLabel,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<()> {
        let index = self.moves.fetch_add(1, Ordering::SeqCst);
        if *self.fail_move_at.lock().unwrap() == Some(index) {
            return Err(RotationError::unavailable("scripted-store", "connection reset"));
        }
        self.inner.move_label(secret_id, label, from, to).await
    }

    async fn generate_password(&self, policy: &PasswordPolicy) -> Result<String> {
        self.inner.generate_password(policy).await
    }
}
