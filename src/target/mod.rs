//! # Credential Targets
//!
//! The database whose credential is being rotated.
//!
//! Implementations:
//! - [`mysql::MySqlTarget`] - MySQL / Aurora MySQL / MariaDB

use crate::error::Result;
use crate::model::CredentialPayload;
use async_trait::async_trait;
use std::time::Duration;

pub mod mysql;

pub use mysql::MySqlTarget;

/// Target trait for the system that accepts the rotated credential
///
/// Errors must be classified: a rejected login is
/// [`RotationError::Validation`](crate::error::RotationError::Validation),
/// a network or service failure is
/// [`RotationError::TargetUnavailable`](crate::error::RotationError::TargetUnavailable).
#[async_trait]
pub trait CredentialTarget: Send + Sync {
    /// Open a connection with `credential` and close it again.
    /// No queries are run.
    async fn authenticate(&self, credential: &CredentialPayload, timeout: Duration) -> Result<()>;

    /// Log in with `login` and change that same account's password to
    /// `new_password`. Single-user scheme: the old password stops working.
    async fn apply_new_password(
        &self,
        login: &CredentialPayload,
        new_password: &str,
        timeout: Duration,
    ) -> Result<()>;
}
