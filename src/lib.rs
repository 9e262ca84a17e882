//! Credential Rotator Library
//!
//! Four-step rotation of a database credential held in a versioned secret
//! store with staging labels (CURRENT, PENDING, PREVIOUS).
//!
//! The [`controller::RotationController`] runs one step per invocation and keeps
//! no state of its own; the [`runner::RotationRunner`] drives all four steps
//! with retries for transient failures.

pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod model;
pub mod observability;
pub mod password;
pub mod runner;
pub mod server;
pub mod store;
pub mod target;

pub use config::RotationConfig;
pub use controller::RotationController;
pub use error::{Result, RotationError};
pub use model::{
    CredentialPayload, RotationRequest, RotationStep, SecretVersion, StagingLabel, StepOutcome,
    VersionLabels,
};
pub use runner::RotationRunner;
