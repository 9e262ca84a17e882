//! # Rotation Configuration
//!
//! Settings loaded from environment variables.

use crate::constants::{
    DEFAULT_BACKOFF_MAX_SECS, DEFAULT_BACKOFF_MIN_SECS, DEFAULT_CONNECT_TIMEOUT_SECS,
    DEFAULT_METRICS_PORT, DEFAULT_PASSWORD_EXCLUDE_CHARACTERS, DEFAULT_PASSWORD_LENGTH,
    DEFAULT_RETRY_MAX_ATTEMPTS, DEFAULT_STORE_TIMEOUT_SECS,
};
use std::time::Duration;

/// Rotator configuration
///
/// All settings have defaults and can be overridden via environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationConfig {
    /// Secret this rotator is scoped to. Requests for any other secret are refused.
    pub secret_id: Option<String>,
    /// Database endpoint used for connections instead of the payload's `host`
    pub target_endpoint: Option<String>,
    /// Database port used for connections instead of the payload's `port`
    pub target_port: Option<u16>,
    /// Bound on each connection attempt against the database
    pub connect_timeout: Duration,
    /// Bound on each secret store operation
    pub store_timeout: Duration,
    /// AWS region; the SDK default chain is used when unset
    pub region: Option<String>,
    /// Alternate Secrets Manager endpoint (LocalStack, VPC endpoints)
    pub store_endpoint_url: Option<String>,
    pub password: PasswordPolicy,
    pub retry: RetryPolicy,
    /// Log level used when RUST_LOG is unset (error, warn, info, debug, trace)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    pub metrics_port: u16,
}

/// Shape of generated passwords
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub length: u32,
    pub exclude_characters: String,
}

impl PasswordPolicy {
    /// Characters generated passwords must avoid.
    /// Always includes the backslash, which MySQL literals cannot carry
    /// portably.
    #[must_use]
    pub fn excluded_characters(&self) -> String {
        let mut excluded = self.exclude_characters.clone();
        if !excluded.contains('\\') {
            excluded.push('\\');
        }
        excluded
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            length: DEFAULT_PASSWORD_LENGTH,
            exclude_characters: DEFAULT_PASSWORD_EXCLUDE_CHARACTERS.to_string(),
        }
    }
}

/// Retry behaviour of the rotation runner for retriable failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per step, including the first one
    pub max_attempts: u32,
    pub backoff_min_secs: u64,
    pub backoff_max_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
        }
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            secret_id: None,
            target_endpoint: None,
            target_port: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            store_timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
            region: None,
            store_endpoint_url: None,
            password: PasswordPolicy::default(),
            retry: RetryPolicy::default(),
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

impl RotationConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            secret_id: non_empty(lookup("ROTATION_SECRET_ID")),
            target_endpoint: non_empty(lookup("ROTATION_TARGET_ENDPOINT")),
            target_port: lookup("ROTATION_TARGET_PORT").and_then(|v| v.trim().parse().ok()),
            connect_timeout: Duration::from_secs(var_or_default(
                &lookup,
                "ROTATION_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )),
            store_timeout: Duration::from_secs(var_or_default(
                &lookup,
                "ROTATION_STORE_TIMEOUT_SECS",
                DEFAULT_STORE_TIMEOUT_SECS,
            )),
            region: non_empty(lookup("AWS_REGION")),
            store_endpoint_url: non_empty(lookup("SECRETS_MANAGER_ENDPOINT")),
            password: PasswordPolicy {
                length: var_or_default(&lookup, "ROTATION_PASSWORD_LENGTH", DEFAULT_PASSWORD_LENGTH),
                exclude_characters: lookup("ROTATION_PASSWORD_EXCLUDE_CHARACTERS")
                    .unwrap_or(defaults.password.exclude_characters),
            },
            retry: RetryPolicy {
                max_attempts: var_or_default(
                    &lookup,
                    "ROTATION_RETRY_MAX_ATTEMPTS",
                    DEFAULT_RETRY_MAX_ATTEMPTS,
                )
                .max(1),
                backoff_min_secs: var_or_default(
                    &lookup,
                    "ROTATION_BACKOFF_MIN_SECS",
                    DEFAULT_BACKOFF_MIN_SECS,
                ),
                backoff_max_secs: var_or_default(
                    &lookup,
                    "ROTATION_BACKOFF_MAX_SECS",
                    DEFAULT_BACKOFF_MAX_SECS,
                ),
            },
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT").unwrap_or(defaults.log_format),
            metrics_port: var_or_default(&lookup, "METRICS_PORT", DEFAULT_METRICS_PORT),
        }
    }

    /// Host to connect to for a payload, honouring the endpoint override
    #[must_use]
    pub fn connect_host<'a>(&'a self, payload_host: &'a str) -> &'a str {
        self.target_endpoint.as_deref().unwrap_or(payload_host)
    }

    /// Port to connect to for a payload, honouring the port override
    #[must_use]
    pub fn connect_port(&self, payload_port: u16) -> u16 {
        self.target_port.unwrap_or(payload_port)
    }
}

/// Read a variable and parse it, falling back to `default` when unset or invalid
fn var_or_default<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
