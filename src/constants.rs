//! # Constants
//!
//! Shared constants used throughout the rotator.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics, probes and the rotation trigger
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default timeout for connecting to the database being rotated (seconds)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default per-operation timeout for secret store calls (seconds)
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 10;

/// Default length of generated passwords
pub const DEFAULT_PASSWORD_LENGTH: u32 = 32;

/// Characters never placed in generated passwords.
/// They break connection strings or shell quoting in consumers.
pub const DEFAULT_PASSWORD_EXCLUDE_CHARACTERS: &str = "/@\"'\\";

/// How many times createSecret draws a password before giving up on
/// getting one that differs from the current password
pub const MAX_PASSWORD_GENERATION_ATTEMPTS: u32 = 3;

/// Default number of attempts per step in the rotation runner
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;

/// Default Fibonacci backoff starting value (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 1;

/// Default Fibonacci backoff maximum value (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 10;

/// MySQL error number for "Access denied for user"
pub const MYSQL_ACCESS_DENIED: u16 = 1045;

/// MySQL error number for "Access denied; you need ... privilege"
pub const MYSQL_PRIVILEGE_DENIED: u16 = 1227;

/// SQLSTATE class for invalid authorization
pub const SQLSTATE_INVALID_AUTHORIZATION: &str = "28000";
