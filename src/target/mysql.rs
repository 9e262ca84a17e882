//! # MySQL Target
//!
//! [`CredentialTarget`] for MySQL-compatible servers using `sqlx`.
//!
//! The password change is scoped to the connected account
//! (`ALTER USER CURRENT_USER()`), so the rotating user needs no administrative
//! privilege over other accounts.

use super::CredentialTarget;
use crate::constants::{MYSQL_ACCESS_DENIED, MYSQL_PRIVILEGE_DENIED, SQLSTATE_INVALID_AUTHORIZATION};
use crate::error::{Result, RotationError};
use crate::model::CredentialPayload;
use crate::observability::metrics;
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlDatabaseError};
use sqlx::Connection;
use std::time::{Duration, Instant};
use tracing::{debug, debug_span, info, Instrument, Span};
use zeroize::Zeroize;

const RESOURCE: &str = "mysql";

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlTarget;

impl MySqlTarget {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Quote a value as a MySQL string literal.
///
/// Only quotes are escaped, by doubling, which reads the same with or without
/// `NO_BACKSLASH_ESCAPES`. Values holding a backslash or NUL are refused since
/// their meaning depends on that server mode.
fn quote_literal(value: &str) -> Result<String> {
    if value.contains(['\\', '\0']) {
        return Err(RotationError::precondition(
            "password contains a backslash or NUL, which MySQL reads differently under NO_BACKSLASH_ESCAPES",
        ));
    }
    Ok(format!("'{}'", value.replace('\'', "''")))
}

/// Map a driver error onto the rotation error taxonomy
fn classify(err: &sqlx::Error) -> RotationError {
    match err {
        sqlx::Error::Database(db) => {
            let number = db
                .try_downcast_ref::<MySqlDatabaseError>()
                .map(MySqlDatabaseError::number);
            classify_database(number, db.code().as_deref(), db.message())
        }
        sqlx::Error::Configuration(e) => {
            RotationError::precondition(format!("invalid connection settings: {e}"))
        }
        other => RotationError::unavailable(RESOURCE, other.to_string()),
    }
}

/// Classify a server error by MySQL error number and SQLSTATE
fn classify_database(number: Option<u16>, sqlstate: Option<&str>, message: &str) -> RotationError {
    if number == Some(MYSQL_ACCESS_DENIED) || sqlstate == Some(SQLSTATE_INVALID_AUTHORIZATION) {
        RotationError::Validation(message.to_string())
    } else if number == Some(MYSQL_PRIVILEGE_DENIED) {
        RotationError::precondition(format!("account may not change its own password: {message}"))
    } else {
        RotationError::unavailable(RESOURCE, message.to_string())
    }
}

fn timed_out(credential: &CredentialPayload, what: &str, timeout: Duration) -> RotationError {
    RotationError::unavailable(
        RESOURCE,
        format!(
            "{what} against {}:{} timed out after {}s",
            credential.host,
            credential.port,
            timeout.as_secs_f64()
        ),
    )
}

async fn connect(credential: &CredentialPayload, timeout: Duration) -> Result<MySqlConnection> {
    let mut options = MySqlConnectOptions::new()
        .host(&credential.host)
        .port(credential.port)
        .username(&credential.username)
        .password(&credential.password);
    if let Some(dbname) = credential.dbname() {
        options = options.database(dbname);
    }

    match tokio::time::timeout(timeout, MySqlConnection::connect_with(&options)).await {
        Ok(Ok(connection)) => Ok(connection),
        Ok(Err(e)) => Err(classify(&e)),
        Err(_elapsed) => Err(timed_out(credential, "connect", timeout)),
    }
}

fn record_span(start: Instant, success: bool) {
    let span = Span::current();
    span.record(
        "operation.duration_ms",
        u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    );
    span.record("operation.success", success);
}

async fn close(connection: MySqlConnection) {
    if let Err(e) = connection.close().await {
        debug!("Ignoring error while closing MySQL connection: {}", e);
    }
}

#[async_trait]
impl CredentialTarget for MySqlTarget {
    async fn authenticate(&self, credential: &CredentialPayload, timeout: Duration) -> Result<()> {
        let span = debug_span!(
            "mysql.authenticate",
            db.host = %credential.host,
            db.port = credential.port,
            db.user = %credential.username,
            operation.success = tracing::field::Empty,
            operation.duration_ms = tracing::field::Empty
        );
        async move {
            let start = Instant::now();
            let result = connect(credential, timeout).await;
            let outcome = match &result {
                Ok(_) => "ok",
                Err(RotationError::Validation(_)) => "rejected",
                Err(_) => "error",
            };
            record_span(start, result.is_ok());
            metrics::record_target_operation("authenticate", outcome);

            close(result?).await;
            debug!("Authenticated as {}", credential.username);
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn apply_new_password(
        &self,
        login: &CredentialPayload,
        new_password: &str,
        timeout: Duration,
    ) -> Result<()> {
        let span = debug_span!(
            "mysql.apply_new_password",
            db.host = %login.host,
            db.port = login.port,
            db.user = %login.username,
            operation.success = tracing::field::Empty,
            operation.duration_ms = tracing::field::Empty
        );
        async move {
            let start = Instant::now();
            let mut literal = match quote_literal(new_password) {
                Ok(literal) => literal,
                Err(e) => {
                    record_span(start, false);
                    metrics::record_target_operation("apply_new_password", "error");
                    return Err(e);
                }
            };
            let mut connection = match connect(login, timeout).await {
                Ok(connection) => connection,
                Err(e) => {
                    record_span(start, false);
                    metrics::record_target_operation("apply_new_password", "error");
                    return Err(e);
                }
            };

            let mut statement = format!("ALTER USER CURRENT_USER() IDENTIFIED BY {literal}");
            let executed = tokio::time::timeout(
                timeout,
                sqlx::Executor::execute(&mut connection, sqlx::raw_sql(&statement)),
            )
            .await;
            statement.zeroize();
            literal.zeroize();
            close(connection).await;

            let result = match executed {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(classify(&e)),
                Err(_elapsed) => Err(timed_out(login, "password change", timeout)),
            };
            record_span(start, result.is_ok());
            metrics::record_target_operation(
                "apply_new_password",
                if result.is_ok() { "ok" } else { "error" },
            );
            if result.is_ok() {
                info!("Password changed for {}", login.username);
            }
            result
        }
        .instrument(span)
        .await
    }
}
