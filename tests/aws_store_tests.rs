//! # Secrets Manager Store Tests
//!
//! Runs [`AwsSecretStore`] against a local mock of the Secrets Manager JSON
//! API. All operations are POST "/" with the operation named in the
//! `x-amz-target` header; the mock replays canned responses per operation and
//! records every request body it receives.

mod common;

use aws_sdk_secretsmanager::config::retry::RetryConfig;
use aws_sdk_secretsmanager::config::{BehaviorVersion, Credentials, Region};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use credential_rotator::store::{AwsSecretStore, SecretStore};
use credential_rotator::{CredentialPayload, RotationError, StagingLabel};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

const ARN: &str = "arn:aws:secretsmanager:us-east-1:123456789012:secret:db-cred-AbCdEf";

#[derive(Debug, Default)]
struct MockSecretsManager {
    responses: Mutex<HashMap<String, VecDeque<(StatusCode, Value)>>>,
    requests: Mutex<Vec<(String, Value)>>,
}

impl MockSecretsManager {
    fn respond(&self, operation: &str, status: StatusCode, body: Value) {
        self.responses
            .lock()
            .unwrap()
            .entry(operation.to_string())
            .or_default()
            .push_back((status, body));
    }

    fn not_found(&self, operation: &str) {
        self.respond(
            operation,
            StatusCode::BAD_REQUEST,
            json!({
                "__type": "ResourceNotFoundException",
                "message": "Secrets Manager can't find the specified secret value"
            }),
        );
    }

    /// Bodies received for `operation`, oldest first
    fn requests(&self, operation: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(op, _)| op == operation)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

async fn handle(
    State(mock): State<Arc<MockSecretsManager>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let operation = headers
        .get("x-amz-target")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("secretsmanager."))
        .unwrap_or_default()
        .to_string();
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    mock.requests.lock().unwrap().push((operation.clone(), body));

    let canned = mock
        .responses
        .lock()
        .unwrap()
        .get_mut(&operation)
        .and_then(VecDeque::pop_front);
    let (status, body) = canned.unwrap_or_else(|| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({
                "__type": "InternalServiceError",
                "message": format!("no canned response for {operation}")
            }),
        )
    });

    (
        status,
        [("content-type", "application/x-amz-json-1.1")],
        body.to_string(),
    )
        .into_response()
}

/// Start the mock and a store pointed at it
async fn mock_store() -> (Arc<MockSecretsManager>, AwsSecretStore) {
    common::init_rustls();

    let mock = Arc::new(MockSecretsManager::default());
    let app = Router::new()
        .route("/", post(handle))
        .with_state(Arc::clone(&mock));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = aws_sdk_secretsmanager::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(Credentials::new("test", "test", None, None, "test"))
        .endpoint_url(format!("http://{addr}"))
        .retry_config(RetryConfig::disabled())
        .build();
    let store = AwsSecretStore::from_client(aws_sdk_secretsmanager::Client::from_conf(config));
    (mock, store)
}

fn secret_value(token: &str, password: &str, stages: &[&str]) -> Value {
    json!({
        "ARN": ARN,
        "Name": "db-cred",
        "VersionId": token,
        "SecretString": json!({
            "host": "h",
            "username": "app",
            "password": password,
            "port": 3306
        }).to_string(),
        "VersionStages": stages,
        "CreatedDate": 1_700_000_000.0
    })
}

fn describe(versions: Value) -> Value {
    json!({ "ARN": ARN, "Name": "db-cred", "VersionIdsToStages": versions })
}

#[tokio::test]
async fn test_get_current_requests_current_stage() {
    let (mock, store) = mock_store().await;
    mock.respond(
        "GetSecretValue",
        StatusCode::OK,
        secret_value("v1", "old", &["AWSCURRENT"]),
    );

    let current = store.get_current_version("db-cred").await.unwrap();
    assert_eq!(current.token, "v1");
    assert_eq!(current.payload.password, "old");
    assert_eq!(current.labels, vec![StagingLabel::Current]);

    let requests = mock.requests("GetSecretValue");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["SecretId"], "db-cred");
    assert_eq!(requests[0]["VersionStage"], "AWSCURRENT");
}

#[tokio::test]
async fn test_missing_version_is_none() {
    let (mock, store) = mock_store().await;
    mock.not_found("GetSecretValue");
    mock.not_found("GetSecretValue");

    assert!(store.get_version("db-cred", "t2").await.unwrap().is_none());
    assert!(!store.exists("db-cred", "t2").await.unwrap());

    for request in mock.requests("GetSecretValue") {
        assert_eq!(request["VersionId"], "t2");
    }
}

#[tokio::test]
async fn test_missing_current_is_precondition() {
    let (mock, store) = mock_store().await;
    mock.not_found("GetSecretValue");

    let err = store.get_current_version("db-cred").await.unwrap_err();
    assert!(matches!(err, RotationError::Precondition(_)));
}

#[tokio::test]
async fn test_client_faults_are_preconditions() {
    let (mock, store) = mock_store().await;
    mock.respond(
        "GetSecretValue",
        StatusCode::BAD_REQUEST,
        json!({
            "__type": "InvalidRequestException",
            "message": "You can't perform this operation on a secret that's scheduled for deletion"
        }),
    );

    let err = store.get_version("db-cred", "t2").await.unwrap_err();
    assert!(matches!(err, RotationError::Precondition(_)), "{err:?}");
    assert!(!err.is_retriable());
}

#[tokio::test]
async fn test_service_faults_are_retriable() {
    let (mock, store) = mock_store().await;
    mock.respond(
        "DescribeSecret",
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "__type": "InternalServiceError", "message": "try again" }),
    );

    let err = store.list_version_labels("db-cred").await.unwrap_err();
    assert!(matches!(
        err,
        RotationError::TargetUnavailable { resource: "secrets-manager", .. }
    ));
    assert!(err.is_retriable());
}

#[tokio::test]
async fn test_list_version_labels_maps_stages() {
    let (mock, store) = mock_store().await;
    mock.respond(
        "DescribeSecret",
        StatusCode::OK,
        describe(json!({
            "v1": ["AWSCURRENT"],
            "v0": ["AWSPREVIOUS", "blue"],
            "t2": ["AWSPENDING"]
        })),
    );

    let labels = store.list_version_labels("db-cred").await.unwrap();
    assert_eq!(labels.holder(StagingLabel::Current), Some("v1"));
    assert_eq!(labels.labels_of("v0"), &[StagingLabel::Previous]);
    assert_eq!(labels.holder(StagingLabel::Pending), Some("t2"));
}

#[tokio::test]
async fn test_put_pending_sends_token_and_stage() {
    let (mock, store) = mock_store().await;
    mock.respond(
        "DescribeSecret",
        StatusCode::OK,
        describe(json!({ "v1": ["AWSCURRENT"] })),
    );
    mock.respond(
        "PutSecretValue",
        StatusCode::OK,
        json!({ "ARN": ARN, "Name": "db-cred", "VersionId": "t2", "VersionStages": ["AWSPENDING"] }),
    );
    mock.respond(
        "DescribeSecret",
        StatusCode::OK,
        describe(json!({ "v1": ["AWSCURRENT"], "t2": ["AWSPENDING"] })),
    );

    let payload = CredentialPayload::new("h", "app", "new", 3306);
    store
        .put_version("db-cred", "t2", &payload, StagingLabel::Pending)
        .await
        .unwrap();

    let requests = mock.requests("PutSecretValue");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["SecretId"], "db-cred");
    assert_eq!(requests[0]["ClientRequestToken"], "t2");
    assert_eq!(requests[0]["VersionStages"], json!(["AWSPENDING"]));
    let stored: Value =
        serde_json::from_str(requests[0]["SecretString"].as_str().unwrap()).unwrap();
    assert_eq!(stored["password"], "new");
    assert_eq!(stored["username"], "app");
}

#[tokio::test]
async fn test_put_pending_refuses_other_holder() {
    let (mock, store) = mock_store().await;
    mock.respond(
        "DescribeSecret",
        StatusCode::OK,
        describe(json!({ "v1": ["AWSCURRENT"], "t2": ["AWSPENDING"] })),
    );

    let payload = CredentialPayload::new("h", "app", "new", 3306);
    let err = store
        .put_version("db-cred", "t3", &payload, StagingLabel::Pending)
        .await
        .unwrap_err();
    assert!(matches!(err, RotationError::Conflict { ref pending, .. } if pending == "t2"));
    assert!(mock.requests("PutSecretValue").is_empty());
}

#[tokio::test]
async fn test_put_pending_detects_concurrent_writer() {
    let (mock, store) = mock_store().await;
    mock.respond(
        "DescribeSecret",
        StatusCode::OK,
        describe(json!({ "v1": ["AWSCURRENT"] })),
    );
    mock.respond(
        "PutSecretValue",
        StatusCode::OK,
        json!({ "ARN": ARN, "Name": "db-cred", "VersionId": "t2", "VersionStages": ["AWSPENDING"] }),
    );
    // Another writer staged t3 right after us and took AWSPENDING
    mock.respond(
        "DescribeSecret",
        StatusCode::OK,
        describe(json!({ "v1": ["AWSCURRENT"], "t2": [], "t3": ["AWSPENDING"] })),
    );

    let payload = CredentialPayload::new("h", "app", "new", 3306);
    let err = store
        .put_version("db-cred", "t2", &payload, StagingLabel::Pending)
        .await
        .unwrap_err();
    match err {
        RotationError::Conflict { pending, requested } => {
            assert_eq!(pending, "t3");
            assert_eq!(requested, "t2");
        }
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn test_move_label_sends_both_versions() {
    let (mock, store) = mock_store().await;
    mock.respond(
        "UpdateSecretVersionStage",
        StatusCode::OK,
        json!({ "ARN": ARN, "Name": "db-cred" }),
    );
    mock.respond(
        "UpdateSecretVersionStage",
        StatusCode::OK,
        json!({ "ARN": ARN, "Name": "db-cred" }),
    );

    store
        .move_label("db-cred", StagingLabel::Current, Some("v1"), Some("t2"))
        .await
        .unwrap();
    store
        .move_label("db-cred", StagingLabel::Pending, Some("t2"), None)
        .await
        .unwrap();

    let requests = mock.requests("UpdateSecretVersionStage");
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0]["VersionStage"], "AWSCURRENT");
    assert_eq!(requests[0]["RemoveFromVersionId"], "v1");
    assert_eq!(requests[0]["MoveToVersionId"], "t2");
    assert_eq!(requests[1]["VersionStage"], "AWSPENDING");
    assert_eq!(requests[1]["RemoveFromVersionId"], "t2");
    assert!(requests[1].get("MoveToVersionId").is_none());
}

#[tokio::test]
async fn test_generate_password_excludes_backslash() {
    let (mock, store) = mock_store().await;
    mock.respond(
        "GetRandomPassword",
        StatusCode::OK,
        json!({ "RandomPassword": "s3cr3t-value" }),
    );

    let policy = credential_rotator::config::PasswordPolicy {
        length: 24,
        exclude_characters: "/@".to_string(),
    };
    assert_eq!(store.generate_password(&policy).await.unwrap(), "s3cr3t-value");

    let requests = mock.requests("GetRandomPassword");
    assert_eq!(requests[0]["PasswordLength"], 24);
    assert_eq!(requests[0]["ExcludeCharacters"], "/@\\");
}
