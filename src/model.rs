//! # Rotation Model
//!
//! Secret versions, staging labels and the requests that drive a rotation.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use zeroize::Zeroize;

/// Label marking a version's role in the rotation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StagingLabel {
    Current,
    Pending,
    Previous,
}

impl StagingLabel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StagingLabel::Current => "CURRENT",
            StagingLabel::Pending => "PENDING",
            StagingLabel::Previous => "PREVIOUS",
        }
    }
}

impl fmt::Display for StagingLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credential material stored in one secret version.
///
/// Fields other than the four well-known ones (`engine`, `dbname`, ...) are
/// kept in `extra` and carried unchanged into every new version.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPayload {
    pub host: String,
    pub username: String,
    pub password: String,
    #[serde(deserialize_with = "deserialize_port")]
    pub port: u16,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl CredentialPayload {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            port,
            extra: BTreeMap::new(),
        }
    }

    /// Copy of this payload carrying a different password
    #[must_use]
    pub fn with_password(&self, password: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.password.zeroize();
        next.password = password.into();
        next
    }

    /// True when both payloads differ at most in `password`
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.host == other.host
            && self.username == other.username
            && self.port == other.port
            && self.extra == other.extra
    }

    /// Optional default schema to connect to
    #[must_use]
    pub fn dbname(&self) -> Option<&str> {
        self.extra.get("dbname").and_then(serde_json::Value::as_str)
    }
}

impl fmt::Debug for CredentialPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPayload")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"***")
            .field("port", &self.port)
            .field("extra", &self.extra)
            .finish()
    }
}

impl Drop for CredentialPayload {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

// Ports are written as numbers by most tooling but as strings by some
// console forms.
fn deserialize_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// One immutable snapshot of credential material
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretVersion {
    /// Version identifier (the request token that created it)
    pub token: String,
    pub payload: CredentialPayload,
    pub labels: Vec<StagingLabel>,
}

impl SecretVersion {
    #[must_use]
    pub fn has_label(&self, label: StagingLabel) -> bool {
        self.labels.contains(&label)
    }
}

/// Mapping of version token to the staging labels it holds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionLabels(BTreeMap<String, Vec<StagingLabel>>);

impl VersionLabels {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: impl Into<String>, labels: Vec<StagingLabel>) {
        self.0.insert(token.into(), labels);
    }

    /// Version currently holding `label`, if any
    #[must_use]
    pub fn holder(&self, label: StagingLabel) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, labels)| labels.contains(&label))
            .map(|(token, _)| token.as_str())
    }

    /// Number of versions holding `label`
    #[must_use]
    pub fn count(&self, label: StagingLabel) -> usize {
        self.0.values().filter(|labels| labels.contains(&label)).count()
    }

    #[must_use]
    pub fn has_label(&self, token: &str, label: StagingLabel) -> bool {
        self.0.get(token).is_some_and(|labels| labels.contains(&label))
    }

    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.0.contains_key(token)
    }

    #[must_use]
    pub fn labels_of(&self, token: &str) -> &[StagingLabel] {
        self.0.get(token).map_or(&[], Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[StagingLabel])> {
        self.0
            .iter()
            .map(|(token, labels)| (token.as_str(), labels.as_slice()))
    }
}

impl FromIterator<(String, Vec<StagingLabel>)> for VersionLabels {
    fn from_iter<I: IntoIterator<Item = (String, Vec<StagingLabel>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One of the four rotation phases
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RotationStep {
    Create,
    Set,
    Test,
    Finish,
    /// Anything else; dispatching it is a no-op
    Unknown(String),
}

impl RotationStep {
    /// The phases in the order they must run
    pub const SEQUENCE: [RotationStep; 4] = [
        RotationStep::Create,
        RotationStep::Set,
        RotationStep::Test,
        RotationStep::Finish,
    ];

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            RotationStep::Create => "createSecret",
            RotationStep::Set => "setSecret",
            RotationStep::Test => "testSecret",
            RotationStep::Finish => "finishSecret",
            RotationStep::Unknown(step) => step,
        }
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, RotationStep::Unknown(_))
    }

    /// Label value safe for metrics (unknown steps collapse into one series)
    #[must_use]
    pub fn metric_label(&self) -> &'static str {
        match self {
            RotationStep::Create => "createSecret",
            RotationStep::Set => "setSecret",
            RotationStep::Test => "testSecret",
            RotationStep::Finish => "finishSecret",
            RotationStep::Unknown(_) => "unknown",
        }
    }
}

impl From<&str> for RotationStep {
    fn from(value: &str) -> Self {
        match value {
            "createSecret" => RotationStep::Create,
            "setSecret" => RotationStep::Set,
            "testSecret" => RotationStep::Test,
            "finishSecret" => RotationStep::Finish,
            other => RotationStep::Unknown(other.to_string()),
        }
    }
}

impl From<String> for RotationStep {
    fn from(value: String) -> Self {
        RotationStep::from(value.as_str())
    }
}

impl From<RotationStep> for String {
    fn from(step: RotationStep) -> Self {
        step.as_str().to_string()
    }
}

impl std::str::FromStr for RotationStep {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RotationStep::from(s))
    }
}

impl fmt::Display for RotationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single invocation of the rotation state machine.
///
/// Accepts both `{secretId, requestToken, step}` and the AWS rotation event
/// spelling `{SecretId, ClientRequestToken, Step}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationRequest {
    #[serde(alias = "SecretId")]
    pub secret_id: String,
    #[serde(alias = "ClientRequestToken")]
    pub request_token: String,
    #[serde(alias = "Step")]
    pub step: RotationStep,
}

impl RotationRequest {
    pub fn new(
        secret_id: impl Into<String>,
        request_token: impl Into<String>,
        step: RotationStep,
    ) -> Self {
        Self {
            secret_id: secret_id.into(),
            request_token: request_token.into(),
            step,
        }
    }
}

/// What a successfully dispatched step did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// The step performed its action
    Completed,
    /// The step's effect was already in place
    AlreadyDone,
    /// The request token already holds CURRENT; nothing left to do
    AlreadyCurrent,
    /// Unrecognised step name
    Ignored,
}

impl StepOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StepOutcome::Completed => "completed",
            StepOutcome::AlreadyDone => "already_done",
            StepOutcome::AlreadyCurrent => "already_current",
            StepOutcome::Ignored => "ignored",
        }
    }
}
