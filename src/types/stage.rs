use super::identifiers::{ProjectId, StageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Terminal outcome of one stage attempt. `FailedAttempt` marks a transient
/// failure that was (or will be) retried; the other four are the resolved
/// states the controller acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Success,
    Recovered,
    Blocked,
    Fatal,
    FailedAttempt,
}

impl StageOutcome {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Recovered => "recovered",
            Self::Blocked => "blocked",
            Self::Fatal => "fatal",
            Self::FailedAttempt => "failed_attempt",
        }
    }

    /// True when the stage produced usable output and never needs re-running.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Success | Self::Recovered)
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for StageOutcome {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, String> {
        match s {
            "success" => Ok(Self::Success),
            "recovered" => Ok(Self::Recovered),
            "blocked" => Ok(Self::Blocked),
            "fatal" => Ok(Self::Fatal),
            "failed_attempt" => Ok(Self::FailedAttempt),
            _ => Err(format!("Unknown stage outcome: {s}")),
        }
    }
}

/// Failure classification driving the recovery state machine. Recovery policy
/// is data, not control flow scattered across call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transient,
    Degraded,
    Blocking,
    Fatal,
}

impl FailureKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Degraded => "degraded",
            Self::Blocking => "blocking",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for FailureKind {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, String> {
        match s {
            "transient" => Ok(Self::Transient),
            "degraded" => Ok(Self::Degraded),
            "blocking" => Ok(Self::Blocking),
            "fatal" => Ok(Self::Fatal),
            _ => Err(format!("Unknown failure kind: {s}")),
        }
    }
}

/// A classified failure raised by a stage work function.
#[derive(Debug, Clone)]
pub struct WorkError {
    pub kind: FailureKind,
    pub message: String,
    /// Reduced-confidence partial result accompanying a `Degraded` failure.
    pub partial: Option<Value>,
}

impl WorkError {
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
            partial: None,
        }
    }

    #[must_use]
    pub fn degraded(message: impl Into<String>, partial: Value) -> Self {
        Self {
            kind: FailureKind::Degraded,
            message: message.into(),
            partial: Some(partial),
        }
    }

    #[must_use]
    pub fn blocking(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Blocking,
            message: message.into(),
            partial: None,
        }
    }

    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Fatal,
            message: message.into(),
            partial: None,
        }
    }
}

impl fmt::Display for WorkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for WorkError {}

/// Append-only record of one (project, stage) attempt. Retries create new
/// records with increasing attempt numbers; prior records are never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRunRecord {
    pub project_id: ProjectId,
    pub stage_id: StageId,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub outcome: StageOutcome,
    pub failure_kind: Option<FailureKind>,
    pub payload: Option<Value>,
    pub payload_hash: Option<String>,
    pub reduced_confidence: bool,
    pub error: Option<String>,
}

impl StageRunRecord {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        project_id: ProjectId,
        stage_id: StageId,
        attempt: u32,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        outcome: StageOutcome,
        failure_kind: Option<FailureKind>,
        payload: Option<Value>,
        reduced_confidence: bool,
        error: Option<String>,
    ) -> Self {
        let payload_hash = payload.as_ref().map(content_hash);
        Self {
            project_id,
            stage_id,
            attempt,
            started_at,
            completed_at,
            outcome,
            failure_kind,
            payload,
            payload_hash,
            reduced_confidence,
            error,
        }
    }
}

/// Stable sha256 hex digest of a payload for the audit trail.
#[must_use]
pub fn content_hash(payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::{content_hash, FailureKind, StageOutcome, StageRunRecord, WorkError};
    use crate::types::{ProjectId, StageId};
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn outcome_roundtrip_and_completion_semantics() {
        for outcome in [
            StageOutcome::Success,
            StageOutcome::Recovered,
            StageOutcome::Blocked,
            StageOutcome::Fatal,
            StageOutcome::FailedAttempt,
        ] {
            assert_eq!(StageOutcome::try_from(outcome.as_str()), Ok(outcome));
        }
        assert!(StageOutcome::Success.is_complete());
        assert!(StageOutcome::Recovered.is_complete());
        assert!(!StageOutcome::Blocked.is_complete());
        assert!(!StageOutcome::FailedAttempt.is_complete());
    }

    #[test]
    fn failure_kind_roundtrip() {
        for kind in [
            FailureKind::Transient,
            FailureKind::Degraded,
            FailureKind::Blocking,
            FailureKind::Fatal,
        ] {
            assert_eq!(FailureKind::try_from(kind.as_str()), Ok(kind));
        }
        assert!(FailureKind::try_from("retryable").is_err());
    }

    #[test]
    fn degraded_errors_carry_their_partial_payload() {
        let err = WorkError::degraded("layers missing", json!({"screen_level": "desktop"}));
        assert_eq!(err.kind, FailureKind::Degraded);
        assert!(err.partial.is_some());
        assert!(WorkError::transient("timeout").partial.is_none());
    }

    #[test]
    fn run_records_hash_their_payload() {
        let project = ProjectId::parse("SPT-2025-001").expect("canonical id");
        let now = Utc::now();
        let record = StageRunRecord::new(
            project,
            StageId::new(1),
            1,
            now,
            now,
            StageOutcome::Success,
            None,
            Some(json!({"parcel": {"account": "2834-001"}})),
            false,
            None,
        );
        assert_eq!(
            record.payload_hash.as_deref(),
            record.payload.as_ref().map(content_hash).as_deref()
        );
        let blocked = StageRunRecord::new(
            record.project_id.clone(),
            StageId::new(2),
            1,
            now,
            now,
            StageOutcome::Blocked,
            Some(FailureKind::Blocking),
            None,
            false,
            Some("district not found".to_string()),
        );
        assert!(blocked.payload_hash.is_none());
    }
}
