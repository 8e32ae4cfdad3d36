use super::identifiers::ProjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Running,
    Blocked,
    Complete,
    Failed,
}

impl ProjectStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Blocked => "blocked",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Legal transitions only; COMPLETE and FAILED are terminal.
    #[must_use]
    pub const fn can_transition(&self, to: Self) -> bool {
        matches!(
            (self, to),
            (
                Self::Running,
                Self::Running | Self::Blocked | Self::Complete | Self::Failed
            ) | (Self::Blocked, Self::Running | Self::Blocked)
        )
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for ProjectStatus {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, String> {
        match s {
            "running" => Ok(Self::Running),
            "blocked" => Ok(Self::Blocked),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown project status: {s}")),
        }
    }
}

/// One project run's durable identity and counters. Owned exclusively by the
/// controller for the duration of a run; persisted after every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub current_stage: u32,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub routed_calls: u64,
    pub estimated_cost_microdollars: u64,
}

impl Project {
    #[must_use]
    pub fn new(id: ProjectId) -> Self {
        let now = Utc::now();
        Self {
            id,
            current_stage: 0,
            status: ProjectStatus::Running,
            created_at: now,
            updated_at: now,
            routed_calls: 0,
            estimated_cost_microdollars: 0,
        }
    }

    /// Apply a status transition, rejecting anything outside the legal set.
    pub fn transition(&mut self, to: ProjectStatus) -> Result<(), String> {
        if !self.status.can_transition(to) {
            return Err(format!(
                "illegal project status transition {} -> {}",
                self.status, to
            ));
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn advance_stage(&mut self, stage: u32) {
        self.current_stage = stage;
        self.updated_at = Utc::now();
    }

    pub fn add_cost(&mut self, calls: u64, microdollars: u64) {
        self.routed_calls += calls;
        self.estimated_cost_microdollars += microdollars;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::{Project, ProjectStatus};
    use crate::types::ProjectId;

    fn project() -> Project {
        Project::new(ProjectId::parse("SPT-2025-001").expect("canonical id"))
    }

    #[test]
    fn status_string_roundtrip() {
        for status in [
            ProjectStatus::Running,
            ProjectStatus::Blocked,
            ProjectStatus::Complete,
            ProjectStatus::Failed,
        ] {
            assert_eq!(ProjectStatus::try_from(status.as_str()), Ok(status));
        }
        assert!(ProjectStatus::try_from("paused").is_err());
    }

    #[test]
    fn terminal_statuses_admit_no_transitions() {
        for terminal in [ProjectStatus::Complete, ProjectStatus::Failed] {
            for to in [
                ProjectStatus::Running,
                ProjectStatus::Blocked,
                ProjectStatus::Complete,
                ProjectStatus::Failed,
            ] {
                assert!(!terminal.can_transition(to));
            }
        }
    }

    #[test]
    fn blocked_projects_can_resume() {
        let mut project = project();
        assert!(project.transition(ProjectStatus::Blocked).is_ok());
        assert!(project.transition(ProjectStatus::Running).is_ok());
        assert!(project.transition(ProjectStatus::Complete).is_ok());
        assert!(project.transition(ProjectStatus::Running).is_err());
    }

    #[test]
    fn cost_counters_accumulate() {
        let mut project = project();
        project.add_cost(3, 450);
        project.add_cost(1, 120);
        assert_eq!(project.routed_calls, 4);
        assert_eq!(project.estimated_cost_microdollars, 570);
    }
}
