//! Run report assembly and rendering.
//!
//! A report is derived entirely from durable state so that a crashed or
//! resumed run reports the same truth as the run that wrote it.

use itertools::Itertools;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::registry::StageRegistry;
use crate::store::StateStore;
use crate::types::{Project, ProjectId, ProjectStatus, StageOutcome};

#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    pub stage_id: u32,
    pub name: &'static str,
    /// Latest recorded outcome; `None` when the stage never started.
    pub outcome: Option<StageOutcome>,
    pub attempts: u32,
    pub reduced_confidence: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub project_id: ProjectId,
    pub status: ProjectStatus,
    pub blocked_stages: Vec<u32>,
    pub stages: Vec<StageSummary>,
    pub routed_calls: u64,
    pub estimated_cost_microdollars: u64,
}

impl RunReport {
    /// Derive the report from the project row and the latest attempt of each
    /// catalog stage.
    pub async fn collect(
        registry: &StageRegistry,
        store: &dyn StateStore,
        project: &Project,
    ) -> Result<Self> {
        let mut stages = Vec::with_capacity(registry.definitions().len());
        let mut blocked_stages = Vec::new();

        for def in registry.definitions() {
            let latest = store.latest_run(&project.id, def.id).await?;
            let summary = match latest {
                Some(record) => {
                    if record.outcome == StageOutcome::Blocked {
                        blocked_stages.push(def.id.value());
                    }
                    StageSummary {
                        stage_id: def.id.value(),
                        name: def.name,
                        outcome: Some(record.outcome),
                        attempts: record.attempt,
                        reduced_confidence: record.reduced_confidence,
                        error: record.error,
                    }
                }
                None => StageSummary {
                    stage_id: def.id.value(),
                    name: def.name,
                    outcome: None,
                    attempts: 0,
                    reduced_confidence: false,
                    error: None,
                },
            };
            stages.push(summary);
        }

        Ok(Self {
            project_id: project.id.clone(),
            status: project.status,
            blocked_stages,
            stages,
            routed_calls: project.routed_calls,
            estimated_cost_microdollars: project.estimated_cost_microdollars,
        })
    }

    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Plain-text rendering for the terminal.
    #[must_use]
    pub fn render_text(&self) -> String {
        let header = format!(
            "project {} is {} ({} routed calls, ${:.4} estimated)",
            self.project_id,
            self.status,
            self.routed_calls,
            self.estimated_cost_microdollars as f64 / 1_000_000.0
        );

        let lines = self
            .stages
            .iter()
            .map(|stage| {
                let outcome = stage
                    .outcome
                    .map_or("not started", |outcome| outcome.as_str());
                let mut line = format!(
                    "  {:>2}. {:<20} {:<14} attempts={}",
                    stage.stage_id, stage.name, outcome, stage.attempts
                );
                if stage.reduced_confidence {
                    line.push_str(" (reduced confidence)");
                }
                if let Some(error) = &stage.error {
                    line.push_str(&format!("  [{error}]"));
                }
                line
            })
            .join("\n");

        let blocked = if self.blocked_stages.is_empty() {
            String::new()
        } else {
            format!(
                "\nblocked stages: {}",
                self.blocked_stages.iter().join(", ")
            )
        };

        format!("{header}\n{lines}{blocked}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::RunReport;
    use crate::registry::StageRegistry;
    use crate::store::{MemoryStore, StateStore};
    use crate::types::{
        FailureKind, Project, ProjectId, ProjectStatus, StageId, StageOutcome, StageRunRecord,
    };
    use chrono::Utc;
    use serde_json::json;

    fn record(
        project: &ProjectId,
        stage: u32,
        attempt: u32,
        outcome: StageOutcome,
    ) -> StageRunRecord {
        let now = Utc::now();
        let (failure_kind, payload, error) = match outcome {
            StageOutcome::Blocked => (
                Some(FailureKind::Blocking),
                None,
                Some("district not found".to_string()),
            ),
            _ => (None, Some(json!({"ok": true})), None),
        };
        StageRunRecord::new(
            project.clone(),
            StageId::new(stage),
            attempt,
            now,
            now,
            outcome,
            failure_kind,
            payload,
            false,
            error,
        )
    }

    #[tokio::test]
    async fn report_reflects_latest_attempts_and_blocked_stages() {
        let store = MemoryStore::new();
        let id = ProjectId::parse("SPT-2025-007").expect("id");
        let mut project = Project::new(id.clone());
        project.transition(ProjectStatus::Blocked).expect("legal");
        project.add_cost(5, 9_150);

        store
            .append_run(&record(&id, 1, 1, StageOutcome::Success))
            .await
            .expect("append");
        store
            .append_run(&record(&id, 2, 1, StageOutcome::FailedAttempt))
            .await
            .expect("append");
        store
            .append_run(&record(&id, 2, 2, StageOutcome::Blocked))
            .await
            .expect("append");

        let registry = StageRegistry::new();
        let report = RunReport::collect(&registry, &store, &project)
            .await
            .expect("report");

        assert_eq!(report.blocked_stages, vec![2]);
        assert_eq!(report.stages.len(), 10);
        assert_eq!(report.stages[1].attempts, 2);
        assert_eq!(report.stages[2].outcome, None);
        assert_eq!(report.routed_calls, 5);

        let text = report.render_text();
        assert!(text.contains("blocked stages: 2"));
        assert!(text.contains("Zoning Analysis"));

        let value = report.to_json().expect("json");
        assert_eq!(value["status"], json!("blocked"));
    }
}
