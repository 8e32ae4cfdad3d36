//! Pipeline controller: drives one project through the stage catalog.
//!
//! The controller is the only writer of project state for the duration of a
//! run, guarded by a store-level lease. Stages execute strictly in catalog
//! order; completed stages are never re-executed on resume, and a fatal
//! outcome ends the run immediately.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::collaborators::CollaboratorSet;
use crate::error::{PipelineError, Result};
use crate::executor::{StageContext, StageInputs, SEED_INPUT};
use crate::recovery::{resolve_stage, RetrySettings};
use crate::registry::{StageDefinition, StageRegistry};
use crate::report::RunReport;
use crate::router::TierRouter;
use crate::stages::work_for;
use crate::store::StateStore;
use crate::types::{
    CostMeter, FailureKind, Project, ProjectId, ProjectStatus, StageOutcome, StageRunRecord,
};

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Re-execute this stage even when its latest attempt is complete.
    pub force_stage: Option<u32>,
    /// Starting input carried on the seed pseudo-stage into stage 1.
    pub input: Value,
    /// Wall-clock budget for the whole run.
    pub run_timeout: Duration,
    pub lease_ttl_ms: i64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            force_stage: None,
            input: Value::Null,
            run_timeout: Duration::from_secs(900),
            lease_ttl_ms: 600_000,
        }
    }
}

pub struct PipelineController {
    registry: StageRegistry,
    router: Arc<TierRouter>,
    collaborators: CollaboratorSet,
    store: Arc<dyn StateStore>,
    retry: RetrySettings,
}

impl PipelineController {
    #[must_use]
    pub fn new(
        registry: StageRegistry,
        router: Arc<TierRouter>,
        collaborators: CollaboratorSet,
        store: Arc<dyn StateStore>,
        retry: RetrySettings,
    ) -> Self {
        Self {
            registry,
            router,
            collaborators,
            store,
            retry,
        }
    }

    /// Execute (or resume) a run under an exclusive lease. The lease is
    /// released on every exit path.
    pub async fn run(&self, project_id: &ProjectId, options: RunOptions) -> Result<RunReport> {
        if let Some(stage) = options.force_stage {
            // Validate up front so a bad override never consumes the lease.
            self.registry.definition(stage)?;
        }

        let owner = Uuid::new_v4().to_string();
        let acquired = self
            .store
            .acquire_lease(project_id, &owner, options.lease_ttl_ms)
            .await?;
        if !acquired {
            return Err(PipelineError::LeaseHeld(project_id.to_string()));
        }

        let outcome = self.run_leased(project_id, &options).await;
        if let Err(err) = self.store.release_lease(project_id, &owner).await {
            warn!(project = %project_id, "failed to release lease: {err}");
        }
        outcome
    }

    /// Report on a project without executing anything.
    pub async fn status(&self, project_id: &ProjectId) -> Result<RunReport> {
        let project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or_else(|| PipelineError::InvalidProjectId(format!("{project_id} has no runs")))?;
        RunReport::collect(&self.registry, self.store.as_ref(), &project).await
    }

    async fn run_leased(&self, project_id: &ProjectId, options: &RunOptions) -> Result<RunReport> {
        let mut project = match self.store.get_project(project_id).await? {
            Some(existing) => existing,
            None => {
                let fresh = Project::new(project_id.clone());
                self.store.insert_project(&fresh).await?;
                fresh
            }
        };

        if project.status.is_terminal() {
            // Terminal projects are read-only; re-running just re-derives.
            if options.force_stage.is_some() {
                warn!(
                    project = %project_id,
                    status = %project.status,
                    "ignoring stage override on a terminal project"
                );
            }
            return RunReport::collect(&self.registry, self.store.as_ref(), &project).await;
        }

        if project.status == ProjectStatus::Blocked {
            info!(project = %project_id, "resuming blocked project");
            project
                .transition(ProjectStatus::Running)
                .map_err(PipelineError::Internal)?;
            self.store.update_project(&project).await?;
        }

        let deadline = Instant::now() + options.run_timeout;
        let mut inputs = StageInputs::new();
        inputs.insert_available(SEED_INPUT, options.input.clone());
        let mut saw_blocked = false;

        for def in self.registry.definitions() {
            let stage = def.id.value();
            let forced = options.force_stage == Some(stage);
            let latest = self.store.latest_run(project_id, def.id).await?;

            if let Some(record) = &latest {
                if record.outcome.is_complete() && !forced {
                    inputs.insert_available(
                        stage,
                        record.payload.clone().unwrap_or(Value::Null),
                    );
                    continue;
                }
            }

            for &upstream in def.preconditions {
                if !inputs.contains(upstream) {
                    return Err(PipelineError::PreconditionViolation {
                        stage,
                        missing: upstream,
                    });
                }
            }

            let work = work_for(stage).ok_or_else(|| {
                PipelineError::Internal(format!("stage {stage} has no work function"))
            })?;
            let starting_attempt = latest.map_or(1, |record| record.attempt + 1);
            let meter = CostMeter::new();
            let ctx = StageContext {
                project_id,
                router: &self.router,
                reasoning: self.collaborators.reasoning.as_ref(),
                property_registry: self.collaborators.property_registry.as_ref(),
                zoning_source: self.collaborators.zoning_source.as_ref(),
                renderer: self.collaborators.renderer.as_ref(),
                store: self.store.as_ref(),
                meter: &meter,
                retry: &self.retry,
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            info!(project = %project_id, stage, name = def.name, "executing stage");
            let resolved = tokio::time::timeout(
                remaining,
                resolve_stage(def, work, &ctx, &inputs, starting_attempt),
            )
            .await;

            let (calls, microdollars) = meter.snapshot();
            project.add_cost(calls, microdollars);
            project.advance_stage(stage);

            let resolution = match resolved {
                Ok(result) => result?,
                Err(_elapsed) => {
                    self.record_timeout(project_id, def).await?;
                    saw_blocked = true;
                    project
                        .transition(ProjectStatus::Blocked)
                        .map_err(PipelineError::Internal)?;
                    warn!(project = %project_id, stage, "run timeout, stopping");
                    self.store.update_project(&project).await?;
                    break;
                }
            };

            match resolution.outcome {
                StageOutcome::Success | StageOutcome::Recovered => {
                    inputs.insert_available(stage, resolution.payload.unwrap_or(Value::Null));
                }
                StageOutcome::Blocked => {
                    inputs.insert_unavailable(stage);
                    saw_blocked = true;
                    // Durable status flips at the blocked stage, not at
                    // run end.
                    project
                        .transition(ProjectStatus::Blocked)
                        .map_err(PipelineError::Internal)?;
                }
                StageOutcome::Fatal => {
                    if project.status == ProjectStatus::Blocked {
                        project
                            .transition(ProjectStatus::Running)
                            .map_err(PipelineError::Internal)?;
                    }
                    project
                        .transition(ProjectStatus::Failed)
                        .map_err(PipelineError::Internal)?;
                    self.store.update_project(&project).await?;
                    return RunReport::collect(&self.registry, self.store.as_ref(), &project)
                        .await;
                }
                StageOutcome::FailedAttempt => {
                    return Err(PipelineError::Internal(format!(
                        "stage {stage} resolved to a non-terminal outcome"
                    )));
                }
            }

            self.store.update_project(&project).await?;
        }

        let end_status = if saw_blocked {
            ProjectStatus::Blocked
        } else {
            ProjectStatus::Complete
        };
        project
            .transition(end_status)
            .map_err(PipelineError::Internal)?;
        self.store.update_project(&project).await?;
        info!(project = %project_id, status = %end_status, "run finished");

        RunReport::collect(&self.registry, self.store.as_ref(), &project).await
    }

    /// The in-flight attempt that overran the budget lands as a transient
    /// failed attempt; a resumed run retries it like any other transient.
    async fn record_timeout(&self, project_id: &ProjectId, def: &StageDefinition) -> Result<()> {
        let attempt = self
            .store
            .latest_run(project_id, def.id)
            .await?
            .map_or(1, |record| record.attempt + 1);
        let now = Utc::now();
        let record = StageRunRecord::new(
            project_id.clone(),
            def.id,
            attempt,
            now,
            now,
            StageOutcome::FailedAttempt,
            Some(FailureKind::Transient),
            None,
            false,
            Some("run wall-clock budget exceeded".to_string()),
        );
        self.store.append_run(&record).await
    }
}
