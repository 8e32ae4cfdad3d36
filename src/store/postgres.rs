#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::store::{StateStore, StoreFuture};
use crate::types::{
    FailureKind, Project, ProjectId, ProjectStatus, RoutingDecisionRecord, StageId,
    StageOutcome, StageRunRecord,
};

/// Postgres-backed state store. Payloads are stored as serialized JSON text;
/// the core never asks the database for more than append + point-read.
#[derive(Clone)]
pub struct PgStateStore {
    pool: PgPool,
}

type RunRow = (
    String,
    i32,
    i32,
    DateTime<Utc>,
    DateTime<Utc>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    bool,
    Option<String>,
);

impl PgStateStore {
    /// Connect a pool and verify the connection.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| PipelineError::StoreError(format!("Failed to connect: {e}")))?;

        info!("Connected to PostgreSQL pipeline database");
        Ok(Self { pool })
    }

    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the pipeline schema when it does not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS projects (
                 project_id TEXT PRIMARY KEY,
                 current_stage INT NOT NULL DEFAULT 0,
                 status TEXT NOT NULL,
                 created_at TIMESTAMPTZ NOT NULL,
                 updated_at TIMESTAMPTZ NOT NULL,
                 routed_calls BIGINT NOT NULL DEFAULT 0,
                 estimated_cost_microdollars BIGINT NOT NULL DEFAULT 0
             )",
            "CREATE TABLE IF NOT EXISTS stage_runs (
                 id BIGSERIAL PRIMARY KEY,
                 project_id TEXT NOT NULL,
                 stage_id INT NOT NULL,
                 attempt INT NOT NULL,
                 started_at TIMESTAMPTZ NOT NULL,
                 completed_at TIMESTAMPTZ NOT NULL,
                 outcome TEXT NOT NULL,
                 failure_kind TEXT,
                 payload TEXT,
                 payload_hash TEXT,
                 reduced_confidence BOOLEAN NOT NULL DEFAULT FALSE,
                 error TEXT
             )",
            "CREATE INDEX IF NOT EXISTS stage_runs_latest
                 ON stage_runs (project_id, stage_id, attempt DESC)",
            "CREATE TABLE IF NOT EXISTS routing_decisions (
                 id BIGSERIAL PRIMARY KEY,
                 project_id TEXT NOT NULL,
                 complexity TEXT NOT NULL,
                 tier TEXT NOT NULL,
                 estimated_cost_microdollars BIGINT NOT NULL,
                 latency_ms BIGINT NOT NULL,
                 success BOOLEAN NOT NULL,
                 decided_at TIMESTAMPTZ NOT NULL
             )",
            "CREATE TABLE IF NOT EXISTS project_leases (
                 project_id TEXT PRIMARY KEY,
                 owner TEXT NOT NULL,
                 since TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                 until_at TIMESTAMPTZ NOT NULL
             )",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| PipelineError::StoreError(format!("Failed to migrate: {e}")))?;
        }
        Ok(())
    }

    fn run_from_row(row: RunRow) -> Result<StageRunRecord> {
        let (
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
        ) = row;

        let project_id = ProjectId::parse(&project_id).map_err(PipelineError::StoreError)?;
        let outcome =
            StageOutcome::try_from(outcome.as_str()).map_err(PipelineError::StoreError)?;
        let failure_kind = failure_kind
            .as_deref()
            .map(FailureKind::try_from)
            .transpose()
            .map_err(PipelineError::StoreError)?;
        let payload = payload
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(StageRunRecord {
            project_id,
            stage_id: StageId::new(column_u32(stage_id)?),
            attempt: column_u32(attempt)?,
            started_at,
            completed_at,
            outcome,
            failure_kind,
            payload,
            payload_hash,
            reduced_confidence,
            error,
        })
    }
}

fn column_u32(value: i32) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| PipelineError::StoreError(format!("negative counter in store: {value}")))
}

impl StateStore for PgStateStore {
    fn get_project<'a>(&'a self, id: &'a ProjectId) -> StoreFuture<'a, Option<Project>> {
        Box::pin(async move {
            let row: Option<(String, i32, String, DateTime<Utc>, DateTime<Utc>, i64, i64)> =
                sqlx::query_as(
                    "SELECT project_id, current_stage, status, created_at, updated_at,
                            routed_calls, estimated_cost_microdollars
                     FROM projects WHERE project_id = $1",
                )
                .bind(id.value())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| PipelineError::StoreError(format!("Failed to load project: {e}")))?;

            row.map(
                |(project_id, current_stage, status, created_at, updated_at, calls, cost)| {
                    Ok(Project {
                        id: ProjectId::parse(&project_id).map_err(PipelineError::StoreError)?,
                        current_stage: column_u32(current_stage)?,
                        status: ProjectStatus::try_from(status.as_str())
                            .map_err(PipelineError::StoreError)?,
                        created_at,
                        updated_at,
                        routed_calls: calls.cast_unsigned(),
                        estimated_cost_microdollars: cost.cast_unsigned(),
                    })
                },
            )
            .transpose()
        })
    }

    fn insert_project<'a>(&'a self, project: &'a Project) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO projects (project_id, current_stage, status, created_at,
                                       updated_at, routed_calls, estimated_cost_microdollars)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (project_id) DO NOTHING",
            )
            .bind(project.id.value())
            .bind(i32::try_from(project.current_stage).unwrap_or(i32::MAX))
            .bind(project.status.as_str())
            .bind(project.created_at)
            .bind(project.updated_at)
            .bind(i64::try_from(project.routed_calls).unwrap_or(i64::MAX))
            .bind(i64::try_from(project.estimated_cost_microdollars).unwrap_or(i64::MAX))
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| PipelineError::StoreError(format!("Failed to insert project: {e}")))
        })
    }

    fn update_project<'a>(&'a self, project: &'a Project) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                "UPDATE projects
                 SET current_stage = $2, status = $3, updated_at = $4,
                     routed_calls = $5, estimated_cost_microdollars = $6
                 WHERE project_id = $1",
            )
            .bind(project.id.value())
            .bind(i32::try_from(project.current_stage).unwrap_or(i32::MAX))
            .bind(project.status.as_str())
            .bind(project.updated_at)
            .bind(i64::try_from(project.routed_calls).unwrap_or(i64::MAX))
            .bind(i64::try_from(project.estimated_cost_microdollars).unwrap_or(i64::MAX))
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| PipelineError::StoreError(format!("Failed to update project: {e}")))
        })
    }

    fn append_run<'a>(&'a self, record: &'a StageRunRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let payload = record
                .payload
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            sqlx::query(
                "INSERT INTO stage_runs (project_id, stage_id, attempt, started_at,
                                         completed_at, outcome, failure_kind, payload,
                                         payload_hash, reduced_confidence, error)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(record.project_id.value())
            .bind(i32::try_from(record.stage_id.value()).unwrap_or(i32::MAX))
            .bind(i32::try_from(record.attempt).unwrap_or(i32::MAX))
            .bind(record.started_at)
            .bind(record.completed_at)
            .bind(record.outcome.as_str())
            .bind(record.failure_kind.map(|kind| kind.as_str()))
            .bind(payload)
            .bind(record.payload_hash.as_deref())
            .bind(record.reduced_confidence)
            .bind(record.error.as_deref())
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| PipelineError::StoreError(format!("Failed to append stage run: {e}")))
        })
    }

    fn latest_run<'a>(
        &'a self,
        id: &'a ProjectId,
        stage: StageId,
    ) -> StoreFuture<'a, Option<StageRunRecord>> {
        Box::pin(async move {
            let row: Option<RunRow> = sqlx::query_as(
                "SELECT project_id, stage_id, attempt, started_at, completed_at, outcome,
                        failure_kind, payload, payload_hash, reduced_confidence, error
                 FROM stage_runs
                 WHERE project_id = $1 AND stage_id = $2
                 ORDER BY attempt DESC LIMIT 1",
            )
            .bind(id.value())
            .bind(i32::try_from(stage.value()).unwrap_or(i32::MAX))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PipelineError::StoreError(format!("Failed to load latest run: {e}")))?;

            row.map(Self::run_from_row).transpose()
        })
    }

    fn runs_for_stage<'a>(
        &'a self,
        id: &'a ProjectId,
        stage: StageId,
    ) -> StoreFuture<'a, Vec<StageRunRecord>> {
        Box::pin(async move {
            let rows: Vec<RunRow> = sqlx::query_as(
                "SELECT project_id, stage_id, attempt, started_at, completed_at, outcome,
                        failure_kind, payload, payload_hash, reduced_confidence, error
                 FROM stage_runs
                 WHERE project_id = $1 AND stage_id = $2
                 ORDER BY attempt ASC",
            )
            .bind(id.value())
            .bind(i32::try_from(stage.value()).unwrap_or(i32::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PipelineError::StoreError(format!("Failed to load stage trail: {e}")))?;

            rows.into_iter().map(Self::run_from_row).collect()
        })
    }

    fn append_decision<'a>(&'a self, record: &'a RoutingDecisionRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO routing_decisions (project_id, complexity, tier,
                                                estimated_cost_microdollars, latency_ms,
                                                success, decided_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(record.project_id.value())
            .bind(record.complexity.as_str())
            .bind(record.tier.as_str())
            .bind(i64::try_from(record.estimated_cost_microdollars).unwrap_or(i64::MAX))
            .bind(i64::try_from(record.latency_ms).unwrap_or(i64::MAX))
            .bind(record.success)
            .bind(record.decided_at)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| PipelineError::StoreError(format!("Failed to append decision: {e}")))
        })
    }

    fn acquire_lease<'a>(
        &'a self,
        id: &'a ProjectId,
        owner: &'a str,
        ttl_ms: i64,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            sqlx::query("DELETE FROM project_leases WHERE until_at <= NOW()")
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    PipelineError::StoreError(format!("Failed to cleanup leases: {e}"))
                })?;

            let acquired: Option<DateTime<Utc>> = sqlx::query_scalar(
                "INSERT INTO project_leases (project_id, owner, until_at)
                 VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 millisecond'))
                 ON CONFLICT (project_id) DO NOTHING
                 RETURNING until_at",
            )
            .bind(id.value())
            .bind(owner)
            .bind(ttl_ms)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PipelineError::StoreError(format!("Failed to acquire lease: {e}")))?;

            Ok(acquired.is_some())
        })
    }

    fn release_lease<'a>(&'a self, id: &'a ProjectId, owner: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            sqlx::query("DELETE FROM project_leases WHERE project_id = $1 AND owner = $2")
                .bind(id.value())
                .bind(owner)
                .execute(&self.pool)
                .await
                .map(|result| result.rows_affected() > 0)
                .map_err(|e| PipelineError::StoreError(format!("Failed to release lease: {e}")))
        })
    }
}
