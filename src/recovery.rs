//! Retry/recovery policy.
//!
//! A state machine per stage attempt: each executor FAILURE carries a
//! `FailureKind`, and this module decides whether to retry with backoff,
//! accept a marked-down result, park the stage as blocked, or stop the run.
//! Every attempt lands in the store as its own append-only record.

use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::error::Result;
use crate::executor::{StageContext, StageExecutor, StageInputs, WorkFn};
use crate::registry::StageDefinition;
use crate::types::{FailureKind, StageOutcome, StageRunRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    /// Bounded attempt count for `Transient` failures.
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl RetrySettings {
    #[must_use]
    pub const fn new(max_attempts: u32, base_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            base_backoff_ms,
            max_backoff_ms,
        }
    }

    /// Exponential backoff for the given 1-based attempt, capped.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let ms = self
            .base_backoff_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self::new(3, 250, 5_000)
    }
}

/// Resolved fate of one stage within one run.
#[derive(Debug, Clone)]
pub struct StageResolution {
    pub outcome: StageOutcome,
    /// Attempt number of the resolving record.
    pub final_attempt: u32,
    pub payload: Option<Value>,
    pub reduced_confidence: bool,
    pub error: Option<String>,
}

/// Drive one stage to a resolved outcome, retrying transient failures with
/// exponential backoff and demoting them to blocking on exhaustion. Appends
/// one record per attempt; prior records are never touched.
pub async fn resolve_stage(
    def: &StageDefinition,
    work: WorkFn,
    ctx: &StageContext<'_>,
    inputs: &StageInputs,
    starting_attempt: u32,
) -> Result<StageResolution> {
    let mut attempt = starting_attempt.max(1);

    loop {
        let report = StageExecutor::execute(def, work, ctx, inputs).await;
        let record = move |outcome, failure_kind, payload: Option<Value>, reduced, error| {
            StageRunRecord::new(
                ctx.project_id.clone(),
                def.id,
                attempt,
                report.started_at,
                report.completed_at,
                outcome,
                failure_kind,
                payload,
                reduced,
                error,
            )
        };

        match report.result {
            Ok(payload) => {
                ctx.store
                    .append_run(&record(
                        StageOutcome::Success,
                        None,
                        Some(payload.clone()),
                        false,
                        None,
                    ))
                    .await?;
                return Ok(StageResolution {
                    outcome: StageOutcome::Success,
                    final_attempt: attempt,
                    payload: Some(payload),
                    reduced_confidence: false,
                    error: None,
                });
            }
            Err(err) => match err.kind {
                FailureKind::Degraded => {
                    let partial = err.partial.clone().unwrap_or(Value::Null);
                    info!(
                        stage = def.id.value(),
                        "accepting degraded result: {}", err.message
                    );
                    ctx.store
                        .append_run(&record(
                            StageOutcome::Recovered,
                            Some(FailureKind::Degraded),
                            Some(partial.clone()),
                            true,
                            Some(err.message.clone()),
                        ))
                        .await?;
                    return Ok(StageResolution {
                        outcome: StageOutcome::Recovered,
                        final_attempt: attempt,
                        payload: Some(partial),
                        reduced_confidence: true,
                        error: Some(err.message),
                    });
                }
                FailureKind::Blocking => {
                    warn!(stage = def.id.value(), "stage blocked: {}", err.message);
                    ctx.store
                        .append_run(&record(
                            StageOutcome::Blocked,
                            Some(FailureKind::Blocking),
                            None,
                            false,
                            Some(err.message.clone()),
                        ))
                        .await?;
                    return Ok(StageResolution {
                        outcome: StageOutcome::Blocked,
                        final_attempt: attempt,
                        payload: None,
                        reduced_confidence: false,
                        error: Some(err.message),
                    });
                }
                FailureKind::Fatal => {
                    warn!(stage = def.id.value(), "fatal failure: {}", err.message);
                    ctx.store
                        .append_run(&record(
                            StageOutcome::Fatal,
                            Some(FailureKind::Fatal),
                            None,
                            false,
                            Some(err.message.clone()),
                        ))
                        .await?;
                    return Ok(StageResolution {
                        outcome: StageOutcome::Fatal,
                        final_attempt: attempt,
                        payload: None,
                        reduced_confidence: false,
                        error: Some(err.message),
                    });
                }
                FailureKind::Transient => {
                    let attempts_used = attempt - starting_attempt.max(1) + 1;
                    if attempts_used >= ctx.retry.max_attempts {
                        let message =
                            format!("transient retries exhausted: {}", err.message);
                        warn!(stage = def.id.value(), "{message}");
                        ctx.store
                            .append_run(&record(
                                StageOutcome::Blocked,
                                Some(FailureKind::Blocking),
                                None,
                                false,
                                Some(message.clone()),
                            ))
                            .await?;
                        return Ok(StageResolution {
                            outcome: StageOutcome::Blocked,
                            final_attempt: attempt,
                            payload: None,
                            reduced_confidence: false,
                            error: Some(message),
                        });
                    }

                    ctx.store
                        .append_run(&record(
                            StageOutcome::FailedAttempt,
                            Some(FailureKind::Transient),
                            None,
                            false,
                            Some(err.message.clone()),
                        ))
                        .await?;
                    let backoff = ctx.retry.backoff(attempts_used);
                    info!(
                        stage = def.id.value(),
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "transient failure, retrying: {}",
                        err.message
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            },
        }
    }
}
