//! Stage executor: one observable attempt.
//!
//! Wraps a stage's work function, records wall-clock timing, captures any
//! classified failure, and validates the success payload against the stage's
//! declared output schema. Retrying belongs to the recovery policy, not here.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::collaborators::{Capability, ReasoningService};
use crate::error::PipelineError;
use crate::recovery::RetrySettings;
use crate::registry::StageDefinition;
use crate::router::TierRouter;
use crate::store::StateStore;
use crate::types::{CostMeter, ProjectId, WorkError};

/// Pseudo-stage id carrying the run's starting input into stage 1.
pub const SEED_INPUT: u32 = 0;

pub type WorkFuture<'a> = BoxFuture<'a, Result<Value, WorkError>>;

/// Work function binding: pure dispatch, no captured state.
pub type WorkFn =
    for<'a> fn(&'a StageDefinition, &'a StageContext<'a>, &'a StageInputs) -> WorkFuture<'a>;

/// Everything a work function may touch: collaborators, the router, the
/// decision trail, and the per-run cost meter.
pub struct StageContext<'a> {
    pub project_id: &'a ProjectId,
    pub router: &'a TierRouter,
    pub reasoning: &'a dyn ReasoningService,
    pub property_registry: &'a dyn Capability,
    pub zoning_source: &'a dyn Capability,
    pub renderer: &'a dyn Capability,
    pub store: &'a dyn StateStore,
    pub meter: &'a CostMeter,
    pub retry: &'a RetrySettings,
}

/// Output of one upstream stage as seen by a downstream consumer. Blocked
/// upstreams surface as an explicit sentinel, never as silently missing data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamOutput {
    Available(Value),
    Unavailable,
}

/// Accumulated upstream outputs keyed by stage id.
#[derive(Debug, Default, Clone)]
pub struct StageInputs {
    outputs: BTreeMap<u32, UpstreamOutput>,
}

impl StageInputs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_available(&mut self, stage: u32, payload: Value) {
        self.outputs.insert(stage, UpstreamOutput::Available(payload));
    }

    pub fn insert_unavailable(&mut self, stage: u32) {
        self.outputs.insert(stage, UpstreamOutput::Unavailable);
    }

    #[must_use]
    pub fn contains(&self, stage: u32) -> bool {
        self.outputs.contains_key(&stage)
    }

    /// Hard dependency: a blocked upstream propagates a `Blocking` failure.
    pub fn require(&self, stage: u32) -> Result<&Value, WorkError> {
        match self.outputs.get(&stage) {
            Some(UpstreamOutput::Available(value)) => Ok(value),
            Some(UpstreamOutput::Unavailable) => Err(WorkError::blocking(format!(
                "required upstream stage {stage} is blocked"
            ))),
            None => Err(WorkError::fatal(format!(
                "required upstream stage {stage} was never presented"
            ))),
        }
    }

    /// Soft dependency: consumers degrade instead of blocking.
    #[must_use]
    pub fn optional(&self, stage: u32) -> Option<&Value> {
        match self.outputs.get(&stage) {
            Some(UpstreamOutput::Available(value)) => Some(value),
            _ => None,
        }
    }

    /// Stage ids presented as unavailable sentinels, ascending.
    #[must_use]
    pub fn unavailable_stages(&self) -> Vec<u32> {
        self.outputs
            .iter()
            .filter(|(_, output)| matches!(output, UpstreamOutput::Unavailable))
            .map(|(&stage, _)| stage)
            .collect()
    }
}

/// One observable attempt: timing plus the classified result.
#[derive(Debug)]
pub struct ExecutionReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub result: Result<Value, WorkError>,
}

pub struct StageExecutor;

impl StageExecutor {
    /// Run one attempt of the stage's work function. A payload that fails
    /// schema validation becomes a classified failure, never a silent
    /// pass-through of malformed data.
    pub async fn execute(
        def: &StageDefinition,
        work: WorkFn,
        ctx: &StageContext<'_>,
        inputs: &StageInputs,
    ) -> ExecutionReport {
        let started_at = Utc::now();
        let result = match work(def, ctx, inputs).await {
            Ok(payload) => match validate_payload(def, &payload) {
                Ok(()) => Ok(payload),
                Err(err) => Err(WorkError::transient(err.to_string())),
            },
            Err(err) => Err(err),
        };
        ExecutionReport {
            started_at,
            completed_at: Utc::now(),
            result,
        }
    }
}

/// Check the payload is a JSON object carrying every declared output key.
pub fn validate_payload(def: &StageDefinition, payload: &Value) -> Result<(), PipelineError> {
    let Some(object) = payload.as_object() else {
        return Err(PipelineError::SchemaMismatch {
            stage: def.id.value(),
            missing_key: "<object root>".to_string(),
        });
    };
    for key in def.output_keys {
        if !object.contains_key(*key) {
            return Err(PipelineError::SchemaMismatch {
                stage: def.id.value(),
                missing_key: (*key).to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::{validate_payload, StageInputs};
    use crate::registry::StageRegistry;
    use crate::types::FailureKind;
    use serde_json::json;

    #[test]
    fn inputs_distinguish_hard_and_soft_dependencies() {
        let mut inputs = StageInputs::new();
        inputs.insert_available(1, json!({"parcel": {}}));
        inputs.insert_unavailable(2);

        assert!(inputs.require(1).is_ok());
        let blocked = inputs.require(2).expect_err("blocked upstream");
        assert_eq!(blocked.kind, FailureKind::Blocking);
        let missing = inputs.require(3).expect_err("never presented");
        assert_eq!(missing.kind, FailureKind::Fatal);

        assert!(inputs.optional(1).is_some());
        assert!(inputs.optional(2).is_none());
        assert_eq!(inputs.unavailable_stages(), vec![2]);
    }

    #[test]
    fn schema_validation_requires_every_declared_key() {
        let registry = StageRegistry::new();
        let zoning = registry.definition(2).expect("stage 2");

        assert!(validate_payload(zoning, &json!({"district": "CC", "matrix": {}})).is_ok());
        assert!(validate_payload(zoning, &json!({"district": "CC"})).is_err());
        assert!(validate_payload(zoning, &json!(["not", "an", "object"])).is_err());
    }
}
