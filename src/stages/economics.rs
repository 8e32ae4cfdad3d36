//! Stage 7 (Market Snapshot), stage 8 (Cost Model), stage 9 (Feasibility
//! Score).

use serde_json::json;

use super::{lookup_key, reason};
use crate::executor::{StageContext, StageInputs, WorkFuture};
use crate::registry::StageDefinition;
use crate::types::WorkError;

pub(super) fn market_snapshot<'a>(
    def: &'a StageDefinition,
    ctx: &'a StageContext<'a>,
    inputs: &'a StageInputs,
) -> WorkFuture<'a> {
    Box::pin(async move {
        let key = lookup_key(inputs)?;
        let snapshot = reason(
            ctx,
            def.complexity,
            &json!({ "task": "market-snapshot", "lookup_key": key }),
        )
        .await?;
        Ok(json!({ "snapshot": snapshot }))
    })
}

/// Build the development cost model. Site constraints and the parking plan
/// are hard inputs; a blocked upstream blocks the model.
pub(super) fn cost_model<'a>(
    def: &'a StageDefinition,
    ctx: &'a StageContext<'a>,
    inputs: &'a StageInputs,
) -> WorkFuture<'a> {
    Box::pin(async move {
        let constraints = inputs.require(3)?;
        let plan = inputs.require(4)?;
        let model = reason(
            ctx,
            def.complexity,
            &json!({
                "task": "cost-model",
                "constraints": constraints,
                "parking": plan,
                "snapshot": inputs.optional(7),
            }),
        )
        .await?;
        Ok(json!({ "cost_model": model, "inputs": [3, 4] }))
    })
}

/// Score overall feasibility. The cost model is required; zoning, parking,
/// and traffic enrich the score and their absence lowers confidence instead
/// of blocking.
pub(super) fn feasibility_score<'a>(
    def: &'a StageDefinition,
    ctx: &'a StageContext<'a>,
    inputs: &'a StageInputs,
) -> WorkFuture<'a> {
    Box::pin(async move {
        let cost = inputs.require(8)?;
        let enriching = [2_u32, 4, 5];
        let missing: Vec<u32> = enriching
            .iter()
            .copied()
            .filter(|&stage| inputs.optional(stage).is_none())
            .collect();

        let score = reason(
            ctx,
            def.complexity,
            &json!({
                "task": "feasibility-score",
                "cost_model": cost,
                "zoning": inputs.optional(2),
                "parking": inputs.optional(4),
                "traffic": inputs.optional(5),
                "snapshot": inputs.optional(7),
            }),
        )
        .await?;

        if missing.is_empty() {
            Ok(json!({ "score": score, "confidence": "high" }))
        } else {
            Err(WorkError::degraded(
                format!("scoring without upstream stages {missing:?}"),
                json!({ "score": score, "confidence": "low" }),
            ))
        }
    })
}
