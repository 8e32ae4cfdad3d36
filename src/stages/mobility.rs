//! Stage 4 (Parking Plan) and stage 5 (Traffic Memo).

use serde_json::json;

use super::{lookup_key, reason};
use crate::executor::{StageContext, StageInputs, WorkFuture};
use crate::registry::StageDefinition;
use crate::types::WorkError;

/// Size the parking program. Without a zoning matrix the stage falls back to
/// municipal default ratios at reduced confidence instead of blocking.
pub(super) fn parking_plan<'a>(
    def: &'a StageDefinition,
    ctx: &'a StageContext<'a>,
    inputs: &'a StageInputs,
) -> WorkFuture<'a> {
    Box::pin(async move {
        let key = lookup_key(inputs)?;

        let Some(zoning) = inputs.optional(2) else {
            return Err(WorkError::degraded(
                "zoning matrix unavailable, applying municipal default ratios",
                json!({
                    "plan": {
                        "ratio_source": "municipal-code-default",
                        "lookup_key": key,
                    },
                    "basis": "municipal-default-ratios",
                }),
            ));
        };

        let plan = reason(
            ctx,
            def.complexity,
            &json!({
                "task": "parking-plan",
                "lookup_key": key,
                "matrix": zoning.get("matrix"),
                "parcel": inputs.require(1)?.get("parcel"),
            }),
        )
        .await?;

        Ok(json!({ "plan": plan, "basis": "zoning-matrix" }))
    })
}

/// Draft the traffic memo from trip-generation estimates for the parcel.
pub(super) fn traffic_memo<'a>(
    def: &'a StageDefinition,
    ctx: &'a StageContext<'a>,
    inputs: &'a StageInputs,
) -> WorkFuture<'a> {
    Box::pin(async move {
        let key = lookup_key(inputs)?;
        let memo = reason(
            ctx,
            def.complexity,
            &json!({
                "task": "traffic-memo",
                "lookup_key": key,
                "parcel": inputs.require(1)?.get("parcel"),
                "zoning": inputs.optional(2),
            }),
        )
        .await?;
        Ok(json!({ "memo": memo, "basis": "trip-generation-estimates" }))
    })
}
