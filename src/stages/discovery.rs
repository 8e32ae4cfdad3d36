//! Stage 1 (Property Discovery) and stage 6 (Utility Screen).

use serde_json::json;

use super::{lookup_key, reason, seed_input};
use crate::executor::{StageContext, StageInputs, WorkFuture};
use crate::registry::StageDefinition;
use crate::types::WorkError;

/// Resolve the run's starting address into a canonical parcel record. The
/// lookup key every later stage uses is fixed here.
pub(super) fn property_discovery<'a>(
    _def: &'a StageDefinition,
    ctx: &'a StageContext<'a>,
    inputs: &'a StageInputs,
) -> WorkFuture<'a> {
    Box::pin(async move {
        let seed = seed_input(inputs)?;
        let key = seed
            .get("lookup_key")
            .or_else(|| seed.get("address"))
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| WorkError::fatal("run input carries neither lookup_key nor address"))?;

        let parcel = ctx.property_registry.fetch(key).await?;
        Ok(json!({ "parcel": parcel, "lookup_key": key }))
    })
}

/// Screen water, sewer, and power availability for the parcel.
pub(super) fn utility_screen<'a>(
    def: &'a StageDefinition,
    ctx: &'a StageContext<'a>,
    inputs: &'a StageInputs,
) -> WorkFuture<'a> {
    Box::pin(async move {
        let key = lookup_key(inputs)?;
        let parcel = inputs.require(1)?;
        let response = reason(
            ctx,
            def.complexity,
            &json!({
                "task": "utility-screen",
                "lookup_key": key,
                "parcel": parcel.get("parcel"),
            }),
        )
        .await?;
        Ok(json!({ "utilities": response }))
    })
}
