//! Stage 2 (Zoning Analysis) and stage 3 (Site Constraints).

use serde_json::{json, Value};

use super::{lookup_key, reason};
use crate::collaborators::FetchError;
use crate::executor::{StageContext, StageInputs, WorkFuture};
use crate::registry::StageDefinition;
use crate::types::WorkError;

/// Determine the zoning district and build the allowed-use matrix. A parcel
/// with no district on file blocks the stage; zoning questions cannot be
/// answered by guessing.
pub(super) fn zoning_analysis<'a>(
    def: &'a StageDefinition,
    ctx: &'a StageContext<'a>,
    inputs: &'a StageInputs,
) -> WorkFuture<'a> {
    Box::pin(async move {
        let key = lookup_key(inputs)?;
        let district = ctx
            .zoning_source
            .fetch(&format!("district/{key}"))
            .await
            .map_err(|err| match err {
                FetchError::NotFound => {
                    WorkError::blocking(format!("no zoning district on file for {key}"))
                }
                other => other.into(),
            })?;

        let matrix = reason(
            ctx,
            def.complexity,
            &json!({
                "task": "zoning-matrix",
                "district": district,
                "parcel": inputs.require(1)?.get("parcel"),
            }),
        )
        .await?;

        Ok(json!({ "district": district, "matrix": matrix }))
    })
}

/// Screen environmental and physical site constraints. Missing constraint
/// layers degrade to a preliminary screen rather than blocking the run.
pub(super) fn site_constraints<'a>(
    def: &'a StageDefinition,
    ctx: &'a StageContext<'a>,
    inputs: &'a StageInputs,
) -> WorkFuture<'a> {
    Box::pin(async move {
        let key = lookup_key(inputs)?;
        let layers = match ctx.zoning_source.fetch(&format!("constraints/{key}")).await {
            Ok(layers) => layers,
            Err(FetchError::NotFound) => {
                return Err(WorkError::degraded(
                    format!("no constraint layers on file for {key}"),
                    json!({ "constraints": [], "screen_level": "preliminary" }),
                ));
            }
            Err(unavailable) => return Err(unavailable.into()),
        };

        let response = reason(
            ctx,
            def.complexity,
            &json!({
                "task": "site-constraints",
                "layers": layers,
                "parcel": inputs.require(1)?.get("parcel"),
            }),
        )
        .await?;

        let screen_level = response
            .get("screen_level")
            .cloned()
            .unwrap_or_else(|| Value::from("full"));
        Ok(json!({ "constraints": response, "screen_level": screen_level }))
    })
}
