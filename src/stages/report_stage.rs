//! Stage 10 (Report Assembly).

use serde_json::{json, Map, Value};

use crate::collaborators::FetchError;
use crate::executor::{StageContext, StageInputs, WorkFuture};
use crate::registry::StageDefinition;
use crate::types::WorkError;

/// Assemble the final report from whatever upstream sections exist. Blocked
/// upstream stages are named in the document instead of failing the run. A
/// missing template degrades to an inline document at reduced confidence; a
/// renderer outage is transient and retried.
pub(super) fn report_assembly<'a>(
    _def: &'a StageDefinition,
    ctx: &'a StageContext<'a>,
    inputs: &'a StageInputs,
) -> WorkFuture<'a> {
    Box::pin(async move {
        let discovery = inputs.require(1)?;

        let mut sections = Map::new();
        sections.insert("property".to_string(), discovery.clone());
        for stage in 2..=9_u32 {
            if let Some(output) = inputs.optional(stage) {
                sections.insert(format!("stage_{stage}"), output.clone());
            }
        }

        let blocked: Vec<u32> = inputs
            .unavailable_stages()
            .into_iter()
            .filter(|&stage| stage >= 1)
            .collect();

        match ctx.renderer.fetch("template/feasibility-report").await {
            Ok(template) => Ok(json!({
                "document": {
                    "format": "rendered",
                    "template": template,
                    "sections": sections,
                },
                "blocked_stages": blocked,
            })),
            Err(FetchError::NotFound) => Err(WorkError::degraded(
                "report template missing, emitting inline document",
                json!({
                    "document": { "format": "inline", "sections": sections },
                    "blocked_stages": blocked,
                }),
            )),
            Err(unavailable) => Err(unavailable.into()),
        }
    })
}
