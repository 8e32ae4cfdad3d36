//! Static ordered catalog of the ten analysis stages.
//!
//! Built once at process start and read-only afterwards. The catalog declares
//! each stage's preconditions, complexity class, and the top-level keys its
//! output payload must carry.

use crate::error::{PipelineError, Result};
use crate::types::{ComplexityClass, StageId};

pub const STAGE_COUNT: u32 = 10;

/// Immutable definition of one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDefinition {
    pub id: StageId,
    pub name: &'static str,
    /// Upstream stage ids that must have run before this stage executes.
    pub preconditions: &'static [u32],
    pub complexity: ComplexityClass,
    /// Required top-level keys of the stage's output payload.
    pub output_keys: &'static [&'static str],
}

#[derive(Debug, Clone)]
pub struct StageRegistry {
    definitions: Vec<StageDefinition>,
}

impl StageRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            definitions: builtin_catalog(),
        }
    }

    /// Ordered stage definitions, ascending by id.
    #[must_use]
    pub fn definitions(&self) -> &[StageDefinition] {
        &self.definitions
    }

    /// Look up one definition; fails with `UnknownStage` outside [1, 10].
    pub fn definition(&self, id: u32) -> Result<&StageDefinition> {
        self.definitions
            .iter()
            .find(|def| def.id.value() == id)
            .ok_or(PipelineError::UnknownStage(id))
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn builtin_catalog() -> Vec<StageDefinition> {
    let catalog: [(u32, &'static str, &'static [u32], ComplexityClass, &'static [&'static str]);
        10] = [
        (
            1,
            "Property Discovery",
            &[],
            ComplexityClass::Routine,
            &["parcel", "lookup_key"],
        ),
        (
            2,
            "Zoning Analysis",
            &[1],
            ComplexityClass::Complex,
            &["district", "matrix"],
        ),
        (
            3,
            "Site Constraints",
            &[1],
            ComplexityClass::Standard,
            &["constraints", "screen_level"],
        ),
        (
            4,
            "Parking Plan",
            &[1],
            ComplexityClass::Standard,
            &["plan", "basis"],
        ),
        (
            5,
            "Traffic Memo",
            &[1],
            ComplexityClass::Elevated,
            &["memo", "basis"],
        ),
        (
            6,
            "Utility Screen",
            &[1],
            ComplexityClass::Routine,
            &["utilities"],
        ),
        (
            7,
            "Market Snapshot",
            &[1],
            ComplexityClass::Routine,
            &["snapshot"],
        ),
        (
            8,
            "Cost Model",
            &[3, 4],
            ComplexityClass::Elevated,
            &["cost_model", "inputs"],
        ),
        (
            9,
            "Feasibility Score",
            &[8],
            ComplexityClass::Critical,
            &["score", "confidence"],
        ),
        (
            10,
            "Report Assembly",
            &[1],
            ComplexityClass::Standard,
            &["document", "blocked_stages"],
        ),
    ];

    catalog
        .into_iter()
        .map(|(id, name, preconditions, complexity, output_keys)| StageDefinition {
            id: StageId::new(id),
            name,
            preconditions,
            complexity,
            output_keys,
        })
        .collect()
}
