pub mod identifiers;
pub mod project;
pub mod routing;
pub mod stage;

pub use identifiers::{ProjectId, StageId};
pub use project::{Project, ProjectStatus};
pub use routing::{ComplexityClass, CostMeter, RoutingDecisionRecord, Tier, TierSpec};
pub use stage::{content_hash, FailureKind, StageOutcome, StageRunRecord, WorkError};
