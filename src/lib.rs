pub mod collaborators;
pub mod controller;
pub mod error;
pub mod executor;
pub mod recovery;
pub mod registry;
pub mod report;
pub mod router;
pub mod stages;
pub mod store;
pub mod types;

pub use controller::{PipelineController, RunOptions};
pub use error::{PipelineError, Result};
pub use registry::{StageRegistry, STAGE_COUNT};
pub use report::RunReport;
pub use types::*;
