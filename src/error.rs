#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use thiserror::Error;

/// Error code constants for type-safe error handling
pub mod code {
    pub const CLI_ERROR: &str = "CLI_ERROR";
    pub const NOTFOUND: &str = "NOTFOUND";
    pub const INVALID: &str = "INVALID";
    pub const CONFLICT: &str = "CONFLICT";
    pub const BUSY: &str = "BUSY";
    pub const DEPENDENCY: &str = "DEPENDENCY";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const INTERNAL: &str = "INTERNAL";
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unknown stage id: {0} (valid range 1..=10)")]
    UnknownStage(u32),

    #[error("Precondition violation: stage {stage} ran before its upstream {missing}")]
    PreconditionViolation { stage: u32, missing: u32 },

    #[error("Schema mismatch in stage {stage} payload: missing key '{missing_key}'")]
    SchemaMismatch { stage: u32, missing_key: String },

    #[error("Invalid project id: {0}")]
    InvalidProjectId(String),

    #[error("Project {0} is leased by another run")]
    LeaseHeld(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Returns the protocol error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownStage(_) => code::NOTFOUND,
            Self::PreconditionViolation { .. } => code::CONFLICT,
            Self::SchemaMismatch { .. }
            | Self::InvalidProjectId(_)
            | Self::ConfigError(_)
            | Self::SerializationError(_) => code::INVALID,
            Self::LeaseHeld(_) => code::BUSY,
            Self::StoreError(_) | Self::SqlxError(_) | Self::Internal(_) => code::INTERNAL,
            Self::IoError(_) => code::DEPENDENCY,
        }
    }

    /// Returns the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigError(_) => 2,
            Self::StoreError(_) | Self::SqlxError(_) => 3,
            Self::UnknownStage(_) => 4,
            Self::PreconditionViolation { .. } => 5,
            Self::SchemaMismatch { .. } => 6,
            Self::InvalidProjectId(_) => 7,
            Self::LeaseHeld(_) => 8,
            Self::IoError(_) | Self::SerializationError(_) => 9,
            Self::Internal(_) => 10,
        }
    }
}

/// Protocol error codes as documented in the CLI
pub const ERROR_CODES: &[(&str, &str, &str)] = &[
    (
        code::CLI_ERROR,
        "Invalid CLI usage",
        "Run 'spt --help' for valid options",
    ),
    (
        code::NOTFOUND,
        "Resource was not found",
        "List stages or projects and verify the identifier",
    ),
    (
        code::INVALID,
        "Invalid request payload",
        "Validate the project id and configuration values",
    ),
    (
        code::CONFLICT,
        "Conflicting pipeline state",
        "Run 'spt status' to inspect the stage trail",
    ),
    (
        code::BUSY,
        "Project is leased by another run",
        "Retry after the lease TTL expires",
    ),
    (
        code::DEPENDENCY,
        "Missing system dependency",
        "Install the collaborator command and retry",
    ),
    (
        code::TIMEOUT,
        "Operation timed out",
        "Increase run_timeout_secs and retry",
    ),
    (
        code::INTERNAL,
        "Unexpected internal failure",
        "Inspect logs and retry the run",
    ),
];

/// Get error code details (description and fix) for a given error code
pub fn get_error_info(error_code: &str) -> Option<(&'static str, &'static str)> {
    ERROR_CODES
        .iter()
        .find(|(code, _, _)| *code == error_code)
        .map(|(_, desc, fix)| (*desc, *fix))
}

pub type Result<T> = std::result::Result<T, PipelineError>;
