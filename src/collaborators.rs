//! External collaborators consumed at their interface boundary.
//!
//! Property registry, zoning-code source, and document renderer are all the
//! same capability shape: `fetch(key) -> data | NotFound | Unavailable`.
//! Reasoning tiers expose `invoke(tier, payload)`. Production bindings run
//! configured shell commands; tests substitute scripted implementations.

use std::process::Stdio;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::types::{Tier, WorkError};

/// Exit code a collaborator command uses to signal a missing record.
const NOTFOUND_EXIT_CODE: i32 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    NotFound,
    Unavailable(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Unavailable(detail) => write!(f, "unavailable: {detail}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<FetchError> for WorkError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::NotFound => Self::blocking("collaborator record not found"),
            FetchError::Unavailable(detail) => {
                Self::transient(format!("collaborator unavailable: {detail}"))
            }
        }
    }
}

pub type FetchFuture<'a> = BoxFuture<'a, Result<Value, FetchError>>;
pub type InvokeFuture<'a> = BoxFuture<'a, Result<Value, String>>;

pub trait Capability: Send + Sync {
    fn fetch<'a>(&'a self, key: &'a str) -> FetchFuture<'a>;
}

pub trait ReasoningService: Send + Sync {
    fn invoke<'a>(&'a self, tier: Tier, payload: &'a Value) -> InvokeFuture<'a>;
}

/// The full collaborator wiring a controller needs for one deployment.
#[derive(Clone)]
pub struct CollaboratorSet {
    pub reasoning: Arc<dyn ReasoningService>,
    pub property_registry: Arc<dyn Capability>,
    pub zoning_source: Arc<dyn Capability>,
    pub renderer: Arc<dyn Capability>,
}

/// Capability backed by a shell command template with `{key}` substitution.
/// Exit code 4 maps to `NotFound`, any other failure to `Unavailable`, and
/// stdout is parsed as JSON.
pub struct CommandCapability {
    name: &'static str,
    template: String,
}

impl CommandCapability {
    #[must_use]
    pub const fn new(name: &'static str, template: String) -> Self {
        Self { name, template }
    }
}

impl Capability for CommandCapability {
    fn fetch<'a>(&'a self, key: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            let command_line = self.template.replace("{key}", key);
            debug!(collaborator = self.name, %command_line, "fetching");

            let output = Command::new("sh")
                .arg("-c")
                .arg(&command_line)
                .output()
                .await
                .map_err(|e| FetchError::Unavailable(format!("spawn failed: {e}")))?;

            if output.status.code() == Some(NOTFOUND_EXIT_CODE) {
                return Err(FetchError::NotFound);
            }
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(FetchError::Unavailable(format!(
                    "{} exited {:?}: {}",
                    self.name,
                    output.status.code(),
                    stderr.trim()
                )));
            }

            serde_json::from_slice(&output.stdout)
                .map_err(|e| FetchError::Unavailable(format!("malformed JSON: {e}")))
        })
    }
}

/// Reasoning service backed by a shell command template with `{tier}`
/// substitution; the prompt payload is written to stdin as JSON.
pub struct CommandReasoningService {
    template: String,
}

impl CommandReasoningService {
    #[must_use]
    pub const fn new(template: String) -> Self {
        Self { template }
    }
}

impl ReasoningService for CommandReasoningService {
    fn invoke<'a>(&'a self, tier: Tier, payload: &'a Value) -> InvokeFuture<'a> {
        Box::pin(async move {
            let command_line = self.template.replace("{tier}", tier.as_str());
            debug!(tier = tier.as_str(), %command_line, "invoking reasoning tier");

            let mut child = Command::new("sh")
                .arg("-c")
                .arg(&command_line)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|e| format!("spawn failed: {e}"))?;

            if let Some(mut stdin) = child.stdin.take() {
                let prompt = payload.to_string();
                stdin
                    .write_all(prompt.as_bytes())
                    .await
                    .map_err(|e| format!("stdin write failed: {e}"))?;
            }

            let output = child
                .wait_with_output()
                .await
                .map_err(|e| format!("wait failed: {e}"))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(format!(
                    "tier {} exited {:?}: {}",
                    tier,
                    output.status.code(),
                    stderr.trim()
                ));
            }

            serde_json::from_slice(&output.stdout).map_err(|e| format!("malformed JSON: {e}"))
        })
    }
}
