use serde::{Deserialize, Serialize};
use std::fmt;

/// Project identifier in the canonical `SPT-YYYY-NNN` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
    /// Parse a canonical project id, rejecting anything outside `SPT-\d{4}-\d{3}`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        if Self::is_canonical(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(format!("not a canonical SPT-YYYY-NNN id: {raw}"))
        }
    }

    #[must_use]
    pub fn is_canonical(raw: &str) -> bool {
        let bytes = raw.as_bytes();
        bytes.len() == 12
            && raw.starts_with("SPT-")
            && bytes[4..8].iter().all(u8::is_ascii_digit)
            && bytes[8] == b'-'
            && bytes[9..12].iter().all(u8::is_ascii_digit)
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One-based stage identifier within the fixed ten-stage sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StageId(u32);

impl StageId {
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
