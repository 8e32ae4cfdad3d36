//! Cost-tier routing types.
//!
//! Tiers are an ordered bracket of reasoning-service cost/capability; every
//! routing decision is recorded for audit and for the rolling cheapest-tier
//! fraction.

use super::identifiers::ProjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Declared complexity class of a unit of work, ordered cheapest to handle
/// first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityClass {
    Routine,
    Standard,
    Elevated,
    Complex,
    Critical,
}

impl ComplexityClass {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Routine => "routine",
            Self::Standard => "standard",
            Self::Elevated => "elevated",
            Self::Complex => "complex",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ComplexityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for ComplexityClass {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, String> {
        match s {
            "routine" => Ok(Self::Routine),
            "standard" => Ok(Self::Standard),
            "elevated" => Ok(Self::Elevated),
            "complex" => Ok(Self::Complex),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Unknown complexity class: {s}")),
        }
    }
}

/// Reasoning-service tier, ranked cheapest to most capable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Basic,
    Extended,
    Premier,
    Frontier,
}

impl Tier {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Basic => "basic",
            Self::Extended => "extended",
            Self::Premier => "premier",
            Self::Frontier => "frontier",
        }
    }

    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Free => 0,
            Self::Basic => 1,
            Self::Extended => 2,
            Self::Premier => 3,
            Self::Frontier => 4,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Tier {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, String> {
        match s {
            "free" => Ok(Self::Free),
            "basic" => Ok(Self::Basic),
            "extended" => Ok(Self::Extended),
            "premier" => Ok(Self::Premier),
            "frontier" => Ok(Self::Frontier),
            _ => Err(format!("Unknown tier: {s}")),
        }
    }
}

/// One tier's capability ceiling and estimated per-call cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSpec {
    pub tier: Tier,
    pub max_complexity: ComplexityClass,
    pub unit_cost_microdollars: u64,
}

impl TierSpec {
    #[must_use]
    pub const fn new(tier: Tier, max_complexity: ComplexityClass, unit_cost: u64) -> Self {
        Self {
            tier,
            max_complexity,
            unit_cost_microdollars: unit_cost,
        }
    }

    #[must_use]
    pub fn covers(&self, class: ComplexityClass) -> bool {
        self.max_complexity >= class
    }
}

/// One reasoning call's routing decision, appended to the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecisionRecord {
    pub project_id: ProjectId,
    pub complexity: ComplexityClass,
    pub tier: Tier,
    pub estimated_cost_microdollars: u64,
    pub latency_ms: u64,
    pub success: bool,
    pub decided_at: DateTime<Utc>,
}

impl RoutingDecisionRecord {
    #[must_use]
    pub fn new(
        project_id: ProjectId,
        complexity: ComplexityClass,
        spec: &TierSpec,
        latency_ms: u64,
        success: bool,
    ) -> Self {
        Self {
            project_id,
            complexity,
            tier: spec.tier,
            estimated_cost_microdollars: spec.unit_cost_microdollars,
            latency_ms,
            success,
            decided_at: Utc::now(),
        }
    }
}

/// Per-run cost accumulator shared across a stage's routed calls. Races bias
/// reporting only, so relaxed ordering is enough.
#[derive(Debug, Default)]
pub struct CostMeter {
    calls: AtomicU64,
    microdollars: AtomicU64,
}

impl CostMeter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
            microdollars: AtomicU64::new(0),
        }
    }

    pub fn record(&self, microdollars: u64) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.microdollars.fetch_add(microdollars, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.calls.load(Ordering::Relaxed),
            self.microdollars.load(Ordering::Relaxed),
        )
    }
}
