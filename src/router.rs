//! Cost-tier router.
//!
//! Selects a reasoning-service tier per call, holding the cheapest tier's
//! realized share of recent calls under a configured ceiling. The rolling
//! window is an explicit shared accumulator behind a mutex; races only bias
//! cost distribution, never correctness.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use tracing::{debug, warn};

use crate::collaborators::ReasoningService;
use crate::error::{PipelineError, Result};
use crate::recovery::RetrySettings;
use crate::store::StateStore;
use crate::types::{
    ComplexityClass, CostMeter, ProjectId, RoutingDecisionRecord, Tier, TierSpec, WorkError,
};

#[derive(Debug, Clone, PartialEq)]
pub struct RouterConfig {
    /// Tier catalog, ascending by cost. The top tier must cover `Critical`.
    pub tiers: Vec<TierSpec>,
    /// Rolling-fraction ceiling for the cheapest tier (target band top).
    pub cheap_ceiling: f64,
    /// Bounded trailing window size for the rolling fraction.
    pub window: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                TierSpec::new(Tier::Free, ComplexityClass::Routine, 0),
                TierSpec::new(Tier::Basic, ComplexityClass::Standard, 120),
                TierSpec::new(Tier::Extended, ComplexityClass::Elevated, 450),
                TierSpec::new(Tier::Premier, ComplexityClass::Complex, 1_800),
                TierSpec::new(Tier::Frontier, ComplexityClass::Critical, 7_500),
            ],
            cheap_ceiling: 0.55,
            window: 200,
        }
    }
}

#[derive(Debug)]
struct RollingWindow {
    samples: VecDeque<bool>,
    cap: usize,
}

impl RollingWindow {
    fn new(cap: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(cap),
            cap,
        }
    }

    fn push(&mut self, served_by_cheapest: bool) {
        if self.samples.len() == self.cap {
            self.samples.pop_front();
        }
        self.samples.push_back(served_by_cheapest);
    }

    fn fraction(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let hits = self.samples.iter().filter(|&&hit| hit).count();
        #[allow(clippy::cast_precision_loss)]
        {
            hits as f64 / self.samples.len() as f64
        }
    }
}

/// Shared router instance. Independent project runs hold the same handle so
/// the rolling fraction reflects global recent load.
pub struct TierRouter {
    config: RouterConfig,
    window: Mutex<RollingWindow>,
}

impl TierRouter {
    pub fn new(config: RouterConfig) -> Result<Self> {
        if config.tiers.is_empty() {
            return Err(PipelineError::ConfigError(
                "tier catalog must not be empty".to_string(),
            ));
        }
        for pair in config.tiers.windows(2) {
            if pair[0].unit_cost_microdollars > pair[1].unit_cost_microdollars
                || pair[0].tier.rank() >= pair[1].tier.rank()
            {
                return Err(PipelineError::ConfigError(
                    "tier catalog must ascend in rank and cost".to_string(),
                ));
            }
        }
        let covers_critical = config
            .tiers
            .last()
            .is_some_and(|spec| spec.covers(ComplexityClass::Critical));
        if !covers_critical {
            return Err(PipelineError::ConfigError(
                "top tier must cover critical complexity".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&config.cheap_ceiling) || config.window == 0 {
            return Err(PipelineError::ConfigError(
                "cheap_ceiling must be within [0, 1] and window nonzero".to_string(),
            ));
        }
        let window = Mutex::new(RollingWindow::new(config.window));
        Ok(Self { config, window })
    }

    /// Pick a tier for the given complexity class.
    pub fn select(&self, class: ComplexityClass) -> Result<TierSpec> {
        self.select_excluding(class, &[])
    }

    /// Pick a tier, skipping tiers that already failed this work item.
    /// Cheapest eligible wins unless it is the global cheapest tier and the
    /// rolling fraction sits at or above the ceiling; capability is never
    /// sacrificed to the ceiling.
    pub fn select_excluding(&self, class: ComplexityClass, excluded: &[Tier]) -> Result<TierSpec> {
        let eligible: Vec<&TierSpec> = self
            .config
            .tiers
            .iter()
            .filter(|spec| spec.covers(class) && !excluded.contains(&spec.tier))
            .collect();

        let Some(&first) = eligible.first() else {
            return Err(PipelineError::Internal(format!(
                "no tier available for complexity {class} after {} exclusions",
                excluded.len()
            )));
        };

        let cheapest_tier = self.config.tiers[0].tier;
        let mut window = self
            .window
            .lock()
            .map_err(|_| PipelineError::Internal("router window poisoned".to_string()))?;

        let chosen = if first.tier == cheapest_tier
            && eligible.len() > 1
            && window.fraction() >= self.config.cheap_ceiling
        {
            eligible[1]
        } else {
            first
        };

        window.push(chosen.tier == cheapest_tier);
        debug!(
            class = class.as_str(),
            tier = chosen.tier.as_str(),
            fraction = window.fraction(),
            "routed reasoning call"
        );
        Ok(*chosen)
    }

    /// Realized cheapest-tier fraction over the trailing window.
    pub fn cheapest_fraction(&self) -> Result<f64> {
        self.window
            .lock()
            .map(|window| window.fraction())
            .map_err(|_| PipelineError::Internal("router window poisoned".to_string()))
    }
}

/// Route one reasoning call, retrying the selected tier with backoff and
/// escalating past tiers that keep failing. Every call is appended to the
/// decision trail. A service error prefixed `fatal:` marks a configuration
/// invariant violation and is not retried.
pub async fn invoke_with_escalation(
    router: &TierRouter,
    service: &dyn ReasoningService,
    store: &dyn StateStore,
    project_id: &ProjectId,
    meter: &CostMeter,
    retry: &RetrySettings,
    class: ComplexityClass,
    payload: &serde_json::Value,
) -> std::result::Result<serde_json::Value, WorkError> {
    let mut excluded: Vec<Tier> = Vec::new();
    let mut last_error = String::new();

    loop {
        let spec = match router.select_excluding(class, &excluded) {
            Ok(spec) => spec,
            Err(err) => {
                return Err(WorkError::transient(format!(
                    "all tiers exhausted for {class}: {last_error} ({err})"
                )));
            }
        };

        for attempt in 1..=retry.max_attempts {
            let started = Instant::now();
            let outcome = service.invoke(spec.tier, payload).await;
            let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            meter.record(spec.unit_cost_microdollars);

            let decision = RoutingDecisionRecord::new(
                project_id.clone(),
                class,
                &spec,
                latency_ms,
                outcome.is_ok(),
            );
            if let Err(err) = store.append_decision(&decision).await {
                warn!("failed to append routing decision: {err}");
            }

            match outcome {
                Ok(value) => return Ok(value),
                Err(message) if message.starts_with("fatal:") => {
                    return Err(WorkError::fatal(message));
                }
                Err(message) => {
                    last_error = message;
                    if attempt < retry.max_attempts {
                        tokio::time::sleep(retry.backoff(attempt)).await;
                    }
                }
            }
        }

        excluded.push(spec.tier);
    }
}
