//! Work functions for the ten analysis stages.
//!
//! Each stage is a free function matching [`WorkFn`]: it reads upstream
//! outputs, talks to collaborators through the context, and returns a payload
//! carrying the stage's declared output keys. Failure classification happens
//! here, at the point where the failure is understood.

use serde_json::Value;

use crate::executor::{StageContext, StageInputs, WorkFn, SEED_INPUT};
use crate::router::invoke_with_escalation;
use crate::types::{ComplexityClass, WorkError};

mod discovery;
mod economics;
mod mobility;
mod report_stage;
mod zoning;

/// Dispatch the work function for a catalog stage id.
#[must_use]
pub fn work_for(stage: u32) -> Option<WorkFn> {
    match stage {
        1 => Some(discovery::property_discovery),
        2 => Some(zoning::zoning_analysis),
        3 => Some(zoning::site_constraints),
        4 => Some(mobility::parking_plan),
        5 => Some(mobility::traffic_memo),
        6 => Some(discovery::utility_screen),
        7 => Some(economics::market_snapshot),
        8 => Some(economics::cost_model),
        9 => Some(economics::feasibility_score),
        10 => Some(report_stage::report_assembly),
        _ => None,
    }
}

/// Route one reasoning call through the tier router for this stage.
pub(crate) async fn reason(
    ctx: &StageContext<'_>,
    class: ComplexityClass,
    payload: &Value,
) -> Result<Value, WorkError> {
    invoke_with_escalation(
        ctx.router,
        ctx.reasoning,
        ctx.store,
        ctx.project_id,
        ctx.meter,
        ctx.retry,
        class,
        payload,
    )
    .await
}

/// The parcel lookup key produced by stage 1, needed by every dependent.
pub(crate) fn lookup_key(inputs: &StageInputs) -> Result<String, WorkError> {
    let discovery = inputs.require(1)?;
    discovery
        .get("lookup_key")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| WorkError::fatal("discovery output lost its lookup_key"))
}

/// The run's starting input carried on the seed pseudo-stage.
pub(crate) fn seed_input(inputs: &StageInputs) -> Result<&Value, WorkError> {
    inputs.require(SEED_INPUT)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::work_for;
    use crate::collaborators::{Capability, FetchError, FetchFuture, InvokeFuture, ReasoningService};
    use crate::executor::{StageContext, StageExecutor, StageInputs, SEED_INPUT};
    use crate::recovery::RetrySettings;
    use crate::registry::StageRegistry;
    use crate::router::{RouterConfig, TierRouter};
    use crate::store::MemoryStore;
    use crate::types::{CostMeter, FailureKind, ProjectId, Tier, WorkError};
    use serde_json::{json, Value};

    /// Capability that answers every key with one canned value.
    struct Canned(Value);

    impl Capability for Canned {
        fn fetch<'a>(&'a self, _key: &'a str) -> FetchFuture<'a> {
            let value = self.0.clone();
            Box::pin(async move { Ok(value) })
        }
    }

    struct Missing;

    impl Capability for Missing {
        fn fetch<'a>(&'a self, _key: &'a str) -> FetchFuture<'a> {
            Box::pin(async { Err(FetchError::NotFound) })
        }
    }

    struct Down;

    impl Capability for Down {
        fn fetch<'a>(&'a self, _key: &'a str) -> FetchFuture<'a> {
            Box::pin(async { Err(FetchError::Unavailable("render farm 503".to_string())) })
        }
    }

    /// Reasoning stub echoing the tier it was reached on.
    struct Echo;

    impl ReasoningService for Echo {
        fn invoke<'a>(&'a self, tier: Tier, payload: &'a Value) -> InvokeFuture<'a> {
            let mut out = payload.clone();
            if let Some(object) = out.as_object_mut() {
                object.insert("served_by".to_string(), json!(tier.as_str()));
            }
            Box::pin(async move { Ok(out) })
        }
    }

    struct Fixture {
        store: MemoryStore,
        router: TierRouter,
        project_id: ProjectId,
        meter: CostMeter,
        retry: RetrySettings,
        registry: StageRegistry,
        reasoning: Echo,
        registry_source: Canned,
        zoning_source: Canned,
        renderer: Missing,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: MemoryStore::new(),
                router: TierRouter::new(RouterConfig::default()).expect("router"),
                project_id: ProjectId::parse("SPT-2025-042").expect("id"),
                meter: CostMeter::new(),
                retry: RetrySettings::new(2, 1, 2),
                registry: StageRegistry::new(),
                reasoning: Echo,
                registry_source: Canned(json!({"account": "2834-001", "acreage": 1.2})),
                zoning_source: Canned(json!({"district": "CC", "overlays": []})),
                renderer: Missing,
            }
        }

        async fn run(&self, stage: u32, inputs: &StageInputs) -> Result<Value, WorkError> {
            self.run_with(stage, inputs, &self.renderer).await
        }

        async fn run_with(
            &self,
            stage: u32,
            inputs: &StageInputs,
            renderer: &dyn Capability,
        ) -> Result<Value, WorkError> {
            let ctx = StageContext {
                project_id: &self.project_id,
                router: &self.router,
                reasoning: &self.reasoning,
                property_registry: &self.registry_source,
                zoning_source: &self.zoning_source,
                renderer,
                store: &self.store,
                meter: &self.meter,
                retry: &self.retry,
            };
            let def = self.registry.definition(stage).expect("catalog stage");
            let work = work_for(stage).expect("work function");
            StageExecutor::execute(def, work, &ctx, inputs).await.result
        }
    }

    fn with_discovery() -> StageInputs {
        let mut inputs = StageInputs::new();
        inputs.insert_available(
            1,
            json!({"parcel": {"account": "2834-001"}, "lookup_key": "2834-001"}),
        );
        inputs
    }

    #[tokio::test]
    async fn property_discovery_resolves_the_seed_address() {
        let fixture = Fixture::new();
        let mut inputs = StageInputs::new();
        inputs.insert_available(SEED_INPUT, json!({"lookup_key": "2834-001"}));

        let payload = fixture.run(1, &inputs).await.expect("discovery");
        assert_eq!(payload["lookup_key"], json!("2834-001"));
        assert_eq!(payload["parcel"]["account"], json!("2834-001"));
    }

    #[tokio::test]
    async fn parking_plan_degrades_to_default_ratios_without_zoning() {
        let fixture = Fixture::new();
        let mut inputs = with_discovery();
        inputs.insert_unavailable(2);

        let err = fixture.run(4, &inputs).await.expect_err("degraded");
        assert_eq!(err.kind, FailureKind::Degraded);
        let partial = err.partial.expect("partial plan");
        assert_eq!(partial["basis"], json!("municipal-default-ratios"));
        assert!(partial.get("plan").is_some());
    }

    #[tokio::test]
    async fn feasibility_score_degrades_when_optional_upstreams_are_blocked() {
        let fixture = Fixture::new();
        let mut inputs = with_discovery();
        inputs.insert_unavailable(2);
        inputs.insert_available(4, json!({"plan": {"stalls": 42}, "basis": "default"}));
        inputs.insert_available(5, json!({"memo": {}, "basis": "counts"}));
        inputs.insert_available(8, json!({"cost_model": {"total": 1_200_000}, "inputs": []}));

        let err = fixture.run(9, &inputs).await.expect_err("degraded");
        assert_eq!(err.kind, FailureKind::Degraded);
        let partial = err.partial.expect("partial score");
        assert_eq!(partial["confidence"], json!("low"));
    }

    #[tokio::test]
    async fn report_assembly_renders_and_names_every_blocked_stage() {
        let fixture = Fixture::new();
        let mut inputs = with_discovery();
        inputs.insert_unavailable(2);
        for stage in 3..=9 {
            inputs.insert_available(stage, json!({"placeholder": stage}));
        }

        let template = Canned(json!({"template": "standard-v1"}));
        let payload = fixture
            .run_with(10, &inputs, &template)
            .await
            .expect("report");
        assert_eq!(payload["blocked_stages"], json!([2]));
        assert_eq!(payload["document"]["format"], json!("rendered"));
    }

    #[tokio::test]
    async fn report_assembly_degrades_to_inline_when_the_template_is_missing() {
        let fixture = Fixture::new();
        let mut inputs = with_discovery();
        inputs.insert_unavailable(2);

        let err = fixture
            .run_with(10, &inputs, &Missing)
            .await
            .expect_err("degraded");
        assert_eq!(err.kind, FailureKind::Degraded);
        let partial = err.partial.expect("inline document");
        assert_eq!(partial["document"]["format"], json!("inline"));
        assert_eq!(partial["blocked_stages"], json!([2]));
    }

    #[tokio::test]
    async fn report_assembly_treats_a_renderer_outage_as_transient() {
        let fixture = Fixture::new();
        let inputs = with_discovery();

        let err = fixture
            .run_with(10, &inputs, &Down)
            .await
            .expect_err("transient");
        assert_eq!(err.kind, FailureKind::Transient);
    }

    #[tokio::test]
    async fn cost_model_blocks_when_a_hard_dependency_is_blocked() {
        let fixture = Fixture::new();
        let mut inputs = with_discovery();
        inputs.insert_unavailable(3);
        inputs.insert_available(4, json!({"plan": {}, "basis": "default"}));

        let err = fixture.run(8, &inputs).await.expect_err("blocked");
        assert_eq!(err.kind, FailureKind::Blocking);
    }
}
