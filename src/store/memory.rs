//! In-memory `StateStore` for tests and `--memory` dry runs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{PipelineError, Result};
use crate::store::{StateStore, StoreFuture};
use crate::types::{Project, ProjectId, RoutingDecisionRecord, StageId, StageRunRecord};

#[derive(Default)]
struct Inner {
    projects: HashMap<String, Project>,
    runs: HashMap<(String, u32), Vec<StageRunRecord>>,
    decisions: Vec<RoutingDecisionRecord>,
    leases: HashMap<String, (String, Instant)>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| PipelineError::Internal("memory store poisoned".to_string()))
    }

    /// Routing decisions appended so far (test inspection).
    pub fn decisions(&self) -> Result<Vec<RoutingDecisionRecord>> {
        Ok(self.lock()?.decisions.clone())
    }
}

impl StateStore for MemoryStore {
    fn get_project<'a>(&'a self, id: &'a ProjectId) -> StoreFuture<'a, Option<Project>> {
        Box::pin(async move { Ok(self.lock()?.projects.get(id.value()).cloned()) })
    }

    fn insert_project<'a>(&'a self, project: &'a Project) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.lock()?
                .projects
                .insert(project.id.value().to_string(), project.clone());
            Ok(())
        })
    }

    fn update_project<'a>(&'a self, project: &'a Project) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut inner = self.lock()?;
            if !inner.projects.contains_key(project.id.value()) {
                return Err(PipelineError::StoreError(format!(
                    "update of unknown project {}",
                    project.id
                )));
            }
            inner
                .projects
                .insert(project.id.value().to_string(), project.clone());
            Ok(())
        })
    }

    fn append_run<'a>(&'a self, record: &'a StageRunRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.lock()?
                .runs
                .entry((record.project_id.value().to_string(), record.stage_id.value()))
                .or_default()
                .push(record.clone());
            Ok(())
        })
    }

    fn latest_run<'a>(
        &'a self,
        id: &'a ProjectId,
        stage: StageId,
    ) -> StoreFuture<'a, Option<StageRunRecord>> {
        Box::pin(async move {
            Ok(self
                .lock()?
                .runs
                .get(&(id.value().to_string(), stage.value()))
                .and_then(|records| {
                    records
                        .iter()
                        .max_by_key(|record| record.attempt)
                        .cloned()
                }))
        })
    }

    fn runs_for_stage<'a>(
        &'a self,
        id: &'a ProjectId,
        stage: StageId,
    ) -> StoreFuture<'a, Vec<StageRunRecord>> {
        Box::pin(async move {
            let mut records = self
                .lock()?
                .runs
                .get(&(id.value().to_string(), stage.value()))
                .cloned()
                .unwrap_or_default();
            records.sort_by_key(|record| record.attempt);
            Ok(records)
        })
    }

    fn append_decision<'a>(&'a self, record: &'a RoutingDecisionRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.lock()?.decisions.push(record.clone());
            Ok(())
        })
    }

    fn acquire_lease<'a>(
        &'a self,
        id: &'a ProjectId,
        owner: &'a str,
        ttl_ms: i64,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut inner = self.lock()?;
            let now = Instant::now();
            let live = inner
                .leases
                .get(id.value())
                .is_some_and(|(holder, until)| *until > now && holder != owner);
            if live {
                return Ok(false);
            }
            let ttl = Duration::from_millis(u64::try_from(ttl_ms).unwrap_or(0));
            inner
                .leases
                .insert(id.value().to_string(), (owner.to_string(), now + ttl));
            Ok(true)
        })
    }

    fn release_lease<'a>(&'a self, id: &'a ProjectId, owner: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut inner = self.lock()?;
            let held = inner
                .leases
                .get(id.value())
                .is_some_and(|(holder, _)| holder == owner);
            if held {
                inner.leases.remove(id.value());
            }
            Ok(held)
        })
    }
}
