//! Durable state adapter.
//!
//! The core assumes append + point-read semantics only: stage run records and
//! routing decisions are append-only, projects are point-updated, and a
//! single record's write is atomic. Backed by Postgres in production and an
//! in-memory map in tests and dry runs.

use futures_util::future::BoxFuture;

use crate::error::Result;
use crate::types::{Project, ProjectId, RoutingDecisionRecord, StageId, StageRunRecord};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStateStore;

pub type StoreFuture<'a, T> = BoxFuture<'a, Result<T>>;

pub trait StateStore: Send + Sync {
    fn get_project<'a>(&'a self, id: &'a ProjectId) -> StoreFuture<'a, Option<Project>>;

    fn insert_project<'a>(&'a self, project: &'a Project) -> StoreFuture<'a, ()>;

    fn update_project<'a>(&'a self, project: &'a Project) -> StoreFuture<'a, ()>;

    /// Append one attempt record. Never overwrites prior attempts.
    fn append_run<'a>(&'a self, record: &'a StageRunRecord) -> StoreFuture<'a, ()>;

    /// Latest attempt for (project, stage) by attempt number.
    fn latest_run<'a>(
        &'a self,
        id: &'a ProjectId,
        stage: StageId,
    ) -> StoreFuture<'a, Option<StageRunRecord>>;

    /// Full attempt trail for (project, stage), ascending by attempt.
    fn runs_for_stage<'a>(
        &'a self,
        id: &'a ProjectId,
        stage: StageId,
    ) -> StoreFuture<'a, Vec<StageRunRecord>>;

    fn append_decision<'a>(&'a self, record: &'a RoutingDecisionRecord) -> StoreFuture<'a, ()>;

    /// Run-scoped exclusive lease on a project id. Returns false when another
    /// owner holds an unexpired lease.
    fn acquire_lease<'a>(
        &'a self,
        id: &'a ProjectId,
        owner: &'a str,
        ttl_ms: i64,
    ) -> StoreFuture<'a, bool>;

    fn release_lease<'a>(&'a self, id: &'a ProjectId, owner: &'a str) -> StoreFuture<'a, bool>;
}
