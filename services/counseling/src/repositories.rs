//! Repositories for database operations
//!
//! `Store` is the persistence seam of the service. Every write that depends on
//! the current state of a row is conditional, so a caller that lost a race
//! learns about it from the return value instead of overwriting newer data.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::DatabaseResult;
use uuid::Uuid;

use crate::models::{
    code::CommonCode,
    extension::{ExtensionQuery, ExtensionRequest, ExtensionStatus, StatusTally},
    mapping::Mapping,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Result of an atomic completion attempt
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    /// The mapping was credited and the request marked completed
    Completed {
        request: ExtensionRequest,
        mapping: Mapping,
    },
    /// The request had been completed before; nothing was credited
    AlreadyCompleted(ExtensionRequest),
    /// The request is in a status that cannot be completed
    NotApproved(ExtensionStatus),
    NotFound,
}

/// Persistence operations for mappings, extension requests and codes
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new mapping
    async fn insert_mapping(&self, mapping: &Mapping) -> DatabaseResult<()>;

    /// Find a mapping by ID
    async fn find_mapping(&self, id: Uuid) -> DatabaseResult<Option<Mapping>>;

    /// All mappings, most recent first
    async fn list_mappings(&self) -> DatabaseResult<Vec<Mapping>>;

    /// Consume one session of an ACTIVE mapping that has sessions left
    ///
    /// Returns `None` when the mapping is missing or the condition does not
    /// hold; nothing is written in that case.
    async fn use_session(&self, id: Uuid, now: DateTime<Utc>) -> DatabaseResult<Option<Mapping>>;

    /// Insert a new extension request
    async fn insert_request(&self, request: &ExtensionRequest) -> DatabaseResult<()>;

    /// Find an extension request by ID
    async fn find_request(&self, id: Uuid) -> DatabaseResult<Option<ExtensionRequest>>;

    /// Overwrite a request if its stored status still equals `expected`
    async fn update_request(
        &self,
        request: &ExtensionRequest,
        expected: ExtensionStatus,
    ) -> DatabaseResult<bool>;

    /// Credit the mapping and complete the request as one atomic unit
    async fn complete_request(
        &self,
        id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> DatabaseResult<CompletionOutcome>;

    /// Filtered requests, most recent first, with the unpaginated total
    async fn list_requests(
        &self,
        query: &ExtensionQuery,
    ) -> DatabaseResult<(Vec<ExtensionRequest>, i64)>;

    /// Count and package-price sum per status
    async fn status_tallies(&self) -> DatabaseResult<Vec<(ExtensionStatus, StatusTally)>>;

    /// Active codes of a group ordered by sort order
    async fn find_codes(&self, group: &str) -> DatabaseResult<Vec<CommonCode>>;

    /// Check if the store is reachable
    async fn health_check(&self) -> DatabaseResult<bool>;
}
