//! Session-extension workflow
//!
//! A request moves through
//!
//! ```text
//! PENDING --confirm_payment--> PAYMENT_CONFIRMED --approve--> ADMIN_APPROVED
//!                                      |                            |
//!                                      +--reject--> REJECTED        +--complete--> COMPLETED
//! ```
//!
//! Every transition is checked against [`TRANSITIONS`] and written with a
//! conditional update on the status it was computed from. A failed check or a
//! lost race writes nothing. Completion credits the mapping exactly once.

use chrono::{DateTime, Local, TimeZone, Utc};
use common::clock::Clock;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{
    extension::{
        AdminDecisionRequest, ConfirmPaymentRequest, CreateExtensionRequest,
        ExtensionListResponse, ExtensionQuery, ExtensionRequest, ExtensionStatistics,
        ExtensionStatus, StatusTally,
    },
    mapping::MappingStatus,
};
use crate::repositories::{CompletionOutcome, Store};
use crate::validation;

/// Events that move an existing request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionEvent {
    ConfirmPayment,
    Approve,
    Reject,
    Complete,
}

impl ExtensionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionEvent::ConfirmPayment => "confirm payment",
            ExtensionEvent::Approve => "approve",
            ExtensionEvent::Reject => "reject",
            ExtensionEvent::Complete => "complete",
        }
    }
}

/// (from, event, to)
const TRANSITIONS: [(ExtensionStatus, ExtensionEvent, ExtensionStatus); 4] = [
    (
        ExtensionStatus::Pending,
        ExtensionEvent::ConfirmPayment,
        ExtensionStatus::PaymentConfirmed,
    ),
    (
        ExtensionStatus::PaymentConfirmed,
        ExtensionEvent::Approve,
        ExtensionStatus::AdminApproved,
    ),
    (
        ExtensionStatus::PaymentConfirmed,
        ExtensionEvent::Reject,
        ExtensionStatus::Rejected,
    ),
    (
        ExtensionStatus::AdminApproved,
        ExtensionEvent::Complete,
        ExtensionStatus::Completed,
    ),
];

/// Target status of `event` from `from`
pub fn transition(from: ExtensionStatus, event: ExtensionEvent) -> ApiResult<ExtensionStatus> {
    TRANSITIONS
        .iter()
        .find(|(source, candidate, _)| *source == from && *candidate == event)
        .map(|(_, _, to)| *to)
        .ok_or(ApiError::InvalidStateTransition {
            from: from.as_str(),
            event: event.as_str(),
        })
}

/// Default payment reference, `{METHOD}_{YYYYMMDD}_{HHMMSS}`
pub fn payment_reference<Tz>(method: &str, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!("{}_{}", method, at.format("%Y%m%d_%H%M%S"))
}

/// Extension workflow engine
#[derive(Clone)]
pub struct ExtensionWorkflow {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl ExtensionWorkflow {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    async fn load(&self, id: Uuid) -> ApiResult<ExtensionRequest> {
        self.store
            .find_request(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Extension request".to_string()))
    }

    /// Apply `event` to request `id`, letting `update` fill the event's fields
    async fn advance<F>(
        &self,
        id: Uuid,
        event: ExtensionEvent,
        update: F,
    ) -> ApiResult<ExtensionRequest>
    where
        F: FnOnce(&mut ExtensionRequest, DateTime<Utc>),
    {
        let mut request = self.load(id).await?;
        let from = request.status;

        let to = transition(from, event).inspect_err(|_| {
            warn!(
                "Rejected transition for request {}: cannot {} from {}",
                id,
                event.as_str(),
                from
            );
        })?;

        let now = self.clock.now();
        update(&mut request, now);
        request.status = to;
        request.updated_at = now;

        if !self.store.update_request(&request, from).await? {
            let current = self.load(id).await?;
            warn!(
                "Request {} changed concurrently: expected {}, found {}",
                id, from, current.status
            );
            return Err(ApiError::InvalidStateTransition {
                from: current.status.as_str(),
                event: event.as_str(),
            });
        }

        info!(
            "Extension request {} moved {} -> {} (mapping {})",
            id, from, to, request.mapping_id
        );
        Ok(request)
    }

    /// Create a PENDING request against an ACTIVE mapping
    pub async fn create(&self, payload: CreateExtensionRequest) -> ApiResult<ExtensionRequest> {
        let mapping_id = payload
            .mapping_id
            .ok_or_else(|| ApiError::Validation("mappingId is required".to_string()))?;
        let requester_id = payload
            .requester_id
            .ok_or_else(|| ApiError::Validation("requesterId is required".to_string()))?;
        let additional_sessions =
            validation::validate_session_count("additionalSessions", payload.additional_sessions)
                .map_err(ApiError::Validation)?;
        let package_name = validation::required_text("packageName", payload.package_name.as_deref())
            .map_err(ApiError::Validation)?;
        let package_price =
            validation::validate_price(payload.package_price).map_err(ApiError::Validation)?;

        let mapping = self
            .store
            .find_mapping(mapping_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Mapping".to_string()))?;

        if mapping.status != MappingStatus::Active {
            warn!(
                "Extension refused for mapping {} in status {}",
                mapping.id, mapping.status
            );
            return Err(ApiError::InvalidStateTransition {
                from: mapping.status.as_str(),
                event: "request an extension",
            });
        }

        let now = self.clock.now();
        let request = ExtensionRequest {
            id: Uuid::new_v4(),
            mapping_id,
            requester_id,
            additional_sessions,
            package_name,
            package_price,
            reason: validation::optional_text(payload.reason.as_deref()),
            status: ExtensionStatus::Pending,
            payment_method: None,
            payment_reference: None,
            payment_confirmed_at: None,
            approver_id: None,
            approval_comment: None,
            approved_at: None,
            rejected_by: None,
            rejection_reason: None,
            rejected_at: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        self.store.insert_request(&request).await?;

        info!(
            "Extension request {} created: mapping={}, requester={}, sessions={}",
            request.id, mapping_id, requester_id, additional_sessions
        );
        Ok(request)
    }

    /// PENDING -> PAYMENT_CONFIRMED
    pub async fn confirm_payment(
        &self,
        id: Uuid,
        payload: ConfirmPaymentRequest,
    ) -> ApiResult<ExtensionRequest> {
        let method = validation::validate_payment_method(payload.payment_method.as_deref())
            .map_err(ApiError::Validation)?;
        let supplied = validation::optional_text(payload.payment_reference.as_deref());

        self.advance(id, ExtensionEvent::ConfirmPayment, |request, now| {
            let reference = supplied
                .unwrap_or_else(|| payment_reference(&method, &now.with_timezone(&Local)));
            request.payment_method = Some(method);
            request.payment_reference = Some(reference);
            request.payment_confirmed_at = Some(now);
        })
        .await
    }

    /// PAYMENT_CONFIRMED -> ADMIN_APPROVED
    pub async fn approve(
        &self,
        id: Uuid,
        payload: AdminDecisionRequest,
    ) -> ApiResult<ExtensionRequest> {
        let admin_id = payload
            .admin_id
            .ok_or_else(|| ApiError::Validation("adminId is required".to_string()))?;
        let comment = validation::optional_text(payload.comment.as_deref());

        self.advance(id, ExtensionEvent::Approve, |request, now| {
            request.approver_id = Some(admin_id);
            request.approval_comment = comment;
            request.approved_at = Some(now);
        })
        .await
    }

    /// PAYMENT_CONFIRMED -> REJECTED
    pub async fn reject(
        &self,
        id: Uuid,
        payload: AdminDecisionRequest,
    ) -> ApiResult<ExtensionRequest> {
        let admin_id = payload
            .admin_id
            .ok_or_else(|| ApiError::Validation("adminId is required".to_string()))?;
        let comment = validation::optional_text(payload.comment.as_deref());

        self.advance(id, ExtensionEvent::Reject, |request, now| {
            request.rejected_by = Some(admin_id);
            request.rejection_reason = comment;
            request.rejected_at = Some(now);
        })
        .await
    }

    /// ADMIN_APPROVED -> COMPLETED, crediting the mapping once
    ///
    /// Completing an already completed request returns it unchanged.
    pub async fn complete(&self, id: Uuid) -> ApiResult<ExtensionRequest> {
        let now = self.clock.now();

        match self.store.complete_request(id, now).await? {
            CompletionOutcome::Completed { request, mapping } => {
                info!(
                    "Request {} completed: mapping {} +{} sessions (total={}, remaining={})",
                    id,
                    mapping.id,
                    request.additional_sessions,
                    mapping.total_sessions,
                    mapping.remaining_sessions
                );
                Ok(request)
            }
            CompletionOutcome::AlreadyCompleted(request) => {
                info!("Extension request {} already completed, nothing credited", id);
                Ok(request)
            }
            CompletionOutcome::NotApproved(status) => {
                warn!(
                    "Rejected transition for request {}: cannot complete from {}",
                    id, status
                );
                Err(ApiError::InvalidStateTransition {
                    from: status.as_str(),
                    event: ExtensionEvent::Complete.as_str(),
                })
            }
            CompletionOutcome::NotFound => Err(ApiError::NotFound("Extension request".to_string())),
        }
    }

    /// Find a request by ID
    pub async fn get(&self, id: Uuid) -> ApiResult<ExtensionRequest> {
        self.load(id).await
    }

    /// Filtered listing, most recent first
    pub async fn list(&self, query: &ExtensionQuery) -> ApiResult<ExtensionListResponse> {
        let (items, total) = self.store.list_requests(query).await?;

        Ok(ExtensionListResponse {
            items,
            total,
            page: query.page,
            limit: query.limit,
        })
    }

    /// Requests waiting for payment confirmation
    pub async fn pending_payment(&self) -> ApiResult<Vec<ExtensionRequest>> {
        let (items, _) = self
            .store
            .list_requests(&ExtensionQuery::with_status(ExtensionStatus::Pending))
            .await?;
        Ok(items)
    }

    /// Requests waiting for an administrator decision
    pub async fn pending_approval(&self) -> ApiResult<Vec<ExtensionRequest>> {
        let (items, _) = self
            .store
            .list_requests(&ExtensionQuery::with_status(ExtensionStatus::PaymentConfirmed))
            .await?;
        Ok(items)
    }

    /// Counts per status and revenue of completed requests
    pub async fn statistics(&self) -> ApiResult<ExtensionStatistics> {
        let mut by_status: BTreeMap<ExtensionStatus, StatusTally> = ExtensionStatus::ALL
            .into_iter()
            .map(|status| {
                (
                    status,
                    StatusTally {
                        count: 0,
                        package_price_total: 0,
                    },
                )
            })
            .collect();

        for (status, tally) in self.store.status_tallies().await? {
            by_status.insert(status, tally);
        }

        let total_requests = by_status.values().map(|tally| tally.count).sum();
        let completed_revenue = by_status
            .get(&ExtensionStatus::Completed)
            .map(|tally| tally.package_price_total)
            .unwrap_or(0);

        Ok(ExtensionStatistics {
            total_requests,
            by_status,
            completed_revenue,
        })
    }
}
