//! In-memory store
//!
//! All state sits behind one mutex, so every operation, completion crediting
//! included, is atomic with respect to every other.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::DatabaseResult;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CompletionOutcome, Store};
use crate::models::{
    PageWindow,
    code::CommonCode,
    extension::{ExtensionQuery, ExtensionRequest, ExtensionStatus, StatusTally},
    mapping::Mapping,
};

#[derive(Debug, Default)]
struct MemoryState {
    mappings: HashMap<Uuid, Mapping>,
    requests: HashMap<Uuid, ExtensionRequest>,
    codes: Vec<CommonCode>,
}

/// Store keeping everything in process memory
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store with the default payment-method codes
    pub fn new() -> Self {
        let codes = [
            ("CASH", "Cash", "#28a745", "💵"),
            ("CARD", "Card", "#17a2b8", "💳"),
            ("BANK_TRANSFER", "Bank transfer", "#6f42c1", "🏦"),
        ]
        .into_iter()
        .enumerate()
        .map(|(index, (value, label, color, icon))| CommonCode {
            code_group: "PAYMENT_METHOD".to_string(),
            code_value: value.to_string(),
            code_label: label.to_string(),
            color_code: Some(color.to_string()),
            icon: Some(icon.to_string()),
            sort_order: index as i32 + 1,
        })
        .collect();

        Self {
            state: Arc::new(Mutex::new(MemoryState {
                codes,
                ..MemoryState::default()
            })),
        }
    }

    /// Add or replace a code
    #[cfg(test)]
    pub async fn upsert_code(&self, code: CommonCode) {
        let mut state = self.state.lock().await;
        state
            .codes
            .retain(|c| !(c.code_group == code.code_group && c.code_value == code.code_value));
        state.codes.push(code);
    }
}

fn matches_query(
    request: &ExtensionRequest,
    query: &ExtensionQuery,
    mappings: &HashMap<Uuid, Mapping>,
) -> bool {
    if query.mapping_id.is_some_and(|id| id != request.mapping_id)
        || query.requester_id.is_some_and(|id| id != request.requester_id)
        || query.status.is_some_and(|status| status != request.status)
    {
        return false;
    }

    if query.consultant_id.is_none() && query.client_id.is_none() {
        return true;
    }

    match mappings.get(&request.mapping_id) {
        Some(mapping) => {
            query.consultant_id.is_none_or(|id| id == mapping.consultant_id)
                && query.client_id.is_none_or(|id| id == mapping.client_id)
        }
        None => false,
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_mapping(&self, mapping: &Mapping) -> DatabaseResult<()> {
        self.state
            .lock()
            .await
            .mappings
            .insert(mapping.id, mapping.clone());
        Ok(())
    }

    async fn find_mapping(&self, id: Uuid) -> DatabaseResult<Option<Mapping>> {
        Ok(self.state.lock().await.mappings.get(&id).cloned())
    }

    async fn list_mappings(&self) -> DatabaseResult<Vec<Mapping>> {
        let mut mappings: Vec<Mapping> =
            self.state.lock().await.mappings.values().cloned().collect();
        mappings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(mappings)
    }

    async fn use_session(&self, id: Uuid, now: DateTime<Utc>) -> DatabaseResult<Option<Mapping>> {
        let mut state = self.state.lock().await;

        match state.mappings.get_mut(&id) {
            Some(mapping) if mapping.can_use_session() => {
                mapping.consume_session(now);
                debug_assert!(mapping.is_balanced());
                Ok(Some(mapping.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn insert_request(&self, request: &ExtensionRequest) -> DatabaseResult<()> {
        self.state
            .lock()
            .await
            .requests
            .insert(request.id, request.clone());
        Ok(())
    }

    async fn find_request(&self, id: Uuid) -> DatabaseResult<Option<ExtensionRequest>> {
        Ok(self.state.lock().await.requests.get(&id).cloned())
    }

    async fn update_request(
        &self,
        request: &ExtensionRequest,
        expected: ExtensionStatus,
    ) -> DatabaseResult<bool> {
        let mut state = self.state.lock().await;

        match state.requests.get_mut(&request.id) {
            Some(stored) if stored.status == expected => {
                *stored = request.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_request(
        &self,
        id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> DatabaseResult<CompletionOutcome> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let Some(request) = state.requests.get_mut(&id) else {
            return Ok(CompletionOutcome::NotFound);
        };

        match request.status {
            ExtensionStatus::Completed => {
                return Ok(CompletionOutcome::AlreadyCompleted(request.clone()));
            }
            ExtensionStatus::AdminApproved if request.completed_at.is_none() => {}
            other => return Ok(CompletionOutcome::NotApproved(other)),
        }

        let Some(mapping) = state.mappings.get_mut(&request.mapping_id) else {
            return Ok(CompletionOutcome::NotFound);
        };

        mapping.credit_sessions(request.additional_sessions, completed_at);
        debug_assert!(mapping.is_balanced());
        request.status = ExtensionStatus::Completed;
        request.completed_at = Some(completed_at);
        request.updated_at = completed_at;

        Ok(CompletionOutcome::Completed {
            request: request.clone(),
            mapping: mapping.clone(),
        })
    }

    async fn list_requests(
        &self,
        query: &ExtensionQuery,
    ) -> DatabaseResult<(Vec<ExtensionRequest>, i64)> {
        let state = self.state.lock().await;

        let mut requests: Vec<ExtensionRequest> = state
            .requests
            .values()
            .filter(|request| matches_query(request, query, &state.mappings))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = requests.len() as i64;
        let requests = match PageWindow::resolve(query.page, query.limit) {
            Some(window) => requests
                .into_iter()
                .skip(window.offset() as usize)
                .take(window.limit as usize)
                .collect(),
            None => requests,
        };

        Ok((requests, total))
    }

    async fn status_tallies(&self) -> DatabaseResult<Vec<(ExtensionStatus, StatusTally)>> {
        let state = self.state.lock().await;
        let mut tallies: BTreeMap<ExtensionStatus, StatusTally> = BTreeMap::new();

        for request in state.requests.values() {
            let tally = tallies.entry(request.status).or_insert(StatusTally {
                count: 0,
                package_price_total: 0,
            });
            tally.count += 1;
            tally.package_price_total = tally
                .package_price_total
                .saturating_add(request.package_price);
        }

        Ok(tallies.into_iter().collect())
    }

    async fn find_codes(&self, group: &str) -> DatabaseResult<Vec<CommonCode>> {
        let state = self.state.lock().await;
        let mut codes: Vec<CommonCode> = state
            .codes
            .iter()
            .filter(|code| code.code_group == group)
            .cloned()
            .collect();
        codes.sort_by_key(|code| code.sort_order);
        Ok(codes)
    }

    async fn health_check(&self) -> DatabaseResult<bool> {
        Ok(true)
    }
}
