//! Mapping service and list filtering

use common::clock::Clock;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::mapping::{CreateMappingRequest, Mapping, MappingQuery, MappingStatus};
use crate::repositories::Store;
use crate::validation;

/// Number of mappings shown when no filter is active
pub const DEFAULT_RECENT_LIMIT: usize = 10;

/// Parsed list filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingFilter {
    /// Lower-cased search term; `None` when blank
    pub search: Option<String>,
    /// `None` stands for `ALL`
    pub status: Option<MappingStatus>,
}

impl MappingFilter {
    pub fn from_query(query: &MappingQuery) -> Result<Self, String> {
        let search = validation::optional_text(query.search.as_deref()).map(|s| s.to_lowercase());

        let status = match validation::optional_text(query.status.as_deref()) {
            None => None,
            Some(raw) if raw.eq_ignore_ascii_case("ALL") => None,
            Some(raw) => Some(raw.parse::<MappingStatus>()?),
        };

        Ok(Self { search, status })
    }

    pub fn is_default(&self) -> bool {
        self.search.is_none() && self.status.is_none()
    }

    fn matches(&self, mapping: &Mapping) -> bool {
        if self.status.is_some_and(|status| status != mapping.status) {
            return false;
        }

        match &self.search {
            None => true,
            Some(term) => [
                &mapping.client_name,
                &mapping.client_email,
                &mapping.consultant_name,
                &mapping.package_name,
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(term.as_str())),
        }
    }
}

/// Apply `filter` to `mappings`, most recent first
///
/// With the default filter only the [`DEFAULT_RECENT_LIMIT`] most recent
/// mappings are returned.
pub fn filter_mappings(mut mappings: Vec<Mapping>, filter: &MappingFilter) -> Vec<Mapping> {
    mappings.retain(|mapping| filter.matches(mapping));
    mappings.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    if filter.is_default() {
        mappings.truncate(DEFAULT_RECENT_LIMIT);
    }

    mappings
}

/// Mapping operations
#[derive(Clone)]
pub struct MappingService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl MappingService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create a mapping with every session still remaining
    pub async fn create(&self, payload: CreateMappingRequest) -> ApiResult<Mapping> {
        let consultant_id = payload
            .consultant_id
            .ok_or_else(|| ApiError::Validation("consultantId is required".to_string()))?;
        let client_id = payload
            .client_id
            .ok_or_else(|| ApiError::Validation("clientId is required".to_string()))?;
        let consultant_name =
            validation::required_text("consultantName", payload.consultant_name.as_deref())
                .map_err(ApiError::Validation)?;
        let client_name = validation::required_text("clientName", payload.client_name.as_deref())
            .map_err(ApiError::Validation)?;
        let client_email = validation::required_text("clientEmail", payload.client_email.as_deref())
            .map_err(ApiError::Validation)?;
        validation::validate_email(&client_email).map_err(ApiError::Validation)?;
        let total_sessions =
            validation::validate_session_count("totalSessions", payload.total_sessions)
                .map_err(ApiError::Validation)?;
        let package_name = validation::required_text("packageName", payload.package_name.as_deref())
            .map_err(ApiError::Validation)?;
        let package_price =
            validation::validate_price(payload.package_price).map_err(ApiError::Validation)?;

        let now = self.clock.now();
        let mapping = Mapping {
            id: Uuid::new_v4(),
            consultant_id,
            client_id,
            consultant_name,
            client_name,
            client_email,
            status: payload.status.unwrap_or(MappingStatus::Active),
            total_sessions,
            used_sessions: 0,
            remaining_sessions: total_sessions,
            package_name,
            package_price,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_mapping(&mapping).await?;

        info!(
            "Mapping {} created: consultant={}, client={}, sessions={}",
            mapping.id, consultant_id, client_id, total_sessions
        );
        Ok(mapping)
    }

    /// Find a mapping by ID
    pub async fn get(&self, id: Uuid) -> ApiResult<Mapping> {
        self.store
            .find_mapping(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Mapping".to_string()))
    }

    /// Consume one session
    pub async fn use_session(&self, id: Uuid) -> ApiResult<Mapping> {
        if let Some(mapping) = self.store.use_session(id, self.clock.now()).await? {
            info!(
                "Session used on mapping {}: used={}, remaining={}",
                id, mapping.used_sessions, mapping.remaining_sessions
            );
            return Ok(mapping);
        }

        let current = self.get(id).await?;
        warn!(
            "Session refused on mapping {}: status={}, remaining={}",
            id, current.status, current.remaining_sessions
        );
        Err(ApiError::InvalidStateTransition {
            from: current.status.as_str(),
            event: "use a session",
        })
    }

    /// Filtered listing
    pub async fn list(&self, query: &MappingQuery) -> ApiResult<Vec<Mapping>> {
        let filter = MappingFilter::from_query(query).map_err(ApiError::Validation)?;
        let mappings = self.store.list_mappings().await?;
        Ok(filter_mappings(mappings, &filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MemoryStore;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use common::clock::ManualClock;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    fn payload(client_name: &str, total: i32) -> CreateMappingRequest {
        CreateMappingRequest {
            consultant_id: Some(Uuid::new_v4()),
            client_id: Some(Uuid::new_v4()),
            consultant_name: Some("Park Consultant".to_string()),
            client_name: Some(client_name.to_string()),
            client_email: Some(format!("{}@example.com", client_name.to_lowercase())),
            total_sessions: Some(total),
            package_name: Some("STANDARD".to_string()),
            package_price: Some(400_000),
            status: None,
        }
    }

    fn service() -> (MappingService, ManualClock) {
        let clock = ManualClock::new(start());
        let service = MappingService::new(Arc::new(MemoryStore::new()), Arc::new(clock.clone()));
        (service, clock)
    }

    fn sample(index: i64) -> Mapping {
        let at = start() + Duration::hours(index);
        Mapping {
            id: Uuid::new_v4(),
            consultant_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            consultant_name: "Park Consultant".to_string(),
            client_name: format!("Client {}", index),
            client_email: format!("client{}@example.com", index),
            status: if index % 2 == 0 {
                MappingStatus::Active
            } else {
                MappingStatus::Suspended
            },
            total_sessions: 10,
            used_sessions: 0,
            remaining_sessions: 10,
            package_name: "STANDARD".to_string(),
            package_price: 400_000,
            version: 0,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_default_filter_returns_ten_most_recent() {
        let mappings: Vec<Mapping> = (0..15).map(sample).collect();
        let filter = MappingFilter::from_query(&MappingQuery {
            search: Some("  ".to_string()),
            status: Some("ALL".to_string()),
        })
        .unwrap();
        assert!(filter.is_default());

        let shown = filter_mappings(mappings, &filter);
        assert_eq!(shown.len(), 10);
        assert_eq!(shown[0].client_name, "Client 14");
        assert_eq!(shown[9].client_name, "Client 5");
    }

    #[test]
    fn test_active_filter_returns_all_matches() {
        let mappings: Vec<Mapping> = (0..30).map(sample).collect();

        let by_status = filter_mappings(
            mappings.clone(),
            &MappingFilter {
                search: None,
                status: Some(MappingStatus::Active),
            },
        );
        assert_eq!(by_status.len(), 15);
        assert!(by_status.iter().all(|m| m.status == MappingStatus::Active));

        let by_search = filter_mappings(
            mappings,
            &MappingFilter::from_query(&MappingQuery {
                search: Some("CLIENT1".to_string()),
                status: None,
            })
            .unwrap(),
        );
        // client1, client10..client19
        assert_eq!(by_search.len(), 11);
        assert!(by_search.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }

    #[test]
    fn test_filter_rejects_unknown_status() {
        let result = MappingFilter::from_query(&MappingQuery {
            search: None,
            status: Some("ARCHIVED".to_string()),
        });
        assert!(result.is_err());

        let parsed = MappingFilter::from_query(&MappingQuery {
            search: None,
            status: Some("sessions_exhausted".to_string()),
        })
        .unwrap();
        assert_eq!(parsed.status, Some(MappingStatus::SessionsExhausted));
    }

    #[tokio::test]
    async fn test_create_and_use_sessions() {
        let (service, _) = service();
        let mapping = service.create(payload("Choi", 2)).await.unwrap();
        assert_eq!(mapping.status, MappingStatus::Active);
        assert_eq!(mapping.remaining_sessions, 2);

        let once = service.use_session(mapping.id).await.unwrap();
        assert_eq!((once.used_sessions, once.remaining_sessions), (1, 1));
        assert!(once.is_balanced());

        let twice = service.use_session(mapping.id).await.unwrap();
        assert_eq!(twice.remaining_sessions, 0);
        assert_eq!(twice.status, MappingStatus::SessionsExhausted);

        match service.use_session(mapping.id).await {
            Err(ApiError::InvalidStateTransition { from, .. }) => {
                assert_eq!(from, "SESSIONS_EXHAUSTED")
            }
            other => panic!("expected invalid transition, got {:?}", other),
        }

        let stored = service.get(mapping.id).await.unwrap();
        assert_eq!(stored.total_sessions, 2);
        assert_eq!(stored.used_sessions, 2);
    }

    #[tokio::test]
    async fn test_create_validation() {
        let (service, _) = service();

        let result = service.create(payload("Choi", 0)).await;
        assert!(matches!(result, Err(ApiError::Validation(_))));

        let mut bad_email = payload("Choi", 3);
        bad_email.client_email = Some("not-an-email".to_string());
        assert!(matches!(service.create(bad_email).await, Err(ApiError::Validation(_))));

        let mut missing = payload("Choi", 3);
        missing.consultant_id = None;
        assert!(matches!(service.create(missing).await, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn test_use_session_on_unknown_mapping() {
        let (service, _) = service();
        let result = service.use_session(Uuid::new_v4()).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_through_service() {
        let (service, clock) = service();
        for name in ["Alpha", "Bravo", "Charlie"] {
            service.create(payload(name, 5)).await.unwrap();
            clock.advance(Duration::minutes(1));
        }

        let all = service.list(&MappingQuery::default()).await.unwrap();
        let names: Vec<&str> = all.iter().map(|m| m.client_name.as_str()).collect();
        assert_eq!(names, ["Charlie", "Bravo", "Alpha"]);

        let searched = service
            .list(&MappingQuery {
                search: Some("bravo@".to_string()),
                status: None,
            })
            .await
            .unwrap();
        assert_eq!(searched.len(), 1);

        let invalid = service
            .list(&MappingQuery {
                search: None,
                status: Some("nope".to_string()),
            })
            .await;
        assert!(matches!(invalid, Err(ApiError::Validation(_))));
    }
}
