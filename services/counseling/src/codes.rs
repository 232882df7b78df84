//! Common-code lookup behind a TTL cache

use common::cache::TtlCache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};
use crate::models::code::{CommonCode, builtin_codes};
use crate::repositories::Store;

/// Serves code groups from the cache, the store, or the built-in status tables
#[derive(Clone)]
pub struct CodeService {
    store: Arc<dyn Store>,
    cache: TtlCache,
    ttl: Duration,
}

impl CodeService {
    pub fn new(store: Arc<dyn Store>, cache: TtlCache, ttl: Duration) -> Self {
        Self { store, cache, ttl }
    }

    /// Codes of `group` ordered by sort order
    ///
    /// Group names are matched case-insensitively.
    pub async fn get_group(&self, group: &str) -> ApiResult<Vec<CommonCode>> {
        let group = group.trim().to_ascii_uppercase();

        match self.cache.get::<Vec<CommonCode>>(&group, self.ttl).await {
            Ok(Some(codes)) => {
                debug!("Code group {} served from cache", group);
                return Ok(codes);
            }
            Ok(None) => {}
            Err(e) => warn!("Code cache read failed for {}: {}", group, e),
        }

        let mut codes = self.store.find_codes(&group).await?;
        if codes.is_empty() {
            codes = builtin_codes(&group)
                .ok_or_else(|| ApiError::NotFound(format!("Code group {}", group)))?;
        }

        if let Err(e) = self.cache.put(&group, &codes, self.ttl).await {
            warn!("Code cache write failed for {}: {}", group, e);
        }

        Ok(codes)
    }

    /// Drop every cached group
    pub async fn invalidate_all(&self) -> ApiResult<()> {
        self.cache.invalidate_all().await?;
        Ok(())
    }
}
