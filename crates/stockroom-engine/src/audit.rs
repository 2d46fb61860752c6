//! Audit ledger service.
//!
//! Thin policy layer over a [`AuditStore`] backend: validates submitted
//! records, clamps catch-up page sizes, and offers the best-effort write used
//! by the assignment engine. When the backend is wrapped in an
//! `EventedAuditStore`, every successful upsert is also pushed to the
//! real-time subscribers.

use std::sync::Arc;

use crate::error::EngineError;
use stockroom_core::{AuditEvent, UtcDateTime};
use stockroom_storage::AuditStore;

/// Largest page a catch-up query may request.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Service front for the audit event ledger.
#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn AuditStore>,
    max_page_size: u32,
}

impl AuditService {
    /// Create a service with the default page clamp.
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            max_page_size: MAX_PAGE_SIZE,
        }
    }

    /// Override the page clamp (values are still at least 1).
    pub fn with_max_page_size(mut self, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size.max(1);
        self
    }

    /// Clamp a caller-supplied page size into `[1, max_page_size]`.
    ///
    /// `None` and out-of-range values saturate rather than error.
    pub fn clamp_page_size(&self, requested: Option<i64>) -> u32 {
        match requested {
            Some(take) if take >= 1 => (take.min(self.max_page_size as i64)) as u32,
            Some(_) => 1,
            None => self.max_page_size,
        }
    }

    /// Upsert one event. Exactly one row per external id afterwards.
    pub async fn record(&self, event: AuditEvent) -> Result<AuditEvent, EngineError> {
        if event.external_id.trim().is_empty() {
            return Err(EngineError::validation("externalId must not be empty"));
        }
        if event.actor_id.trim().is_empty() {
            return Err(EngineError::validation("actorId must not be empty"));
        }
        Ok(self.store.upsert(event).await?)
    }

    /// Upsert one event, swallowing failures.
    ///
    /// Used on the mutation path: the assignment outcome must not depend on
    /// audit durability, so failures are logged at WARN and dropped.
    pub async fn record_best_effort(&self, event: AuditEvent) -> Option<AuditEvent> {
        let external_id = event.external_id.clone();
        match self.record(event).await {
            Ok(stored) => Some(stored),
            Err(error) => {
                tracing::warn!(
                    external_id = %external_id,
                    error = %error,
                    "audit write failed, assignment outcome unaffected"
                );
                None
            }
        }
    }

    /// Events strictly after `since`, newest first, clamped page size.
    pub async fn events_since(
        &self,
        since: UtcDateTime,
        take: Option<i64>,
    ) -> Result<Vec<AuditEvent>, EngineError> {
        let limit = self.clamp_page_size(take);
        Ok(self.store.events_since(since, limit).await?)
    }

    /// One event by external id, falling back to internal id.
    pub async fn get(&self, id: &str) -> Result<Option<AuditEvent>, EngineError> {
        Ok(self.store.get(id).await?)
    }
}
