//! `EventedAuditStore` - an audit store wrapper that broadcasts after upserts.
//!
//! Delegates all operations to an inner audit store while publishing each
//! successfully upserted event to a broadcaster. Events are emitted **after**
//! the write succeeds, so subscribers only ever observe durable rows, and a
//! missing or lagging subscriber never affects the writer.
//!
//! # Example
//!
//! ```ignore
//! use stockroom_storage::EventedAuditStore;
//! use stockroom_core::events::AuditBroadcaster;
//!
//! let broadcaster = AuditBroadcaster::new_shared();
//! let store = EventedAuditStore::new(memory_store, broadcaster);
//!
//! // After this, the event is pushed to all connected subscribers
//! store.upsert(event).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::StorageError;
use crate::traits::AuditStore;
use stockroom_core::events::AuditBroadcaster;
use stockroom_core::{AuditEvent, UtcDateTime};

/// An audit store wrapper that emits events after successful upserts.
pub struct EventedAuditStore<S: AuditStore> {
    /// The inner audit store implementation.
    inner: S,
    /// The event broadcaster.
    broadcaster: Arc<AuditBroadcaster>,
}

impl<S: AuditStore> EventedAuditStore<S> {
    /// Create a new evented audit store wrapper.
    pub fn new(inner: S, broadcaster: Arc<AuditBroadcaster>) -> Self {
        Self { inner, broadcaster }
    }

    /// Get a reference to the inner store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Get a reference to the broadcaster.
    pub fn broadcaster(&self) -> &Arc<AuditBroadcaster> {
        &self.broadcaster
    }

    fn emit(&self, event: &AuditEvent) {
        if self.broadcaster.subscriber_count() == 0 {
            return;
        }
        let count = self.broadcaster.send(event.clone());
        debug!(
            external_id = %event.external_id,
            action = %event.action,
            subscribers = count,
            "Emitted audit event"
        );
    }
}

#[async_trait]
impl<S: AuditStore> AuditStore for EventedAuditStore<S> {
    async fn upsert(&self, event: AuditEvent) -> Result<AuditEvent, StorageError> {
        let stored = self.inner.upsert(event).await?;

        // Emit after the write is durable
        self.emit(&stored);

        Ok(stored)
    }

    async fn events_since(
        &self,
        since: UtcDateTime,
        limit: u32,
    ) -> Result<Vec<AuditEvent>, StorageError> {
        // Read operations don't emit events
        self.inner.events_since(since, limit).await
    }

    async fn get(&self, id: &str) -> Result<Option<AuditEvent>, StorageError> {
        self.inner.get(id).await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}
