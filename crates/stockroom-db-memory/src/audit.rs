use async_trait::async_trait;
use papaya::HashMap as PapayaHashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

use stockroom_core::{AuditEvent, UtcDateTime};
use stockroom_storage::{AuditStore, StorageError};

/// In-memory audit ledger keyed by external id.
///
/// The upsert lock makes the lookup-then-overwrite atomic; read paths pin
/// the map directly. Each upsert records an arrival sequence number used to
/// order events sharing the same timestamp.
#[derive(Debug)]
pub struct InMemoryAuditStore {
    /// Events keyed by external id.
    events: Arc<PapayaHashMap<String, AuditEvent>>,
    /// Internal id -> external id, for get-by-internal-id fallback.
    internal_index: Arc<PapayaHashMap<String, String>>,
    /// External id -> arrival sequence of the latest upsert.
    arrival: Arc<PapayaHashMap<String, u64>>,
    arrival_counter: AtomicU64,
    upsert_lock: Mutex<()>,
}

impl InMemoryAuditStore {
    /// Creates a new empty audit store.
    pub fn new() -> Self {
        Self {
            events: Arc::new(PapayaHashMap::new()),
            internal_index: Arc::new(PapayaHashMap::new()),
            arrival: Arc::new(PapayaHashMap::new()),
            arrival_counter: AtomicU64::new(1),
            upsert_lock: Mutex::new(()),
        }
    }

    /// Creates a new store wrapped in an Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of distinct external ids stored.
    pub fn len(&self) -> usize {
        self.events.pin().iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn upsert(&self, event: AuditEvent) -> Result<AuditEvent, StorageError> {
        if event.external_id.is_empty() {
            return Err(StorageError::invalid_record("external id must not be empty"));
        }

        let _upsert = self.upsert_lock.lock().await;
        let guard = self.events.pin();

        // Latest received write wins, identity fields stay from first insert
        let stored = match guard.get(&event.external_id) {
            Some(existing) => existing.overwritten_by(&event),
            None => {
                let internal = self.internal_index.pin();
                internal.insert(event.id.clone(), event.external_id.clone());
                event
            }
        };

        guard.insert(stored.external_id.clone(), stored.clone());
        let seq = self.arrival_counter.fetch_add(1, Ordering::SeqCst);
        self.arrival.pin().insert(stored.external_id.clone(), seq);
        Ok(stored)
    }

    async fn events_since(
        &self,
        since: UtcDateTime,
        limit: u32,
    ) -> Result<Vec<AuditEvent>, StorageError> {
        let guard = self.events.pin();
        let arrival = self.arrival.pin();

        let mut matching: Vec<(u64, AuditEvent)> = guard
            .iter()
            .filter(|(_, e)| e.occurred_at > since)
            .map(|(external_id, e)| {
                let seq = arrival.get(external_id).copied().unwrap_or_default();
                (seq, e.clone())
            })
            .collect();

        // Newest first; arrival order breaks timestamp ties
        matching.sort_by(|(seq_a, a), (seq_b, b)| {
            b.occurred_at
                .cmp(&a.occurred_at)
                .then_with(|| seq_b.cmp(seq_a))
        });
        matching.truncate(limit as usize);

        Ok(matching.into_iter().map(|(_, e)| e).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<AuditEvent>, StorageError> {
        let guard = self.events.pin();
        if let Some(event) = guard.get(id) {
            return Ok(Some(event.clone()));
        }
        let internal = self.internal_index.pin();
        match internal.get(id) {
            Some(external_id) => Ok(guard.get(external_id).cloned()),
            None => Ok(None),
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use stockroom_core::{AuditAction, ResourceRef};

    fn event(external_id: &str, action: AuditAction, description: &str) -> AuditEvent {
        AuditEvent::builder(action, ResourceRef::hardware("42"))
            .external_id(external_id)
            .actor("u-7")
            .description(description)
            .build()
    }

    #[tokio::test]
    async fn upsert_inserts_then_overwrites() {
        let store = InMemoryAuditStore::new();

        let first = store
            .upsert(event("evt-1", AuditAction::Create, "first"))
            .await
            .unwrap();
        let second = store
            .upsert(event("evt-1", AuditAction::Update, "second"))
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(second.id, first.id);
        assert_eq!(second.action, AuditAction::Update);
        assert_eq!(second.description, "second");
    }

    #[tokio::test]
    async fn upsert_rejects_empty_external_id() {
        let store = InMemoryAuditStore::new();
        let mut e = event("evt-1", AuditAction::Create, "x");
        e.external_id = String::new();
        assert!(store.upsert(e).await.is_err());
    }

    #[tokio::test]
    async fn latest_received_write_wins_even_with_older_timestamp() {
        let store = InMemoryAuditStore::new();

        let newer = event("evt-1", AuditAction::Update, "newer");
        store.upsert(newer).await.unwrap();

        let mut older = event("evt-1", AuditAction::Create, "older");
        older.occurred_at = UtcDateTime::from_str("2020-01-01T00:00:00Z").unwrap();
        let stored = store.upsert(older).await.unwrap();

        // Arrival order, not the embedded timestamp, decides
        assert_eq!(stored.description, "older");
        assert_eq!(
            store.get("evt-1").await.unwrap().unwrap().description,
            "older"
        );
    }

    #[tokio::test]
    async fn events_since_is_newest_first_and_exclusive() {
        let store = InMemoryAuditStore::new();

        let mut e1 = event("evt-1", AuditAction::Assign, "first");
        e1.occurred_at = UtcDateTime::from_str("2024-03-01T10:00:00Z").unwrap();
        let mut e2 = event("evt-2", AuditAction::Unassign, "second");
        e2.occurred_at = UtcDateTime::from_str("2024-03-01T11:00:00Z").unwrap();
        store.upsert(e1).await.unwrap();
        store.upsert(e2).await.unwrap();

        let t0 = UtcDateTime::from_str("2024-03-01T09:00:00Z").unwrap();
        let all = store.events_since(t0, 200).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].external_id, "evt-2");
        assert_eq!(all[1].external_id, "evt-1");

        // A cursor equal to e1's timestamp excludes e1
        let t1 = UtcDateTime::from_str("2024-03-01T10:00:00Z").unwrap();
        let newer = store.events_since(t1, 200).await.unwrap();
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].external_id, "evt-2");
    }

    #[tokio::test]
    async fn events_since_respects_limit() {
        let store = InMemoryAuditStore::new();
        for i in 0..10 {
            let mut e = event(&format!("evt-{i}"), AuditAction::Assign, "x");
            e.occurred_at = UtcDateTime::from_str(&format!("2024-03-01T10:0{i}:00Z")).unwrap();
            store.upsert(e).await.unwrap();
        }

        let t0 = UtcDateTime::from_str("2024-03-01T00:00:00Z").unwrap();
        let page = store.events_since(t0, 3).await.unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].external_id, "evt-9");
    }

    #[tokio::test]
    async fn get_falls_back_to_internal_id() {
        let store = InMemoryAuditStore::new();
        let stored = store
            .upsert(event("evt-1", AuditAction::Create, "x"))
            .await
            .unwrap();

        assert!(store.get("evt-1").await.unwrap().is_some());
        assert!(store.get(&stored.id).await.unwrap().is_some());
        assert!(store.get("unknown").await.unwrap().is_none());
    }
}
