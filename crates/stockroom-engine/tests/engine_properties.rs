//! Engine behavior against the in-memory backend: capacity enforcement,
//! idempotency, bounded retries and the best-effort audit policy.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use stockroom_core::events::AuditBroadcaster;
use stockroom_core::{
    Assignment, AuditAction, AuditEvent, CacheVersionStamp, HardwareStatus, HardwareUnit, Holder,
    ResourceRecord, ResourceRef, SoftwareLicense, UtcDateTime,
};
use stockroom_db_memory::{InMemoryAuditStore, InMemoryStorage};
use stockroom_engine::{AssignmentEngine, AuditService, EngineError};
use stockroom_storage::{AssetStorage, AuditStore, EventedAuditStore, StorageError};

async fn seeded_storage() -> Arc<InMemoryStorage> {
    let storage = InMemoryStorage::new_shared();
    for (id, name) in [("u-1", "Dana Smith"), ("u-2", "Kim Lee"), ("u-3", "Ada Jones")] {
        storage.put_holder(Holder::new(id, name)).await.unwrap();
    }
    storage
        .put_hardware(HardwareUnit::new("42", "ThinkPad"))
        .await
        .unwrap();
    storage
        .put_software(SoftwareLicense::new("ide", "IDE", 2))
        .await
        .unwrap();
    storage
        .put_software(SoftwareLicense::new("legacy", "Legacy tool", 0))
        .await
        .unwrap();
    let mut archived = HardwareUnit::new("77", "Old printer");
    archived.archived = true;
    storage.put_hardware(archived).await.unwrap();
    storage
}

struct Harness {
    engine: AssignmentEngine,
    audit_store: Arc<InMemoryAuditStore>,
    stamp: Arc<CacheVersionStamp>,
}

async fn harness() -> Harness {
    harness_with(seeded_storage().await).await
}

async fn harness_with(storage: Arc<dyn AssetStorage>) -> Harness {
    let audit_store = InMemoryAuditStore::new_shared();
    let stamp = CacheVersionStamp::new_shared();
    let audit = AuditService::new(audit_store.clone());
    let engine = AssignmentEngine::new(storage, audit, stamp.clone());
    Harness {
        engine,
        audit_store,
        stamp,
    }
}

#[tokio::test]
async fn software_capacity_is_enforced() {
    let h = harness().await;
    let ide = ResourceRef::software("ide");

    h.engine.assign(&ide, "u-1", "admin", None).await.unwrap();
    h.engine.assign(&ide, "u-2", "admin", None).await.unwrap();

    let err = h.engine.assign(&ide, "u-3", "admin", None).await.unwrap_err();
    assert!(err.is_capacity_exceeded());
    assert_eq!(h.audit_store.len(), 2);
    assert_eq!(h.stamp.current(), 2);
}

#[tokio::test]
async fn hardware_allows_a_single_open_assignment() {
    let h = harness().await;
    let unit = ResourceRef::hardware("42");

    h.engine.assign(&unit, "u-1", "admin", None).await.unwrap();
    let err = h.engine.assign(&unit, "u-2", "admin", None).await.unwrap_err();
    assert!(err.is_capacity_exceeded());
}

#[tokio::test]
async fn assign_is_idempotent_per_holder() {
    let h = harness().await;
    let ide = ResourceRef::software("ide");

    let first = h.engine.assign(&ide, "u-1", "admin", None).await.unwrap();
    let second = h.engine.assign(&ide, "u-1", "admin", None).await.unwrap();

    assert_eq!(first.id, second.id);
    // One audit event, one stamp bump, one open seat
    assert_eq!(h.audit_store.len(), 1);
    assert_eq!(h.stamp.current(), 1);
}

#[tokio::test]
async fn zero_seat_license_behaves_as_capacity_one() {
    let h = harness().await;
    let legacy = ResourceRef::software("legacy");

    h.engine.assign(&legacy, "u-1", "admin", None).await.unwrap();
    let err = h
        .engine
        .assign(&legacy, "u-2", "admin", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::CapacityExceeded { capacity: 1, .. }
    ));
}

#[tokio::test]
async fn archived_resources_reject_assignment() {
    let h = harness().await;
    let err = h
        .engine
        .assign(&ResourceRef::hardware("77"), "u-1", "admin", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ResourceArchived { .. }));
}

#[tokio::test]
async fn unknown_holder_and_resource_are_not_found() {
    let h = harness().await;
    assert!(
        h.engine
            .assign(&ResourceRef::hardware("42"), "ghost", "admin", None)
            .await
            .unwrap_err()
            .is_not_found()
    );
    assert!(
        h.engine
            .assign(&ResourceRef::hardware("404"), "u-1", "admin", None)
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn release_frees_the_seat_for_the_next_holder() {
    let h = harness().await;
    let unit = ResourceRef::hardware("42");

    let assignment = h.engine.assign(&unit, "u-1", "admin", None).await.unwrap();
    h.engine
        .release(&assignment.id, "admin", Some("returned".into()))
        .await
        .unwrap();

    let closed = h.engine.assignment(&assignment.id).await.unwrap().unwrap();
    assert!(!closed.is_open());

    // Unit is available again
    h.engine.assign(&unit, "u-2", "admin", None).await.unwrap();
    assert_eq!(h.audit_store.len(), 3);
    assert_eq!(h.stamp.current(), 3);
}

#[tokio::test]
async fn redundant_release_is_a_silent_noop() {
    let h = harness().await;
    let ide = ResourceRef::software("ide");

    // Nothing open for this holder: no error, no audit row, no bump
    h.engine
        .release_holder(&ide, "u-1", "admin", None)
        .await
        .unwrap();
    assert_eq!(h.audit_store.len(), 0);
    assert_eq!(h.stamp.current(), 0);

    // Same for an assignment id that is already closed
    let assignment = h.engine.assign(&ide, "u-1", "admin", None).await.unwrap();
    h.engine.release(&assignment.id, "admin", None).await.unwrap();
    let rows = h.audit_store.len();
    let stamp = h.stamp.current();
    h.engine.release(&assignment.id, "admin", None).await.unwrap();
    assert_eq!(h.audit_store.len(), rows);
    assert_eq!(h.stamp.current(), stamp);
}

#[tokio::test]
async fn release_by_resource_and_holder_closes_the_open_row() {
    let h = harness().await;
    let ide = ResourceRef::software("ide");

    let assignment = h.engine.assign(&ide, "u-1", "admin", None).await.unwrap();
    h.engine
        .release_holder(&ide, "u-1", "admin", None)
        .await
        .unwrap();

    let closed = h.engine.assignment(&assignment.id).await.unwrap().unwrap();
    assert!(!closed.is_open());
    assert_eq!(h.audit_store.len(), 2);
}

#[tokio::test]
async fn release_of_unknown_assignment_is_not_found() {
    let h = harness().await;
    assert!(
        h.engine
            .release("no-such-row", "admin", None)
            .await
            .unwrap_err()
            .is_not_found()
    );
}

/// Delegating storage that forces version conflicts on the first
/// `conflicts` commit calls, then lets commits through.
struct ConflictingStorage {
    inner: Arc<InMemoryStorage>,
    remaining: AtomicU32,
    commit_calls: AtomicU32,
}

impl ConflictingStorage {
    fn new(inner: Arc<InMemoryStorage>, conflicts: u32) -> Self {
        Self {
            inner,
            remaining: AtomicU32::new(conflicts),
            commit_calls: AtomicU32::new(0),
        }
    }

    fn take_conflict(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl AssetStorage for ConflictingStorage {
    async fn get_holder(&self, id: &str) -> Result<Option<Holder>, StorageError> {
        self.inner.get_holder(id).await
    }

    async fn get_resource(
        &self,
        resource: &ResourceRef,
    ) -> Result<Option<ResourceRecord>, StorageError> {
        self.inner.get_resource(resource).await
    }

    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>, StorageError> {
        self.inner.get_assignment(id).await
    }

    async fn find_open_assignment(
        &self,
        resource: &ResourceRef,
        holder_id: &str,
    ) -> Result<Option<Assignment>, StorageError> {
        self.inner.find_open_assignment(resource, holder_id).await
    }

    async fn count_open_assignments(&self, resource: &ResourceRef) -> Result<u32, StorageError> {
        self.inner.count_open_assignments(resource).await
    }

    async fn list_open_assignments(
        &self,
        resource: &ResourceRef,
    ) -> Result<Vec<Assignment>, StorageError> {
        self.inner.list_open_assignments(resource).await
    }

    async fn commit_assign(
        &self,
        assignment: &Assignment,
        expected_version: u64,
    ) -> Result<Assignment, StorageError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_conflict() {
            return Err(StorageError::version_conflict(
                expected_version,
                expected_version + 1,
            ));
        }
        self.inner.commit_assign(assignment, expected_version).await
    }

    async fn commit_release(
        &self,
        assignment_id: &str,
        unassigned_at: UtcDateTime,
        expected_version: u64,
    ) -> Result<Assignment, StorageError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_conflict() {
            return Err(StorageError::version_conflict(
                expected_version,
                expected_version + 1,
            ));
        }
        self.inner
            .commit_release(assignment_id, unassigned_at, expected_version)
            .await
    }

    async fn put_holder(&self, holder: Holder) -> Result<(), StorageError> {
        self.inner.put_holder(holder).await
    }

    async fn put_hardware(&self, unit: HardwareUnit) -> Result<(), StorageError> {
        self.inner.put_hardware(unit).await
    }

    async fn put_software(&self, license: SoftwareLicense) -> Result<(), StorageError> {
        self.inner.put_software(license).await
    }

    fn backend_name(&self) -> &'static str {
        "memory-conflicting"
    }
}

#[tokio::test]
async fn single_stale_token_conflict_retries_and_commits_once() {
    let storage = Arc::new(ConflictingStorage::new(seeded_storage().await, 1));
    let h = harness_with(storage.clone()).await;
    let ide = ResourceRef::software("ide");

    h.engine.assign(&ide, "u-1", "admin", None).await.unwrap();

    // Attempt 1 conflicted, attempt 2 committed
    assert_eq!(storage.commit_calls.load(Ordering::SeqCst), 2);
    assert_eq!(storage.inner.count_open_assignments(&ide).await.unwrap(), 1);
    assert_eq!(h.audit_store.len(), 1);
    assert_eq!(h.stamp.current(), 1);
}

#[tokio::test]
async fn persistent_conflicts_exhaust_the_retry_bound() {
    let storage = Arc::new(ConflictingStorage::new(seeded_storage().await, u32::MAX));
    let h = harness_with(storage.clone()).await;

    let err = h
        .engine
        .assign(&ResourceRef::software("ide"), "u-1", "admin", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::ConcurrencyExhausted { attempts: 3 }
    ));
    assert_eq!(storage.commit_calls.load(Ordering::SeqCst), 3);
    // Nothing committed, nothing audited, nothing bumped
    assert_eq!(h.audit_store.len(), 0);
    assert_eq!(h.stamp.current(), 0);
}

/// Audit store that always fails, exercising the swallow policy.
struct BrokenAuditStore;

#[async_trait]
impl AuditStore for BrokenAuditStore {
    async fn upsert(&self, _event: AuditEvent) -> Result<AuditEvent, StorageError> {
        Err(StorageError::internal("ledger offline"))
    }

    async fn events_since(
        &self,
        _since: UtcDateTime,
        _limit: u32,
    ) -> Result<Vec<AuditEvent>, StorageError> {
        Err(StorageError::internal("ledger offline"))
    }

    async fn get(&self, _id: &str) -> Result<Option<AuditEvent>, StorageError> {
        Err(StorageError::internal("ledger offline"))
    }

    fn backend_name(&self) -> &'static str {
        "broken"
    }
}

#[tokio::test]
async fn audit_failures_never_fail_the_assignment() {
    let storage = seeded_storage().await;
    let stamp = CacheVersionStamp::new_shared();
    let engine = AssignmentEngine::new(
        storage.clone(),
        AuditService::new(Arc::new(BrokenAuditStore)),
        stamp.clone(),
    );
    let unit = ResourceRef::hardware("42");

    let assignment = engine.assign(&unit, "u-1", "admin", None).await.unwrap();
    assert!(assignment.is_open());
    assert_eq!(stamp.current(), 1);

    match storage.get_resource(&unit).await.unwrap().unwrap() {
        ResourceRecord::Hardware(hw) => assert_eq!(hw.status, HardwareStatus::Assigned),
        ResourceRecord::Software(_) => panic!("expected hardware"),
    }
}

#[tokio::test]
async fn committed_mutations_reach_broadcast_subscribers() {
    let storage = seeded_storage().await;
    let broadcaster = AuditBroadcaster::new_shared();
    let evented = EventedAuditStore::new(InMemoryAuditStore::new(), broadcaster.clone());
    let engine = AssignmentEngine::new(
        storage,
        AuditService::new(Arc::new(evented)),
        CacheVersionStamp::new_shared(),
    );

    let mut receiver = broadcaster.subscribe();
    let assignment = engine
        .assign(&ResourceRef::hardware("42"), "u-1", "admin", None)
        .await
        .unwrap();

    let event = receiver.recv().await.unwrap();
    assert_eq!(event.action, AuditAction::Assign);
    assert_eq!(event.target, ResourceRef::hardware("42"));

    engine.release(&assignment.id, "admin", None).await.unwrap();
    let event = receiver.recv().await.unwrap();
    assert_eq!(event.action, AuditAction::Unassign);
}
