use async_trait::async_trait;
use papaya::HashMap as PapayaHashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

use stockroom_core::{
    Assignment, HardwareStatus, HardwareUnit, Holder, ResourceKind, ResourceRecord, ResourceRef,
    SoftwareLicense, UtcDateTime,
};
use stockroom_storage::{AssetStorage, StorageError};

/// In-memory asset storage backend using papaya lock-free HashMaps.
///
/// Reads are lock-free. The conditional commit operations take an internal
/// mutex so the token check, the assignment row write and the resource
/// update land atomically; writers racing on the same resource observe a
/// moved token and surface `VersionConflict` to the retry loop above.
#[derive(Debug)]
pub struct InMemoryStorage {
    holders: Arc<PapayaHashMap<String, Holder>>,
    hardware: Arc<PapayaHashMap<String, HardwareUnit>>,
    software: Arc<PapayaHashMap<String, SoftwareLicense>>,
    /// Assignment rows keyed by assignment id.
    assignments: Arc<PapayaHashMap<String, Assignment>>,
    /// Atomic counter issuing fresh concurrency tokens.
    version_counter: AtomicU64,
    /// Serializes conditional commits; reads never take it.
    commit_lock: Mutex<()>,
}

impl InMemoryStorage {
    /// Creates a new empty in-memory storage.
    pub fn new() -> Self {
        Self {
            holders: Arc::new(PapayaHashMap::new()),
            hardware: Arc::new(PapayaHashMap::new()),
            software: Arc::new(PapayaHashMap::new()),
            assignments: Arc::new(PapayaHashMap::new()),
            version_counter: AtomicU64::new(1),
            commit_lock: Mutex::new(()),
        }
    }

    /// Creates a new storage wrapped in an Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Issues the next concurrency token.
    fn next_version(&self) -> u64 {
        self.version_counter.fetch_add(1, Ordering::SeqCst)
    }

    fn resource_record(&self, resource: &ResourceRef) -> Option<ResourceRecord> {
        match resource.kind {
            ResourceKind::Hardware => {
                let guard = self.hardware.pin();
                guard.get(&resource.id).cloned().map(ResourceRecord::Hardware)
            }
            ResourceKind::Software => {
                let guard = self.software.pin();
                guard.get(&resource.id).cloned().map(ResourceRecord::Software)
            }
        }
    }

    /// Checks the token and applies the resource-side effects of a commit.
    ///
    /// Must be called with the commit lock held. `delta` is +1 for an assign
    /// and -1 for a release.
    fn apply_resource_commit(
        &self,
        resource: &ResourceRef,
        expected_version: u64,
        delta: i32,
    ) -> Result<(), StorageError> {
        match resource.kind {
            ResourceKind::Hardware => {
                let guard = self.hardware.pin();
                let unit = guard
                    .get(&resource.id)
                    .ok_or_else(|| StorageError::not_found("resource", resource.to_string()))?;
                if unit.version != expected_version {
                    return Err(StorageError::version_conflict(expected_version, unit.version));
                }
                let mut updated = unit.clone();
                updated.status = if delta > 0 {
                    HardwareStatus::Assigned
                } else {
                    HardwareStatus::Available
                };
                updated.version = self.next_version();
                guard.insert(resource.id.clone(), updated);
            }
            ResourceKind::Software => {
                let guard = self.software.pin();
                let license = guard
                    .get(&resource.id)
                    .ok_or_else(|| StorageError::not_found("resource", resource.to_string()))?;
                if license.version != expected_version {
                    return Err(StorageError::version_conflict(
                        expected_version,
                        license.version,
                    ));
                }
                let mut updated = license.clone();
                updated.used_seats = if delta > 0 {
                    updated.used_seats + 1
                } else {
                    updated.used_seats.saturating_sub(1)
                };
                updated.version = self.next_version();
                guard.insert(resource.id.clone(), updated);
            }
        }
        Ok(())
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetStorage for InMemoryStorage {
    async fn get_holder(&self, id: &str) -> Result<Option<Holder>, StorageError> {
        let guard = self.holders.pin();
        Ok(guard.get(id).cloned())
    }

    async fn get_resource(
        &self,
        resource: &ResourceRef,
    ) -> Result<Option<ResourceRecord>, StorageError> {
        Ok(self.resource_record(resource))
    }

    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>, StorageError> {
        let guard = self.assignments.pin();
        Ok(guard.get(id).cloned())
    }

    async fn find_open_assignment(
        &self,
        resource: &ResourceRef,
        holder_id: &str,
    ) -> Result<Option<Assignment>, StorageError> {
        let guard = self.assignments.pin();
        Ok(guard
            .iter()
            .map(|(_, a)| a)
            .find(|a| a.is_open() && a.resource == *resource && a.holder_id == holder_id)
            .cloned())
    }

    async fn count_open_assignments(&self, resource: &ResourceRef) -> Result<u32, StorageError> {
        let guard = self.assignments.pin();
        Ok(guard
            .iter()
            .filter(|(_, a)| a.is_open() && a.resource == *resource)
            .count() as u32)
    }

    async fn list_open_assignments(
        &self,
        resource: &ResourceRef,
    ) -> Result<Vec<Assignment>, StorageError> {
        let guard = self.assignments.pin();
        Ok(guard
            .iter()
            .filter(|(_, a)| a.is_open() && a.resource == *resource)
            .map(|(_, a)| a.clone())
            .collect())
    }

    async fn commit_assign(
        &self,
        assignment: &Assignment,
        expected_version: u64,
    ) -> Result<Assignment, StorageError> {
        let _commit = self.commit_lock.lock().await;

        {
            let guard = self.assignments.pin();
            if guard.get(&assignment.id).is_some() {
                return Err(StorageError::already_exists("assignment", &assignment.id));
            }
        }

        self.apply_resource_commit(&assignment.resource, expected_version, 1)?;

        let guard = self.assignments.pin();
        guard.insert(assignment.id.clone(), assignment.clone());
        Ok(assignment.clone())
    }

    async fn commit_release(
        &self,
        assignment_id: &str,
        unassigned_at: UtcDateTime,
        expected_version: u64,
    ) -> Result<Assignment, StorageError> {
        let _commit = self.commit_lock.lock().await;

        let existing = {
            let guard = self.assignments.pin();
            guard
                .get(assignment_id)
                .filter(|a| a.is_open())
                .cloned()
                .ok_or_else(|| StorageError::not_found("open assignment", assignment_id))?
        };

        self.apply_resource_commit(&existing.resource, expected_version, -1)?;

        let closed = existing.closed(unassigned_at);
        let guard = self.assignments.pin();
        guard.insert(closed.id.clone(), closed.clone());
        Ok(closed)
    }

    async fn put_holder(&self, holder: Holder) -> Result<(), StorageError> {
        let guard = self.holders.pin();
        guard.insert(holder.id.clone(), holder);
        Ok(())
    }

    async fn put_hardware(&self, mut unit: HardwareUnit) -> Result<(), StorageError> {
        if unit.version == 0 {
            unit.version = self.next_version();
        }
        let guard = self.hardware.pin();
        guard.insert(unit.id.clone(), unit);
        Ok(())
    }

    async fn put_software(&self, mut license: SoftwareLicense) -> Result<(), StorageError> {
        if license.version == 0 {
            license.version = self.next_version();
        }
        let guard = self.software.pin();
        guard.insert(license.id.clone(), license);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
