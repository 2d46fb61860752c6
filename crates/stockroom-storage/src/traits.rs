//! Storage traits for the Stockroom storage abstraction layer.
//!
//! This module defines the core traits that all storage backends must
//! implement.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageError;
use stockroom_core::{
    Assignment, AuditEvent, HardwareUnit, Holder, ResourceRecord, ResourceRef, SoftwareLicense,
    UtcDateTime,
};

/// Shared handle to an asset storage backend.
pub type DynAssetStorage = Arc<dyn AssetStorage>;

/// Shared handle to an audit store backend.
pub type DynAuditStore = Arc<dyn AuditStore>;

/// The asset store: holder/resource directories, assignment rows and the
/// conditional commit operations carrying the optimistic-concurrency tokens.
///
/// Implementations must be thread-safe (`Send + Sync`). Each commit operation
/// must be atomic: it either applies the assignment row change, the resource
/// status/seat change and the token bump together, or nothing at all. The
/// bounded retry loop around stale tokens lives in the engine, not here.
///
/// # Example
///
/// ```ignore
/// use stockroom_storage::{AssetStorage, StorageError};
///
/// async fn capacity_left(storage: &dyn AssetStorage, r: &ResourceRef) -> Result<u32, StorageError> {
///     let record = storage
///         .get_resource(r)
///         .await?
///         .ok_or_else(|| StorageError::not_found("resource", r.to_string()))?;
///     Ok(record.capacity() - storage.count_open_assignments(r).await?)
/// }
/// ```
#[async_trait]
pub trait AssetStorage: Send + Sync {
    // ==================== Directories ====================

    /// Looks up a holder by id.
    ///
    /// Returns `None` if the holder does not exist.
    async fn get_holder(&self, id: &str) -> Result<Option<Holder>, StorageError>;

    /// Looks up a resource record (of either kind) by reference.
    ///
    /// Returns `None` if the resource does not exist. The returned record
    /// carries the current concurrency token for conditional commits.
    async fn get_resource(
        &self,
        resource: &ResourceRef,
    ) -> Result<Option<ResourceRecord>, StorageError>;

    // ==================== Assignments ====================

    /// Reads an assignment row by id.
    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>, StorageError>;

    /// Finds the open assignment held by `holder_id` on `resource`, if any.
    async fn find_open_assignment(
        &self,
        resource: &ResourceRef,
        holder_id: &str,
    ) -> Result<Option<Assignment>, StorageError>;

    /// Counts open assignments referencing `resource`.
    async fn count_open_assignments(&self, resource: &ResourceRef) -> Result<u32, StorageError>;

    /// Lists open assignments referencing `resource`.
    async fn list_open_assignments(
        &self,
        resource: &ResourceRef,
    ) -> Result<Vec<Assignment>, StorageError>;

    // ==================== Conditional commits ====================

    /// Persists a new open assignment, conditional on the resource's
    /// concurrency token still being `expected_version`.
    ///
    /// In the same atomic operation the backend bumps the token, flips a
    /// hardware unit's status to assigned, and increments a software
    /// license's used-seat count.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::VersionConflict` if the token has moved.
    /// Returns `StorageError::NotFound` if the resource does not exist.
    async fn commit_assign(
        &self,
        assignment: &Assignment,
        expected_version: u64,
    ) -> Result<Assignment, StorageError>;

    /// Closes an open assignment, conditional on the resource's concurrency
    /// token still being `expected_version`.
    ///
    /// Atomically sets `unassigned_at`, bumps the token, flips a hardware
    /// unit's status back to available, and decrements a software license's
    /// used-seat count. Returns the closed row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::VersionConflict` if the token has moved.
    /// Returns `StorageError::NotFound` if the assignment does not exist or
    /// is already closed.
    async fn commit_release(
        &self,
        assignment_id: &str,
        unassigned_at: UtcDateTime,
        expected_version: u64,
    ) -> Result<Assignment, StorageError>;

    // ==================== Seeding ====================

    /// Inserts or replaces a holder directory record.
    async fn put_holder(&self, holder: Holder) -> Result<(), StorageError>;

    /// Inserts or replaces a hardware unit record.
    async fn put_hardware(&self, unit: HardwareUnit) -> Result<(), StorageError>;

    /// Inserts or replaces a software license record.
    async fn put_software(&self, license: SoftwareLicense) -> Result<(), StorageError>;

    // ==================== Metadata ====================

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

/// The audit ledger: idempotent upsert keyed by external id plus the
/// timestamp-cursor read used by the catch-up endpoint.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Inserts the event, or overwrites the mutable fields of the existing
    /// row sharing its external id ("latest received write wins").
    ///
    /// Atomic per call. Postcondition: exactly one row exists for the
    /// external id regardless of call count; the internal id assigned on
    /// first insert never changes. Returns the stored row.
    async fn upsert(&self, event: AuditEvent) -> Result<AuditEvent, StorageError>;

    /// Returns events with `occurred_at > since`, newest first, truncated to
    /// `limit` rows. Callers clamp `limit` before handing it down.
    async fn events_since(
        &self,
        since: UtcDateTime,
        limit: u32,
    ) -> Result<Vec<AuditEvent>, StorageError>;

    /// Reads one event by external id, falling back to internal id.
    async fn get(&self, id: &str) -> Result<Option<AuditEvent>, StorageError>;

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
