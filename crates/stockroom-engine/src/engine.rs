//! The capacity-checked, concurrency-safe assignment engine.

use std::sync::Arc;

use crate::audit::AuditService;
use crate::error::EngineError;
use crate::retry::retry_on_conflict;
use stockroom_core::{
    Assignment, AuditAction, AuditEvent, CacheVersionStamp, FieldChange, ResourceKind,
    ResourceRef, now_utc,
};
use stockroom_storage::{DynAssetStorage, StorageError};

/// Default bound for the optimistic-concurrency retry loop.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Outcome of one assign call, before audit and cache side effects.
enum AssignOutcome {
    /// A new assignment row was committed.
    Committed(Assignment),
    /// The holder already had an open assignment on this resource.
    AlreadyOpen(Assignment),
}

/// Outcome of one release call.
enum ReleaseOutcome {
    /// The assignment row was closed.
    Closed(Assignment),
    /// There was nothing open to close.
    NoOp,
}

/// Open/close lifecycle for hardware units and software seats.
///
/// Every committed mutation produces exactly one audit event (best-effort),
/// bumps the cache version stamp, and reaches real-time subscribers through
/// the evented audit store. Mutual exclusion rides on the per-resource
/// concurrency tokens checked by the storage commits; on a stale token the
/// engine retries from a completely fresh read, a bounded number of times.
#[derive(Clone)]
pub struct AssignmentEngine {
    storage: DynAssetStorage,
    audit: AuditService,
    stamp: Arc<CacheVersionStamp>,
    max_attempts: u32,
}

impl AssignmentEngine {
    pub fn new(
        storage: DynAssetStorage,
        audit: AuditService,
        stamp: Arc<CacheVersionStamp>,
    ) -> Self {
        Self {
            storage,
            audit,
            stamp,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Override the retry bound (at least 1).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// The audit service this engine writes through.
    pub fn audit(&self) -> &AuditService {
        &self.audit
    }

    /// Reads one assignment row by id.
    pub async fn assignment(&self, id: &str) -> Result<Option<Assignment>, EngineError> {
        Ok(self.storage.get_assignment(id).await?)
    }

    /// Claim a seat (software) or unit (hardware) for a holder.
    ///
    /// Idempotent: a holder with an existing open assignment on the resource
    /// gets that assignment back with no state change, no audit event and no
    /// stamp bump. Over-capacity requests fail with `CapacityExceeded` and
    /// are never retried; only stale concurrency tokens retry, re-validating
    /// capacity against fresh state each attempt.
    pub async fn assign(
        &self,
        resource: &ResourceRef,
        holder_id: &str,
        actor_id: &str,
        comment: Option<String>,
    ) -> Result<Assignment, EngineError> {
        let holder = self
            .storage
            .get_holder(holder_id)
            .await?
            .ok_or_else(|| EngineError::not_found("holder", holder_id))?;

        let storage = Arc::clone(&self.storage);
        let outcome = retry_on_conflict(self.max_attempts, |_attempt| {
            let storage = Arc::clone(&storage);
            let resource = resource.clone();
            let holder_id = holder_id.to_string();
            let comment = comment.clone();
            async move {
                let record = storage
                    .get_resource(&resource)
                    .await?
                    .ok_or_else(|| EngineError::not_found("resource", resource.to_string()))?;
                if record.archived() {
                    return Err(EngineError::resource_archived(resource.to_string()));
                }

                if let Some(existing) = storage.find_open_assignment(&resource, &holder_id).await? {
                    return Ok(AssignOutcome::AlreadyOpen(existing));
                }

                let open = storage.count_open_assignments(&resource).await?;
                let capacity = record.capacity();
                if open >= capacity {
                    return Err(EngineError::capacity_exceeded(resource.to_string(), capacity));
                }

                let assignment = Assignment::open(resource.clone(), holder_id, comment);
                let committed = storage.commit_assign(&assignment, record.version()).await?;
                Ok(AssignOutcome::Committed(committed))
            }
        })
        .await
        .map_err(|err| {
            if matches!(err, EngineError::ConcurrencyExhausted { .. }) {
                tracing::warn!(resource = %resource, holder_id, "assignment retries exhausted");
            }
            err
        })?;

        match outcome {
            AssignOutcome::AlreadyOpen(existing) => {
                tracing::debug!(
                    resource = %resource,
                    holder_id,
                    assignment_id = %existing.id,
                    "duplicate assign, returning existing open assignment"
                );
                Ok(existing)
            }
            AssignOutcome::Committed(assignment) => {
                tracing::info!(
                    resource = %resource,
                    holder_id,
                    assignment_id = %assignment.id,
                    "assignment committed"
                );
                let event = self.assign_event(&assignment, actor_id, &holder.display_name);
                self.audit.record_best_effort(event).await;
                self.stamp.bump();
                Ok(assignment)
            }
        }
    }

    /// Release an assignment by id.
    ///
    /// Idempotent over already-closed rows: closing something that is no
    /// longer open is a silent no-op with no audit event and no stamp bump.
    /// An unknown assignment id is `NotFound`.
    pub async fn release(
        &self,
        assignment_id: &str,
        actor_id: &str,
        comment: Option<String>,
    ) -> Result<(), EngineError> {
        let assignment = self
            .storage
            .get_assignment(assignment_id)
            .await?
            .ok_or_else(|| EngineError::not_found("assignment", assignment_id))?;
        if !assignment.is_open() {
            tracing::debug!(assignment_id, "assignment already closed, nothing to release");
            return Ok(());
        }

        self.release_open(&assignment, actor_id, comment).await
    }

    /// Release whatever open assignment a holder has on a resource.
    ///
    /// No open assignment is a silent no-op: no error, no audit record, no
    /// counter change.
    pub async fn release_holder(
        &self,
        resource: &ResourceRef,
        holder_id: &str,
        actor_id: &str,
        comment: Option<String>,
    ) -> Result<(), EngineError> {
        match self.storage.find_open_assignment(resource, holder_id).await? {
            Some(assignment) => self.release_open(&assignment, actor_id, comment).await,
            None => {
                tracing::debug!(resource = %resource, holder_id, "no open assignment, release is a no-op");
                Ok(())
            }
        }
    }

    async fn release_open(
        &self,
        assignment: &Assignment,
        actor_id: &str,
        comment: Option<String>,
    ) -> Result<(), EngineError> {
        let resource = assignment.resource.clone();
        let storage = Arc::clone(&self.storage);
        let assignment_id = assignment.id.clone();

        let outcome = retry_on_conflict(self.max_attempts, |_attempt| {
            let storage = Arc::clone(&storage);
            let resource = resource.clone();
            let assignment_id = assignment_id.clone();
            async move {
                // Fresh read each attempt: a racer may have closed it already
                let current = match storage.get_assignment(&assignment_id).await? {
                    Some(a) if a.is_open() => a,
                    _ => return Ok(ReleaseOutcome::NoOp),
                };

                let record = storage
                    .get_resource(&resource)
                    .await?
                    .ok_or_else(|| EngineError::not_found("resource", resource.to_string()))?;

                match storage
                    .commit_release(&current.id, now_utc(), record.version())
                    .await
                {
                    Ok(closed) => Ok(ReleaseOutcome::Closed(closed)),
                    // Closed between our read and the commit: idempotent no-op
                    Err(StorageError::NotFound { .. }) => Ok(ReleaseOutcome::NoOp),
                    Err(err) => Err(err.into()),
                }
            }
        })
        .await
        .map_err(|err| {
            if matches!(err, EngineError::ConcurrencyExhausted { .. }) {
                tracing::warn!(resource = %resource, assignment_id = %assignment.id, "release retries exhausted");
            }
            err
        })?;

        match outcome {
            ReleaseOutcome::NoOp => Ok(()),
            ReleaseOutcome::Closed(closed) => {
                tracing::info!(
                    resource = %resource,
                    assignment_id = %closed.id,
                    "assignment released"
                );
                let event = self.release_event(&closed, actor_id, comment);
                self.audit.record_best_effort(event).await;
                self.stamp.bump();
                Ok(())
            }
        }
    }

    fn assign_event(
        &self,
        assignment: &Assignment,
        actor_id: &str,
        holder_name: &str,
    ) -> AuditEvent {
        let mut builder = AuditEvent::builder(AuditAction::Assign, assignment.resource.clone())
            .actor(actor_id)
            .occurred_at(assignment.assigned_at)
            .description(format!("{} assigned to {holder_name}", assignment.resource))
            .change(FieldChange::new(
                "holder",
                None,
                Some(assignment.holder_id.clone()),
            ));
        if assignment.resource.kind == ResourceKind::Hardware {
            builder = builder.change(FieldChange::new(
                "status",
                Some("available".into()),
                Some("assigned".into()),
            ));
        }
        if let Some(comment) = &assignment.comment {
            builder = builder.change(FieldChange::new("comment", None, Some(comment.clone())));
        }
        builder.build()
    }

    fn release_event(
        &self,
        closed: &Assignment,
        actor_id: &str,
        comment: Option<String>,
    ) -> AuditEvent {
        let mut builder = AuditEvent::builder(AuditAction::Unassign, closed.resource.clone())
            .actor(actor_id)
            .description(format!(
                "{} released from holder {}",
                closed.resource, closed.holder_id
            ))
            .change(FieldChange::new(
                "holder",
                Some(closed.holder_id.clone()),
                None,
            ));
        if let Some(at) = closed.unassigned_at {
            builder = builder.occurred_at(at);
        }
        if closed.resource.kind == ResourceKind::Hardware {
            builder = builder.change(FieldChange::new(
                "status",
                Some("assigned".into()),
                Some("available".into()),
            ));
        }
        if let Some(comment) = comment {
            builder = builder.change(FieldChange::new("comment", None, Some(comment)));
        }
        builder.build()
    }
}
