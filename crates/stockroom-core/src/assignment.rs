//! Assignment rows and audit event records.

use crate::error::{CoreError, Result};
use crate::id::generate_id;
use crate::resource::ResourceRef;
use crate::time::{UtcDateTime, now_utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One holder's claim on one resource unit.
///
/// Created open, closed exactly once by a release, never deleted and never
/// reopened; a later claim on the same resource is a new row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub resource: ResourceRef,
    pub holder_id: String,
    pub assigned_at: UtcDateTime,
    /// `None` while the assignment is open.
    pub unassigned_at: Option<UtcDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Assignment {
    /// Create a new open assignment with a generated id.
    pub fn open(
        resource: ResourceRef,
        holder_id: impl Into<String>,
        comment: Option<String>,
    ) -> Self {
        Self {
            id: generate_id(),
            resource,
            holder_id: holder_id.into(),
            assigned_at: now_utc(),
            unassigned_at: None,
            comment,
        }
    }

    pub fn is_open(&self) -> bool {
        self.unassigned_at.is_none()
    }

    /// The closed copy of this assignment. The original row stays untouched.
    pub fn closed(&self, unassigned_at: UtcDateTime) -> Self {
        Self {
            unassigned_at: Some(unassigned_at),
            ..self.clone()
        }
    }
}

/// Action recorded by an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    Assign,
    Unassign,
    Create,
    Update,
    Archive,
    Restore,
}

impl AuditAction {
    /// Human-readable display name used in event descriptions.
    pub fn display(&self) -> &'static str {
        match self {
            Self::Assign => "Assigned",
            Self::Unassign => "Unassigned",
            Self::Create => "Created",
            Self::Update => "Updated",
            Self::Archive => "Archived",
            Self::Restore => "Restored",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assign => write!(f, "Assign"),
            Self::Unassign => write!(f, "Unassign"),
            Self::Create => write!(f, "Create"),
            Self::Update => write!(f, "Update"),
            Self::Archive => write!(f, "Archive"),
            Self::Restore => write!(f, "Restore"),
        }
    }
}

impl FromStr for AuditAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Assign" => Ok(Self::Assign),
            "Unassign" => Ok(Self::Unassign),
            "Create" => Ok(Self::Create),
            "Update" => Ok(Self::Update),
            "Archive" => Ok(Self::Archive),
            "Restore" => Ok(Self::Restore),
            other => Err(CoreError::validation(format!("Unknown audit action '{other}'"))),
        }
    }
}

/// One field-level change carried by an audit event, order preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

impl FieldChange {
    pub fn new(
        field: impl Into<String>,
        old: Option<String>,
        new: Option<String>,
    ) -> Self {
        Self {
            field: field.into(),
            old,
            new,
        }
    }
}

/// Immutable-by-identity record of one state change.
///
/// Identity is the caller-supplied `external_id`; re-submitting the same
/// external id overwrites the mutable fields in place instead of inserting a
/// duplicate. The internal `id` never changes after the first insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Internal row id, assigned on first insert.
    pub id: String,
    /// Caller-supplied idempotency key.
    pub external_id: String,
    pub actor_id: String,
    pub action: AuditAction,
    pub target: ResourceRef,
    pub occurred_at: UtcDateTime,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<FieldChange>,
}

impl AuditEvent {
    pub fn builder(action: AuditAction, target: ResourceRef) -> AuditEventBuilder {
        AuditEventBuilder::new(action, target)
    }

    /// Copy the mutable fields of `newer` onto this row, keeping identity.
    pub fn overwritten_by(&self, newer: &AuditEvent) -> Self {
        Self {
            id: self.id.clone(),
            external_id: self.external_id.clone(),
            actor_id: newer.actor_id.clone(),
            action: newer.action,
            target: newer.target.clone(),
            occurred_at: newer.occurred_at,
            description: newer.description.clone(),
            changes: newer.changes.clone(),
        }
    }
}

/// Builder for audit events.
#[derive(Debug, Clone)]
pub struct AuditEventBuilder {
    external_id: Option<String>,
    actor_id: String,
    action: AuditAction,
    target: ResourceRef,
    occurred_at: Option<UtcDateTime>,
    description: Option<String>,
    changes: Vec<FieldChange>,
}

impl AuditEventBuilder {
    pub fn new(action: AuditAction, target: ResourceRef) -> Self {
        Self {
            external_id: None,
            actor_id: "system".to_string(),
            action,
            target,
            occurred_at: None,
            description: None,
            changes: Vec::new(),
        }
    }

    /// Set the idempotency key. Defaults to a generated id when not supplied.
    pub fn external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = actor_id.into();
        self
    }

    pub fn occurred_at(mut self, at: UtcDateTime) -> Self {
        self.occurred_at = Some(at);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn change(mut self, change: FieldChange) -> Self {
        self.changes.push(change);
        self
    }

    pub fn changes(mut self, changes: Vec<FieldChange>) -> Self {
        self.changes = changes;
        self
    }

    pub fn build(self) -> AuditEvent {
        let description = self
            .description
            .unwrap_or_else(|| format!("{} {}", self.action.display(), self.target));
        AuditEvent {
            id: generate_id(),
            external_id: self.external_id.unwrap_or_else(generate_id),
            actor_id: self.actor_id,
            action: self.action,
            target: self.target,
            occurred_at: self.occurred_at.unwrap_or_else(now_utc),
            description,
            changes: self.changes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn new_assignment_is_open() {
        let a = Assignment::open(ResourceRef::hardware("42"), "u-7", None);
        assert!(a.is_open());
        assert!(a.comment.is_none());
        assert!(!a.id.is_empty());
    }

    #[test]
    fn closed_copy_keeps_identity() {
        let a = Assignment::open(ResourceRef::software("ide"), "u-7", Some("loaner".into()));
        let at = now_utc();
        let closed = a.closed(at);
        assert!(!closed.is_open());
        assert_eq!(closed.id, a.id);
        assert_eq!(closed.unassigned_at, Some(at));
        assert!(a.is_open());
    }

    #[test]
    fn audit_action_round_trip() {
        for action in [
            AuditAction::Assign,
            AuditAction::Unassign,
            AuditAction::Create,
            AuditAction::Update,
            AuditAction::Archive,
            AuditAction::Restore,
        ] {
            let parsed = AuditAction::from_str(&action.to_string()).unwrap();
            assert_eq!(parsed, action);
        }
        assert!(AuditAction::from_str("Explode").is_err());
    }

    #[test]
    fn builder_defaults() {
        let event = AuditEvent::builder(AuditAction::Assign, ResourceRef::hardware("42")).build();
        assert_eq!(event.actor_id, "system");
        assert_eq!(event.description, "Assigned Hardware#42");
        assert!(!event.external_id.is_empty());
        assert_ne!(event.id, event.external_id);
    }

    #[test]
    fn builder_sets_all_fields() {
        let at = now_utc();
        let event = AuditEvent::builder(AuditAction::Unassign, ResourceRef::software("ide"))
            .external_id("evt-1")
            .actor("u-9")
            .occurred_at(at)
            .description("seat returned")
            .change(FieldChange::new("status", Some("assigned".into()), Some("available".into())))
            .build();
        assert_eq!(event.external_id, "evt-1");
        assert_eq!(event.actor_id, "u-9");
        assert_eq!(event.occurred_at, at);
        assert_eq!(event.description, "seat returned");
        assert_eq!(event.changes.len(), 1);
    }

    #[test]
    fn overwrite_keeps_identity_and_takes_latest_content() {
        let first = AuditEvent::builder(AuditAction::Create, ResourceRef::hardware("42"))
            .external_id("evt-1")
            .description("first")
            .build();
        let second = AuditEvent::builder(AuditAction::Update, ResourceRef::hardware("42"))
            .external_id("evt-1")
            .actor("u-2")
            .description("second")
            .build();

        let merged = first.overwritten_by(&second);
        assert_eq!(merged.id, first.id);
        assert_eq!(merged.external_id, "evt-1");
        assert_eq!(merged.action, AuditAction::Update);
        assert_eq!(merged.description, "second");
        assert_eq!(merged.actor_id, "u-2");
    }
}
