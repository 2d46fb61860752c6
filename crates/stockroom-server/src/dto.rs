//! Transport records for the audit event feed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use stockroom_core::AuditEvent;

/// Wire shape of one audit event, pushed over the realtime channel and
/// returned by the catch-up endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditEventDto {
    /// External id when present, internal id otherwise.
    pub id: String,
    pub occurred_at_utc: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// `"Display Name (id)"`, or the bare actor id when the directory has no
    /// entry for it.
    pub user: String,
    /// `"Hardware#42"` / `"Software#ide"`.
    pub target: String,
    pub details: String,
    /// Stable content hash over the immutable identity fields.
    pub hash: String,
}

impl AuditEventDto {
    /// Map a stored event, resolving the actor through an optional display
    /// name from the holder directory.
    pub fn from_event(event: &AuditEvent, actor_name: Option<&str>) -> Self {
        let id = if event.external_id.is_empty() {
            event.id.clone()
        } else {
            event.external_id.clone()
        };
        let user = match actor_name {
            Some(name) => format!("{name} ({})", event.actor_id),
            None => event.actor_id.clone(),
        };
        let hash = content_hash(event);
        Self {
            id,
            occurred_at_utc: event.occurred_at.to_string(),
            event_type: event.action.to_string(),
            user,
            target: event.target.to_string(),
            details: event.description.clone(),
            hash,
        }
    }
}

/// Stable hash over the identity fields that never change across upserts of
/// the same external id, plus the occurrence timestamp.
pub fn content_hash(event: &AuditEvent) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event.external_id.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(event.action.to_string().as_bytes());
    hasher.update(b"\x1f");
    hasher.update(event.target.to_string().as_bytes());
    hasher.update(b"\x1f");
    hasher.update(event.occurred_at.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Weak ETag over the newest item id and the result count: identical result
/// sets produce identical tags, so pollers can short-circuit with
/// `If-None-Match`.
pub fn events_etag(newest_id: Option<&str>, count: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(newest_id.unwrap_or("").as_bytes());
    hasher.update(b"\x1f");
    hasher.update(count.to_string().as_bytes());
    let digest = hasher.finalize();
    format!("W/\"{digest:x}\"")
}

/// Check `If-None-Match` against the computed ETag. The header may carry a
/// comma-separated list.
pub fn if_none_match_matches(header: Option<&str>, etag: &str) -> bool {
    match header {
        Some(value) => value.split(',').any(|part| part.trim() == etag),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use stockroom_core::{AuditAction, ResourceRef, UtcDateTime};

    fn event() -> AuditEvent {
        let mut e = AuditEvent::builder(AuditAction::Assign, ResourceRef::hardware("42"))
            .external_id("evt-1")
            .actor("u-7")
            .description("ThinkPad assigned")
            .build();
        e.occurred_at = UtcDateTime::from_str("2024-03-01T10:00:00Z").unwrap();
        e
    }

    #[test]
    fn dto_uses_external_id_and_formats_user() {
        let dto = AuditEventDto::from_event(&event(), Some("Dana Smith"));
        assert_eq!(dto.id, "evt-1");
        assert_eq!(dto.user, "Dana Smith (u-7)");
        assert_eq!(dto.event_type, "Assign");
        assert_eq!(dto.target, "Hardware#42");
        assert_eq!(dto.occurred_at_utc, "2024-03-01T10:00:00Z");
    }

    #[test]
    fn dto_falls_back_to_internal_id_and_bare_actor() {
        let mut e = event();
        e.external_id = String::new();
        let dto = AuditEventDto::from_event(&e, None);
        assert_eq!(dto.id, e.id);
        assert_eq!(dto.user, "u-7");
    }

    #[test]
    fn dto_serializes_camel_case() {
        let dto = AuditEventDto::from_event(&event(), None);
        let json = serde_json::to_value(&dto).unwrap();
        assert!(json.get("occurredAtUtc").is_some());
        assert!(json.get("type").is_some());
        assert!(json.get("hash").is_some());
    }

    #[test]
    fn content_hash_is_stable_and_sensitive() {
        let a = content_hash(&event());
        let b = content_hash(&event());
        assert_eq!(a, b);

        let mut changed = event();
        changed.external_id = "evt-2".into();
        assert_ne!(content_hash(&changed), a);
    }

    #[test]
    fn content_hash_ignores_description_edits() {
        let mut edited = event();
        edited.description = "reworded".into();
        assert_eq!(content_hash(&edited), content_hash(&event()));
    }

    #[test]
    fn etag_is_stable_for_identical_results() {
        let a = events_etag(Some("evt-9"), 4);
        let b = events_etag(Some("evt-9"), 4);
        assert_eq!(a, b);
        assert!(a.starts_with("W/\""));

        assert_ne!(events_etag(Some("evt-9"), 5), a);
        assert_ne!(events_etag(Some("evt-8"), 4), a);
        assert_ne!(events_etag(None, 0), a);
    }

    #[test]
    fn if_none_match_handles_lists() {
        let etag = events_etag(Some("evt-9"), 4);
        assert!(if_none_match_matches(Some(&etag), &etag));
        assert!(if_none_match_matches(
            Some(&format!("W/\"other\", {etag}")),
            &etag
        ));
        assert!(!if_none_match_matches(Some("W/\"other\""), &etag));
        assert!(!if_none_match_matches(None, &etag));
    }
}
