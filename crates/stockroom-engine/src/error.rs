use stockroom_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the assignment engine and audit service.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A referenced holder, resource or assignment does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What kind of record was looked up (holder, resource, assignment).
        kind: String,
        /// The id that missed.
        id: String,
    },

    /// The resource exists but is archived and rejects new assignments.
    #[error("Resource archived: {resource}")]
    ResourceArchived { resource: String },

    /// All seats of the resource are in use. A business rejection, never
    /// retried.
    #[error("Capacity exceeded for {resource}: all {capacity} seats in use")]
    CapacityExceeded { resource: String, capacity: u32 },

    /// The bounded retry loop ran out of attempts on stale concurrency
    /// tokens. Terminal; not retried further up the call stack.
    #[error("Concurrency retries exhausted after {attempts} attempts")]
    ConcurrencyExhausted { attempts: u32 },

    /// Malformed or missing input.
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// An underlying storage failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// Creates a new `NotFound` error.
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Creates a new `ResourceArchived` error.
    pub fn resource_archived(resource: impl Into<String>) -> Self {
        Self::ResourceArchived {
            resource: resource.into(),
        }
    }

    /// Creates a new `CapacityExceeded` error.
    pub fn capacity_exceeded(resource: impl Into<String>, capacity: u32) -> Self {
        Self::CapacityExceeded {
            resource: resource.into(),
            capacity,
        }
    }

    /// Creates a new `ConcurrencyExhausted` error.
    pub fn concurrency_exhausted(attempts: u32) -> Self {
        Self::ConcurrencyExhausted { attempts }
    }

    /// Creates a new `Validation` error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Returns `true` for a stale-concurrency-token conflict, the only error
    /// the retry loop re-attempts.
    pub fn is_retryable_conflict(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_version_conflict())
    }

    /// Returns `true` if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a capacity rejection.
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            EngineError::not_found("holder", "u-7").to_string(),
            "holder not found: u-7"
        );
        assert_eq!(
            EngineError::capacity_exceeded("Software#ide", 5).to_string(),
            "Capacity exceeded for Software#ide: all 5 seats in use"
        );
        assert_eq!(
            EngineError::concurrency_exhausted(3).to_string(),
            "Concurrency retries exhausted after 3 attempts"
        );
    }

    #[test]
    fn only_version_conflicts_are_retryable() {
        let conflict = EngineError::Storage(StorageError::version_conflict(1, 2));
        assert!(conflict.is_retryable_conflict());

        let missing = EngineError::Storage(StorageError::not_found("resource", "x"));
        assert!(!missing.is_retryable_conflict());
        assert!(!EngineError::capacity_exceeded("Hardware#42", 1).is_retryable_conflict());
        assert!(!EngineError::not_found("holder", "u-7").is_retryable_conflict());
    }

    #[test]
    fn predicates() {
        assert!(EngineError::not_found("resource", "x").is_not_found());
        assert!(EngineError::capacity_exceeded("x", 1).is_capacity_exceeded());
        assert!(!EngineError::validation("x").is_not_found());
    }
}
