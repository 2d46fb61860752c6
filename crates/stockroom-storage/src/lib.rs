//! Storage abstraction layer for the Stockroom server.
//!
//! Defines the contracts every storage backend must implement: the asset
//! store (holders, resources, assignments, conditional commits) and the
//! audit ledger (idempotent upsert by external id, timestamp-cursor reads).
//! Backends must be thread-safe and keep each commit operation atomic; the
//! optimistic-concurrency retry discipline lives above this layer.

pub mod error;
pub mod evented;
pub mod traits;

pub use error::{ErrorCategory, StorageError};
pub use evented::EventedAuditStore;
pub use traits::{AssetStorage, AuditStore, DynAssetStorage, DynAuditStore};
