//! Audit event broadcasting.
//!
//! A single shared "audit" topic backed by a tokio broadcast channel. The
//! durable store is always the source of truth; delivery here is best-effort
//! and a lagging or absent subscriber never affects the writer.

pub mod broadcaster;

pub use broadcaster::AuditBroadcaster;
