//! Broadcaster for committed audit events.
//!
//! Uses tokio's broadcast channel for multi-producer, multi-consumer
//! messaging. Cloneable and shareable across the application.

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::assignment::AuditEvent;

/// Default buffer size for the broadcast channel.
/// Slow receivers past this limit lose the oldest events.
const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Broadcaster for the shared audit topic.
///
/// # Example
///
/// ```
/// use stockroom_core::events::AuditBroadcaster;
/// use stockroom_core::{AuditAction, AuditEvent, ResourceRef};
///
/// let broadcaster = AuditBroadcaster::new();
/// let mut receiver = broadcaster.subscribe();
///
/// broadcaster.send(AuditEvent::builder(AuditAction::Assign, ResourceRef::hardware("42")).build());
/// // receiver.recv().await in another task
/// ```
#[derive(Clone)]
pub struct AuditBroadcaster {
    sender: broadcast::Sender<AuditEvent>,
}

impl AuditBroadcaster {
    /// Create a new broadcaster with default buffer size.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    /// Create a new broadcaster with custom buffer size.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create a new broadcaster wrapped in an Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Send an audit event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, 0 when no
    /// subscriber is connected. Never fails.
    pub fn send(&self, event: AuditEvent) -> usize {
        self.sender.send(event).unwrap_or_default()
    }

    /// Subscribe to the audit topic.
    ///
    /// Events sent before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers.
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Default for AuditBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AuditBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditBroadcaster")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
