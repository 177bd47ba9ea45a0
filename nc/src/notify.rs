//! Operator notifications
//!
//! Toasts are published on a tokio broadcast channel. The engine client
//! publishes request failures, the flow controller publishes action outcomes,
//! and the TUI and CLI subscribe to show them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Default channel capacity (notifications)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Severity, used for colouring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Success => write!(f, "success"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// What caused the notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    /// An operator action was accepted or rejected by the engine
    ActionOutcome,
    /// A request to the engine failed
    RequestFailed,
    /// The session credential was revoked; the operator must log in again
    ReauthRequired,
    /// An action was blocked locally, nothing was sent
    InputBlocked,
    /// Anything else worth a toast
    General,
}

/// One operator-visible toast
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub level: Level,
    pub kind: NotificationKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: Level, kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            level,
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(Level::Success, NotificationKind::ActionOutcome, message)
    }

    /// An action the engine declined
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(Level::Error, NotificationKind::ActionOutcome, message)
    }

    pub fn request_failed(message: impl Into<String>) -> Self {
        Self::new(Level::Error, NotificationKind::RequestFailed, message)
    }

    pub fn reauth_required() -> Self {
        Self::new(
            Level::Warning,
            NotificationKind::ReauthRequired,
            "Session expired. Please log in again.",
        )
    }

    pub fn input_blocked(message: impl Into<String>) -> Self {
        Self::new(Level::Warning, NotificationKind::InputBlocked, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Level::Info, NotificationKind::General, message)
    }
}

/// Broadcast channel for notifications
///
/// Cheap to clone; clones share the channel.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    tx: broadcast::Sender<Notification>,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "NotificationBus::new: called");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the notification is dropped.
    pub fn publish(&self, notification: Notification) {
        debug!(level = %notification.level, kind = ?notification.kind, message = %notification.message, "NotificationBus::publish");
        let _ = self.tx.send(notification);
    }

    /// Receive notifications published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = NotificationBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(Notification::info("nobody listening"));
    }

    #[tokio::test]
    async fn test_publish_receive() {
        let bus = NotificationBus::default();
        let mut rx = bus.subscribe();

        bus.publish(Notification::success("Step submitted"));

        let n = rx.recv().await.unwrap();
        assert_eq!(n.level, Level::Success);
        assert_eq!(n.kind, NotificationKind::ActionOutcome);
        assert_eq!(n.message, "Step submitted");
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_clones_share_channel() {
        let bus = NotificationBus::default();
        let mut rx = bus.subscribe();
        let clone = bus.clone();

        clone.publish(Notification::reauth_required());

        let n = rx.recv().await.unwrap();
        assert_eq!(n.kind, NotificationKind::ReauthRequired);
    }

    #[test]
    fn test_ids_unique() {
        let a = Notification::info("a");
        let b = Notification::info("a");
        assert_ne!(a.id, b.id);
    }
}
