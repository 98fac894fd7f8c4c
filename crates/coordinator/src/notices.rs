//! Human-readable progress notices, fanned out to any number of listeners.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// One progress line such as "retry attempt 3".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Fire-and-forget broadcast of [`Notice`]s.
///
/// Publishing never blocks and never fails; with no subscribers the notice
/// is only logged. Slow subscribers lose the oldest notices.
#[derive(Debug, Clone)]
pub struct NoticeBoard {
    sender: broadcast::Sender<Notice>,
}

impl NoticeBoard {
    pub const DEFAULT_CAPACITY: usize = 100;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes a notice to every current subscriber.
    pub fn publish(&self, message: impl Into<String>) {
        let notice = Notice {
            at: Utc::now(),
            message: message.into(),
        };
        tracing::info!(target: "notices", message = %notice.message);
        // Err only means nobody is listening right now
        let _ = self.sender.send(notice);
    }

    /// Subscribes to notices published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for NoticeBoard {
    fn default() -> Self {
        Self::new()
    }
}
