use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use super::types::{NotificationIntent, SchedulerEvent};

/// Fan-out of [`SchedulerEvent`]s to any number of listeners.
///
/// Publishing never waits: a listener more than `capacity` events behind
/// loses the oldest ones.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SchedulerEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per listener
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Every event published from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.sender.subscribe()
    }

    /// Only the notification intents published from now on
    #[must_use]
    pub fn notifications(&self) -> NotificationReceiver {
        NotificationReceiver {
            rx: self.sender.subscribe(),
        }
    }

    /// Publish to current listeners; returns how many got the event
    pub fn publish(&self, event: SchedulerEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Number of active listeners
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Listener for [`SchedulerEvent::NotificationRequested`]
pub struct NotificationReceiver {
    rx: broadcast::Receiver<SchedulerEvent>,
}

impl NotificationReceiver {
    /// Next intent, or `None` once every publisher is gone.
    ///
    /// Intents dropped because this listener lagged are logged and skipped.
    pub async fn recv(&mut self) -> Option<NotificationIntent> {
        loop {
            match self.rx.recv().await {
                Ok(SchedulerEvent::NotificationRequested(intent)) => return Some(intent),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification listener lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
