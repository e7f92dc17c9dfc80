use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use super::{EngineEvent, EventChannel, FileEvent};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Typed publish/subscribe bus with one broadcast channel per [`EventChannel`].
///
/// Cloning is cheap and every clone publishes into the same channels.
/// Publishing never blocks; a subscriber that falls more than `capacity`
/// events behind skips the overflow and keeps going.
#[derive(Clone)]
pub struct EventBus {
    senders: Arc<HashMap<EventChannel, broadcast::Sender<EngineEvent>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let senders = EventChannel::ALL
            .into_iter()
            .map(|channel| (channel, broadcast::channel(capacity).0))
            .collect();
        Self {
            senders: Arc::new(senders),
        }
    }

    /// Publishes an event on its channel.
    ///
    /// Returns the number of subscribers that will see it (zero is fine).
    pub fn publish(&self, event: EngineEvent) -> usize {
        let channel = event.channel();
        match self.senders.get(&channel) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    pub fn subscribe(&self, channel: EventChannel) -> EventSubscription {
        let receiver = self
            .senders
            .get(&channel)
            .map(|sender| sender.subscribe())
            // Every channel is created in `new`.
            .unwrap_or_else(|| broadcast::channel(1).1);
        EventSubscription { channel, receiver }
    }

    pub fn subscriber_count(&self, channel: EventChannel) -> usize {
        self.senders
            .get(&channel)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

/// Receiving end for one channel. Events arrive in emission order.
pub struct EventSubscription {
    channel: EventChannel,
    receiver: broadcast::Receiver<EngineEvent>,
}

impl EventSubscription {
    pub fn channel(&self) -> EventChannel {
        self.channel
    }

    /// Waits for the next event. `None` once every publisher is gone.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "[EventBus] Subscriber on {:?} lagged, skipped {} events",
                        self.channel,
                        skipped
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Waits for the next filesystem event, skipping anything else.
    pub async fn recv_file_event(&mut self) -> Option<FileEvent> {
        loop {
            if let EngineEvent::FileChanged(event) = self.recv().await? {
                return Some(event);
            }
        }
    }
}
