use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use common::event::{MeasurementEvent, ServerEvent};
use log::warn;
use tokio::sync::broadcast;

/// Events a slow viewer may fall behind by before it starts skipping.
pub const CHANNEL_CAPACITY: usize = 64;

/// Fan-out of accepted readings to every connected viewer. Late subscribers
/// see only what is published after they subscribed.
#[derive(Clone)]
pub struct Broadcaster {
    sender: broadcast::Sender<ServerEvent>,
    next_id: Arc<AtomicU64>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Never blocks. Returns the number of viewers the event was queued for.
    pub fn publish(&self, event: MeasurementEvent) -> usize {
        self.sender
            .send(ServerEvent::NewMeasurement(event))
            .unwrap_or(0)
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(CHANNEL_CAPACITY)
    }
}

pub struct Subscription {
    id: u64,
    receiver: broadcast::Receiver<ServerEvent>,
}

impl Subscription {
    /// Sequence number, for log correlation only.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event, or `None` once the broadcaster is gone. Events missed by
    /// lagging are skipped.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("viewer {} lagged, skipped {skipped} events", self.id);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-queued event, if any.
    pub fn try_recv(&mut self) -> Option<ServerEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
