// In-process pubsub over tokio broadcast channels

use async_trait::async_trait;
use provisionerd_core::error::Result;
use provisionerd_core::port::{ListenerWithErr, Pubsub, PubsubError, Subscription};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Messages a subscriber may fall behind by before it is told it lost some
pub const DEFAULT_CHANNEL_CAPACITY: usize = 2048;

type Message = Arc<[u8]>;

/// Topic-based pubsub for a single process.
///
/// Each subscription is served by its own task, so listeners see messages in
/// publish order. A subscriber that falls more than `capacity` messages
/// behind gets one [`PubsubError::DroppedMessages`] in place of what it
/// missed.
pub struct InMemoryPubsub {
    capacity: usize,
    topics: Mutex<HashMap<String, broadcast::Sender<Message>>>,
    closed: CancellationToken,
}

impl InMemoryPubsub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            topics: Mutex::new(HashMap::new()),
            closed: CancellationToken::new(),
        }
    }

    /// Stop every subscription and reject further use
    pub fn close(&self) {
        self.closed.cancel();
    }

    fn sender(&self, event: &str) -> broadcast::Sender<Message> {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        topics
            .entry(event.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for InMemoryPubsub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Pubsub for InMemoryPubsub {
    async fn subscribe_with_err(
        &self,
        event: &str,
        listener: ListenerWithErr,
    ) -> Result<Subscription> {
        if self.closed.is_cancelled() {
            return Err(PubsubError::Closed.into());
        }
        // subscribe before returning so nothing published afterwards is missed
        let mut rx = self.sender(event).subscribe();
        let token = self.closed.child_token();
        let task_token = token.clone();
        let event = event.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(message) => listener(Ok(&message)),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(event = %event, skipped, "subscriber lagged, messages dropped");
                            listener(Err(PubsubError::DroppedMessages));
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!(event = %event, "subscription closed");
        });

        Ok(Subscription::new(token))
    }

    async fn publish(&self, event: &str, message: &[u8]) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(PubsubError::Closed.into());
        }
        // no subscribers is not an error
        let _ = self.sender(event).send(Arc::from(message));
        Ok(())
    }
}
