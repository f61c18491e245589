// Pubsub Port (Interface)

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors delivered to listeners or returned by pubsub operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PubsubError {
    /// One or more messages between the last delivered message and now were dropped
    #[error("dropped messages")]
    DroppedMessages,

    #[error("pubsub is closed")]
    Closed,

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("publish failed: {0}")]
    Publish(String),
}

/// Listener that receives either a raw message or a delivery error
pub type ListenerWithErr = Arc<dyn Fn(std::result::Result<&[u8], PubsubError>) + Send + Sync>;

/// Handle of an active subscription; the listener stops receiving once the
/// subscription is canceled or dropped.
#[derive(Debug)]
pub struct Subscription {
    token: CancellationToken,
}

impl Subscription {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Best-effort, at-least-once publish/subscribe bus
#[async_trait]
pub trait Pubsub: Send + Sync {
    /// Subscribe `listener` to `event`. The listener is told explicitly
    /// (with [`PubsubError::DroppedMessages`]) when messages were lost.
    async fn subscribe_with_err(&self, event: &str, listener: ListenerWithErr)
        -> Result<Subscription>;

    /// Publish `message` to every subscriber of `event`
    async fn publish(&self, event: &str, message: &[u8]) -> Result<()>;
}
