//! Bounded FIFO between the feed connector and the batch writer.
//!
//! Single producer, single consumer. The producer side never waits: a push
//! into a full queue fails immediately and the caller drops the message. The
//! consumer waits with a timeout.

use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::QueueFullError;
use crate::message::FeedMessage;

pub struct TickQueue {
    tx: mpsc::Sender<FeedMessage>,
    rx: Mutex<mpsc::Receiver<FeedMessage>>,
}

impl TickQueue {
    /// Create a queue holding at most `capacity` messages.
    ///
    /// # Panics
    /// Panics if `capacity` is zero; `IngestConfig::validate` rejects that.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Messages currently buffered
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Non-blocking enqueue. On a full queue the message is handed back to
    /// be discarded.
    pub fn try_push(&self, msg: FeedMessage) -> Result<(), QueueFullError> {
        self.tx.try_send(msg).map_err(|_| QueueFullError {
            capacity: self.tx.max_capacity(),
        })
    }

    /// Wait up to `timeout` for the next message.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<FeedMessage> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    /// Wait for the next message until `cancel` fires.
    pub async fn pop(&self, cancel: &CancellationToken) -> Option<FeedMessage> {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            msg = rx.recv() => msg,
        }
    }

    /// Take a message only if one is already buffered.
    pub async fn try_pop(&self) -> Option<FeedMessage> {
        self.rx.lock().await.try_recv().ok()
    }
}
