//! The agent's inbound message queue.
//!
//! A FIFO that supports atomic multi-message `drain`, and a single
//! sanctioned waiter that parks until something arrives. An `mpsc::Receiver`
//! gives you one message at a time with no way to peek at "everything that's
//! queued right now" without racing a second producer — `Mutex<VecDeque<_>>`
//! plus `Notify` gives us both operations directly.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use crate::types::QueueMessage;

/// FIFO inbound queue, cheap to clone (an `Arc` around shared internals) so
/// HTTP handlers and the executor loop can each hold their own handle.
#[derive(Clone)]
pub struct MessageQueue {
    inner: Arc<Inner>,
}

struct Inner {
    items: Mutex<VecDeque<QueueMessage>>,
    notify: Notify,
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageQueue {
    pub fn new() -> Self {
        MessageQueue {
            inner: Arc::new(Inner {
                items: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
            }),
        }
    }

    /// Push a message to the back of the queue and wake a waiter, if any.
    pub async fn push(&self, message: QueueMessage) {
        let mut items = self.inner.items.lock().await;
        items.push_back(message);
        drop(items);
        self.inner.notify.notify_one();
    }

    /// Atomically remove and return every currently-queued message, in FIFO
    /// order, leaving the queue empty. Never blocks.
    pub async fn drain(&self) -> Vec<QueueMessage> {
        let mut items = self.inner.items.lock().await;
        items.drain(..).collect()
    }

    /// True if the queue currently holds at least one message.
    pub async fn has_pending(&self) -> bool {
        !self.inner.items.lock().await.is_empty()
    }

    /// Block until at least one message is queued, then return without
    /// draining it — callers decide when to `drain`. Only one task should
    /// call `wait` at a time; a second
    /// concurrent waiter is also safe, just not part of the contract this
    /// queue is designed around (a single executor loop per agent process).
    pub async fn wait(&self) {
        if self.has_pending().await {
            return;
        }
        self.inner.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_then_drain_preserves_order() {
        let q = MessageQueue::new();
        q.push(QueueMessage::new("cli", "first")).await;
        q.push(QueueMessage::new("cli", "second")).await;
        let drained = q.drain().await;
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].content, "first");
        assert_eq!(drained[1].content, "second");
    }

    #[tokio::test]
    async fn drain_empties_the_queue() {
        let q = MessageQueue::new();
        q.push(QueueMessage::new("cli", "only")).await;
        let _ = q.drain().await;
        assert!(!q.has_pending().await);
        assert!(q.drain().await.is_empty());
    }

    #[tokio::test]
    async fn wait_returns_immediately_if_already_pending() {
        let q = MessageQueue::new();
        q.push(QueueMessage::new("cli", "hi")).await;
        tokio::time::timeout(std::time::Duration::from_millis(100), q.wait())
            .await
            .expect("wait should not block when a message is already queued");
    }

    #[tokio::test]
    async fn wait_wakes_on_push_from_another_task() {
        let q = MessageQueue::new();
        let q2 = q.clone();
        let waiter = tokio::spawn(async move {
            q2.wait().await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        q.push(QueueMessage::new("cli", "wake up")).await;
        tokio::time::timeout(std::time::Duration::from_millis(500), waiter)
            .await
            .expect("waiter should be woken by push")
            .unwrap();
    }

    #[tokio::test]
    async fn clone_shares_the_same_underlying_queue() {
        let q = MessageQueue::new();
        let q2 = q.clone();
        q.push(QueueMessage::new("cli", "shared")).await;
        assert!(q2.has_pending().await);
    }
}
