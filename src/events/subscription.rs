//! Typed subscription points
//!
//! A `Subscribers<T>` hub lives inside the producer (e.g. the transport's
//! track callback). Each `subscribe()` call returns an independent
//! `Subscription<T>` that buffers everything published after it was created.
//! Dropping or cancelling the subscription detaches it; the hub prunes closed
//! subscribers on the next publish.

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Producer side of a typed event category
pub struct Subscribers<T> {
    senders: Mutex<Vec<mpsc::UnboundedSender<T>>>,
}

impl<T: Clone> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().push(tx);
        Subscription { rx }
    }

    /// Deliver a value to every live subscriber
    pub fn publish(&self, value: T) {
        let mut senders = self.senders.lock();
        senders.retain(|tx| tx.send(value.clone()).is_ok());
    }

    /// Drop every subscriber; their `recv()` returns `None` once drained
    pub fn close(&self) {
        self.senders.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.senders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer side of a typed event category
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Wait for the next value; `None` once the producer is gone
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Stop receiving; values already buffered can still be drained
    pub fn cancel(&mut self) {
        self.rx.close();
    }
}
