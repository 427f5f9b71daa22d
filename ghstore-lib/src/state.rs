//! Framework-agnostic plumbing between an owner and its views: a snapshot
//! container observers subscribe to, and a queue for one-shot events.

use tokio::sync::{mpsc, watch};

/// Holds the current snapshot of `T`. Every update is an atomic
/// read-modify-write, so observers never see a half-applied change.
#[derive(Debug)]
pub struct StateContainer<T> {
    sender: watch::Sender<T>,
}

impl<T> StateContainer<T> {
    pub fn new(initial: T) -> Self {
        Self {
            sender: watch::Sender::new(initial),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }

    /// Applies `f` to the current value and notifies observers.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.sender.send_modify(f);
    }

    /// Like [`Self::update`], but observers are only notified when `f` returns true.
    pub fn update_if(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        self.sender.send_if_modified(f)
    }

    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.sender.borrow())
    }
}

impl<T: Clone> StateContainer<T> {
    pub fn snapshot(&self) -> T {
        self.sender.borrow().clone()
    }
}

/// Sending half of a one-shot event queue. Cheap to clone.
#[derive(Debug)]
pub struct EventSender<E> {
    sender: mpsc::UnboundedSender<E>,
}

impl<E> Clone for EventSender<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<E: std::fmt::Debug> EventSender<E> {
    /// Queues an event for the consumer. Dropped silently once the consumer is gone.
    pub fn emit(&self, event: E) {
        if let Err(e) = self.sender.send(event) {
            tracing::debug!("Dropping event, no consumer: {:?}", e.0);
        }
    }
}

/// Creates a single-consumer event queue. Each event is delivered once and never replayed.
pub fn event_queue<E>() -> (EventSender<E>, mpsc::UnboundedReceiver<E>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (EventSender { sender }, receiver)
}
