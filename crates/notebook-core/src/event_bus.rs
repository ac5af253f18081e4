//! Session-scoped event bus between the agent adapter and the prompt runner.
//!
//! The bus is single-threaded and uses interior mutability via RefCell.
//! A backend may multiplex events for several sessions over one channel,
//! so every subscription is scoped to a session id at subscribe time and
//! only ever sees that session's events. Dropping a [`Subscription`]
//! unsubscribes it.

use std::cell::RefCell;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::{FutureExt, Stream, StreamExt};
use notebook_types::event::{ChunkEvent, StatusEvent, StatusUpdate};

struct Listener<T> {
    id: u64,
    session_id: String,
    tx: UnboundedSender<T>,
}

struct Topic<T> {
    next_id: u64,
    listeners: Vec<Listener<T>>,
}

impl<T> Topic<T> {
    fn remove(&mut self, id: u64) {
        self.listeners.retain(|l| l.id != id);
    }
}

impl<T: Clone> Topic<T> {
    fn new() -> Self {
        Self {
            next_id: 0,
            listeners: Vec::new(),
        }
    }

    fn add(&mut self, session_id: &str) -> (u64, UnboundedReceiver<T>) {
        let (tx, rx) = unbounded();
        self.next_id += 1;
        let id = self.next_id;
        self.listeners.push(Listener {
            id,
            session_id: session_id.to_string(),
            tx,
        });
        (id, rx)
    }

    fn publish(&mut self, session_id: &str, event: T) -> usize {
        // Receivers dropped while the topic was borrowed are pruned here.
        self.listeners.retain(|l| !l.tx.is_closed());
        self.listeners
            .iter()
            .filter(|l| l.session_id == session_id)
            .filter(|l| l.tx.unbounded_send(event.clone()).is_ok())
            .count()
    }

    fn count(&self, session_id: &str) -> usize {
        self.listeners
            .iter()
            .filter(|l| l.session_id == session_id && !l.tx.is_closed())
            .count()
    }
}

/// Shared event bus, clone-cheap via Rc.
#[derive(Clone)]
pub struct EventBus {
    chunks: Rc<RefCell<Topic<ChunkEvent>>>,
    status: Rc<RefCell<Topic<StatusEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            chunks: Rc::new(RefCell::new(Topic::new())),
            status: Rc::new(RefCell::new(Topic::new())),
        }
    }

    /// Publish a response fragment. Returns how many subscriptions received it.
    pub fn publish_chunk(&self, session_id: &str, text: impl Into<String>) -> usize {
        let event = ChunkEvent {
            session_id: session_id.to_string(),
            text: text.into(),
        };
        self.chunks.borrow_mut().publish(session_id, event)
    }

    /// Publish tool activity. Returns how many subscriptions received it.
    pub fn publish_status(&self, session_id: &str, update: StatusUpdate) -> usize {
        let event = StatusEvent {
            session_id: session_id.to_string(),
            update,
        };
        self.status.borrow_mut().publish(session_id, event)
    }

    /// Response fragments for one session, in arrival order.
    pub fn subscribe_chunks(&self, session_id: &str) -> Subscription<ChunkEvent> {
        Subscription::attach(&self.chunks, session_id)
    }

    /// Tool activity for one session.
    pub fn subscribe_status(&self, session_id: &str) -> Subscription<StatusEvent> {
        Subscription::attach(&self.status, session_id)
    }

    /// Live subscriptions (chunk + status) for a session.
    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.chunks.borrow().count(session_id) + self.status.borrow().count(session_id)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription to one session's events. Unsubscribes on drop.
pub struct Subscription<T> {
    id: u64,
    topic: Weak<RefCell<Topic<T>>>,
    rx: UnboundedReceiver<T>,
}

impl<T: Clone> Subscription<T> {
    fn attach(topic: &Rc<RefCell<Topic<T>>>, session_id: &str) -> Self {
        let (id, rx) = topic.borrow_mut().add(session_id);
        Self {
            id,
            topic: Rc::downgrade(topic),
            rx,
        }
    }
}

impl<T> Subscription<T> {
    /// Next already-delivered event, without waiting.
    pub fn try_next_event(&mut self) -> Option<T> {
        self.rx.next().now_or_never().flatten()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_next_unpin(cx)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.rx.close();
        if let Some(topic) = self.topic.upgrade() {
            if let Ok(mut topic) = topic.try_borrow_mut() {
                topic.remove(self.id);
            }
        }
    }
}
