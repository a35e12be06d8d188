//! Event bus for guest events.
//!
//! Push-based: subscribers register callbacks that are invoked, in
//! subscription order, for every event the controller receives.

use std::sync::Arc;

use tokio::sync::Mutex;

use avabridge_shared::GuestMessage;

type Subscriber = Box<dyn FnMut(GuestMessage) + Send + 'static>;

/// The bus holds strong references to subscribers, so they persist until
/// cleared or the bus is dropped.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, callback: impl FnMut(GuestMessage) + Send + 'static) {
        self.subscribers.lock().await.push(Box::new(callback));
    }

    /// Invoke every subscriber with a clone of `event`.
    pub async fn dispatch(&self, event: &GuestMessage) {
        let mut subscribers = self.subscribers.lock().await;
        for subscriber in subscribers.iter_mut() {
            subscriber(event.clone());
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    pub async fn clear(&self) {
        self.subscribers.lock().await.clear();
    }
}
