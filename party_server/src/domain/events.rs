// Observer registry with disposable subscription handles.
//
// Subscribers own an inbox; publishing copies the event into every live inbox
// and the subscriber drains it on its own schedule. Dropping a `Subscription`
// removes it from the registry, so release never depends on closure identity.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::warn;

use super::errors::AuthorityError;
use super::state::{Authority, GateEvent};

type Inbox<E> = Arc<Mutex<VecDeque<E>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Registry<E> {
    next_id: u64,
    subscribers: Vec<(u64, Inbox<E>)>,
}

pub struct EventBus<E> {
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 1,
                subscribers: Vec::new(),
            })),
        }
    }
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription<E> {
        let inbox: Inbox<E> = Arc::new(Mutex::new(VecDeque::new()));
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.push((id, inbox.clone()));
        Subscription {
            id,
            inbox,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Delivers to every live subscriber in subscription order; returns the count.
    pub fn publish(&self, event: E) -> usize {
        let registry = lock(&self.registry);
        for (_, inbox) in &registry.subscribers {
            lock(inbox).push_back(event.clone());
        }
        registry.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).subscribers.len()
    }
}

/// Scoped registration on an `EventBus`; unsubscribes on drop.
pub struct Subscription<E> {
    id: u64,
    inbox: Inbox<E>,
    registry: Weak<Mutex<Registry<E>>>,
}

impl<E> Subscription<E> {
    /// Takes every pending event in publish order.
    pub fn drain(&self) -> Vec<E> {
        lock(&self.inbox).drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inbox).is_empty()
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        // The bus may already be gone at session teardown.
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Channel for trigger-volume signals; only the server may raise them.
#[derive(Default)]
pub struct GateEventBus {
    bus: EventBus<GateEvent>,
}

impl GateEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription<GateEvent> {
        self.bus.subscribe()
    }

    pub fn publish(&self, authority: Authority, event: GateEvent) -> Result<usize, AuthorityError> {
        match authority {
            Authority::Server => Ok(self.bus.publish(event)),
            Authority::Client(caller) => {
                warn!(
                    caller = caller.0,
                    player_id = event.player.0,
                    kind = ?event.kind,
                    "client-raised gate event rejected"
                );
                Err(AuthorityError::ServerOnly { caller })
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }
}
