// Server-owned values replicated read-only to observers.

use tokio::sync::watch;

/// One published revision of a replicated value.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: u64,
    pub previous: Option<T>,
    pub current: T,
}

/// Holds the authoritative copy; observers get `(previous, current)` on change.
pub struct Replicated<T> {
    tx: watch::Sender<Versioned<T>>,
}

impl<T: Clone + PartialEq> Replicated<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(Versioned {
            version: 0,
            previous: None,
            current: initial,
        });
        Self { tx }
    }

    pub fn get(&self) -> T {
        self.tx.borrow().current.clone()
    }

    pub fn version(&self) -> u64 {
        self.tx.borrow().version
    }

    /// Publishes a new revision; returns false when the value is unchanged.
    pub fn set(&self, value: T) -> bool {
        // send_if_modified publishes even with no receivers attached.
        self.tx.send_if_modified(|state| {
            if state.current == value {
                return false;
            }
            let previous = std::mem::replace(&mut state.current, value.clone());
            state.previous = Some(previous);
            state.version += 1;
            true
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Versioned<T>> {
        self.tx.subscribe()
    }
}
