// Routes outbound remote calls to connected sockets.
//
// Everyone-addressed calls go through one broadcast channel; Single and Owner
// calls go to the recipient's own queue. Owner lookups follow the entity map
// kept current by the player-control adapter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::domain::ports::{ClientCommand, ClientOutbox, Target};
use crate::domain::{EntityRef, PlayerId};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ConnectionHub {
    everyone: broadcast::Sender<ClientCommand>,
    players: Mutex<HashMap<PlayerId, mpsc::Sender<ClientCommand>>>,
    owners: Mutex<HashMap<EntityRef, PlayerId>>,
    player_capacity: usize,
}

impl ConnectionHub {
    pub fn new(broadcast_capacity: usize, player_capacity: usize) -> Self {
        let (everyone, _rx) = broadcast::channel(broadcast_capacity);
        Self {
            everyone,
            players: Mutex::new(HashMap::new()),
            owners: Mutex::new(HashMap::new()),
            player_capacity,
        }
    }

    /// Registers a socket; subscribe before the session learns about the player.
    pub fn register(
        &self,
        player: PlayerId,
    ) -> (mpsc::Receiver<ClientCommand>, broadcast::Receiver<ClientCommand>) {
        let (tx, rx) = mpsc::channel(self.player_capacity);
        if lock(&self.players).insert(player, tx).is_some() {
            warn!(player_id = player.0, "replaced existing player queue");
        }
        (rx, self.everyone.subscribe())
    }

    pub fn unregister(&self, player: PlayerId) {
        lock(&self.players).remove(&player);
        lock(&self.owners).retain(|_, owner| *owner != player);
    }

    pub fn is_connected(&self, player: PlayerId) -> bool {
        lock(&self.players).contains_key(&player)
    }

    pub fn set_owner(&self, entity: EntityRef, player: PlayerId) {
        lock(&self.owners).insert(entity, player);
    }

    pub fn clear_owner(&self, entity: EntityRef) {
        lock(&self.owners).remove(&entity);
    }

    pub fn owner_of(&self, entity: EntityRef) -> Option<PlayerId> {
        lock(&self.owners).get(&entity).copied()
    }

    pub fn broadcast(&self, command: ClientCommand) {
        // No receivers just means nobody is connected.
        let _ = self.everyone.send(command);
    }

    /// Returns false when the player has no socket or their queue is full.
    pub fn send_to(&self, player: PlayerId, command: ClientCommand) -> bool {
        let Some(tx) = lock(&self.players).get(&player).cloned() else {
            debug!(player_id = player.0, "no socket for targeted call");
            return false;
        };
        match tx.try_send(command) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(player_id = player.0, "player queue full; dropping call");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// `ClientOutbox` port backed by the hub.
pub struct HubOutbox {
    hub: Arc<ConnectionHub>,
}

impl HubOutbox {
    pub fn new(hub: Arc<ConnectionHub>) -> Self {
        Self { hub }
    }
}

impl ClientOutbox for HubOutbox {
    fn send(&mut self, target: Target, command: ClientCommand) {
        match target {
            Target::Everyone => self.hub.broadcast(command),
            Target::Single(player) => {
                self.hub.send_to(player, command);
            }
            Target::Owner(entity) => match self.hub.owner_of(entity) {
                Some(player) => {
                    self.hub.send_to(player, command);
                }
                None => debug!(entity = entity.0, "no owner for entity-targeted call"),
            },
        }
    }
}
