// Directory of connected players, kept in registration order.

use super::errors::RosterError;
use super::state::{EntityRef, PlayerId, PlayerRecord};

#[derive(Debug, Default)]
pub struct PlayerRosterRegistry {
    // Player counts are small; a Vec keeps registration order for free.
    records: Vec<PlayerRecord>,
}

impl PlayerRosterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: PlayerRecord) -> Result<(), RosterError> {
        if self.contains(record.id) {
            return Err(RosterError::AlreadyRegistered(record.id));
        }
        self.records.push(record);
        Ok(())
    }

    /// Removes and returns the record, if the player was still registered.
    pub fn remove(&mut self, id: PlayerId) -> Option<PlayerRecord> {
        let index = self.records.iter().position(|r| r.id == id)?;
        Some(self.records.remove(index))
    }

    /// Lookups tolerate unknown ids; network messages can race disconnects.
    pub fn get(&self, id: PlayerId) -> Option<&PlayerRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.get(id).is_some()
    }

    pub fn entity_of(&self, id: PlayerId) -> Option<EntityRef> {
        self.get(id).and_then(|r| r.entity)
    }

    /// Updates the entity key; returns false if the player is gone.
    pub fn set_entity(&mut self, id: PlayerId, entity: Option<EntityRef>) -> bool {
        match self.records.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                record.entity = entity;
                true
            }
            None => false,
        }
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.records.iter().map(|r| r.id).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
