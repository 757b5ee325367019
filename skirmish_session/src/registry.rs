// Player registry: connection ↔ identity ↔ record bookkeeping.
//
// A player's identity is the name they present in `Hello`; the registry maps
// it to a compact, stable `PlayerId` and a `PlayerRecord`. Connections come
// and go underneath: `leave` only flips `connection_alive` and drops the
// connection mapping, so a retained record can be re-attached by a later
// `join` with the same identity. Whether a dead record is purged is the
// session's call (it depends on the phase), via `purge`.
//
// Records live in a `BTreeMap` keyed by id so iteration order, and therefore
// snapshot bytes, are deterministic.

use std::collections::BTreeMap;

use skirmish_protocol::{ConnectionId, PlayerId, PlayerRecord, TeamId};

use crate::error::SessionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    New(PlayerId),
    /// A retained record was re-attached to a new connection.
    Reconnected(PlayerId),
}

impl JoinOutcome {
    pub fn player_id(self) -> PlayerId {
        match self {
            Self::New(id) | Self::Reconnected(id) => id,
        }
    }
}

#[derive(Debug, Default)]
pub struct PlayerRegistry {
    records: BTreeMap<PlayerId, PlayerRecord>,
    identities: BTreeMap<String, PlayerId>,
    connections: BTreeMap<ConnectionId, PlayerId>,
    skill: BTreeMap<PlayerId, f64>,
    next_player_id: u32,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Player id for a known identity, live or retained.
    pub fn resolve(&self, name: &str) -> Option<PlayerId> {
        self.identities.get(name).copied()
    }

    /// Attach `connection` to the identity `name`, creating a record if the
    /// identity is new. Fails if the name is empty or already held by a live
    /// connection.
    pub fn join(
        &mut self,
        connection: ConnectionId,
        name: &str,
        skill_rating: Option<f64>,
    ) -> Result<JoinOutcome, SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::invalid("player name must not be empty"));
        }
        if self.connections.contains_key(&connection) {
            return Err(SessionError::invalid(format!(
                "{connection} already joined"
            )));
        }
        if let Some(rating) = skill_rating
            && !rating.is_finite()
        {
            return Err(SessionError::invalid("skill rating must be finite"));
        }

        if let Some(&player_id) = self.identities.get(name) {
            let record = self
                .records
                .get_mut(&player_id)
                .ok_or_else(|| SessionError::invalid(format!("{player_id} has no record")))?;
            if record.connection_alive {
                return Err(SessionError::invalid(format!(
                    "'{name}' is already connected"
                )));
            }
            record.connection_alive = true;
            self.connections.insert(connection, player_id);
            if let Some(rating) = skill_rating {
                self.skill.insert(player_id, rating);
            }
            return Ok(JoinOutcome::Reconnected(player_id));
        }

        let player_id = PlayerId(self.next_player_id);
        self.next_player_id += 1;
        self.records
            .insert(player_id, PlayerRecord::new(player_id, name.to_owned()));
        self.identities.insert(name.to_owned(), player_id);
        self.connections.insert(connection, player_id);
        if let Some(rating) = skill_rating {
            self.skill.insert(player_id, rating);
        }
        Ok(JoinOutcome::New(player_id))
    }

    /// Detach `connection`; the record stays, marked disconnected.
    pub fn leave(&mut self, connection: ConnectionId) -> Option<PlayerId> {
        let player_id = self.connections.remove(&connection)?;
        if let Some(record) = self.records.get_mut(&player_id) {
            record.connection_alive = false;
        }
        Some(player_id)
    }

    /// Remove a record entirely, along with its identity and any connection.
    pub fn purge(&mut self, player_id: PlayerId) -> Option<PlayerRecord> {
        let record = self.records.remove(&player_id)?;
        self.identities.remove(&record.name);
        self.skill.remove(&player_id);
        self.connections.retain(|_, p| *p != player_id);
        Some(record)
    }

    pub fn player_for(&self, connection: ConnectionId) -> Option<PlayerId> {
        self.connections.get(&connection).copied()
    }

    pub fn connection_of(&self, player_id: PlayerId) -> Option<ConnectionId> {
        self.connections
            .iter()
            .find(|(_, p)| **p == player_id)
            .map(|(c, _)| *c)
    }

    pub fn get(&self, player_id: PlayerId) -> Option<&PlayerRecord> {
        self.records.get(&player_id)
    }

    pub fn get_mut(&mut self, player_id: PlayerId) -> Option<&mut PlayerRecord> {
        self.records.get_mut(&player_id)
    }

    /// All records in id order.
    pub fn records(&self) -> impl Iterator<Item = &PlayerRecord> {
        self.records.values()
    }

    /// Ids of players with a live connection.
    pub fn connected_ids(&self) -> Vec<PlayerId> {
        self.records
            .values()
            .filter(|r| r.connection_alive)
            .map(|r| r.player_id)
            .collect()
    }

    /// Ids of players with a live connection and a team.
    pub fn connected_assigned_ids(&self) -> Vec<PlayerId> {
        self.records
            .values()
            .filter(|r| r.connection_alive && r.team_id.is_some())
            .map(|r| r.player_id)
            .collect()
    }

    pub fn disconnected_ids(&self) -> Vec<PlayerId> {
        self.records
            .values()
            .filter(|r| !r.connection_alive)
            .map(|r| r.player_id)
            .collect()
    }

    /// Records counted against `team`'s capacity, live or retained.
    pub fn team_members(&self, team: TeamId) -> Vec<PlayerId> {
        self.records
            .values()
            .filter(|r| r.team_id == Some(team))
            .map(|r| r.player_id)
            .collect()
    }

    pub fn team_size(&self, team: TeamId) -> usize {
        self.records
            .values()
            .filter(|r| r.team_id == Some(team))
            .count()
    }

    pub fn skill_of(&self, player_id: PlayerId, default_rating: f64) -> f64 {
        self.skill.get(&player_id).copied().unwrap_or(default_rating)
    }

    /// The connected player with the lowest id, who may issue admin commands.
    pub fn host(&self) -> Option<PlayerId> {
        self.records
            .values()
            .find(|r| r.connection_alive)
            .map(|r| r.player_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
