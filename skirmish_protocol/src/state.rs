// Replicated session state and the typed delta protocol.
//
// Everything an observer needs to keep a passive replica of the authoritative
// session: the per-player `PlayerRecord`, the `SessionPhase`, the draft view
// (only while the draft runs), and `StateDelta`, the tagged union of partial
// updates. A `SessionSnapshot` is the full-state form used for resync; applying
// every delta since a snapshot to that snapshot must reproduce the authority's
// next snapshot. `ReplicaState` is that replica, kept by clients.
//
// Maps are `BTreeMap` and player lists are sorted by id so that serializing
// the same state twice yields identical bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{DeltaSeq, HeroId, PlayerId, TeamId};

/// Top-level phase of a match session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    Lobby,
    Draft,
    Playing,
    Result,
}

/// Authoritative per-player record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub player_id: PlayerId,
    pub name: String,
    pub connection_alive: bool,
    pub team_id: Option<TeamId>,
    pub ready: bool,
    pub selected_hero: Option<HeroId>,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
}

impl PlayerRecord {
    pub fn new(player_id: PlayerId, name: String) -> Self {
        Self {
            player_id,
            name,
            connection_alive: true,
            team_id: None,
            ready: false,
            selected_hero: None,
            kills: 0,
            deaths: 0,
            assists: 0,
        }
    }

    /// The roster-delta projection of this record.
    pub fn roster_entry(&self) -> RosterEntry {
        RosterEntry {
            player_id: self.player_id,
            name: self.name.clone(),
            connection_alive: self.connection_alive,
            team_id: self.team_id,
            ready: self.ready,
            selected_hero: self.selected_hero.clone(),
        }
    }
}

/// Roster delta payload: the mutable lobby/draft fields of one player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub player_id: PlayerId,
    pub name: String,
    pub connection_alive: bool,
    pub team_id: Option<TeamId>,
    pub ready: bool,
    pub selected_hero: Option<HeroId>,
}

/// Replicated view of the draft negotiation. Present only during `Draft`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DraftView {
    pub selections: BTreeMap<PlayerId, HeroId>,
    pub readiness: BTreeMap<PlayerId, bool>,
    pub remaining_secs: f64,
    /// Seconds left on the early-completion countdown, if one is running.
    pub completion_countdown: Option<f64>,
    pub phase_active: bool,
}

/// Full authoritative state, sent in response to a resync request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Sequence number of the last delta folded into this snapshot.
    pub seq: DeltaSeq,
    pub phase: SessionPhase,
    pub phase_timer: f64,
    /// Sorted by `player_id`.
    pub players: Vec<PlayerRecord>,
    pub draft: Option<DraftView>,
    /// Last committed draft result (empty before the first draft completes).
    pub hero_assignment: BTreeMap<PlayerId, HeroId>,
    pub winning_team: Option<TeamId>,
}

/// A single authoritative state change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StateDelta {
    /// A player's roster fields changed (or the player appeared).
    Roster(RosterEntry),
    /// A player's record was purged.
    PlayerRemoved { player_id: PlayerId },
    /// The session entered a new phase.
    PhaseChanged {
        phase: SessionPhase,
        phase_timer: f64,
    },
    /// Everyone is ready; the draft completes in `seconds`.
    CountdownStarted { seconds: f64 },
    /// A player un-readied before the countdown elapsed.
    CountdownCancelled,
    /// The draft finished with this immutable hero assignment.
    DraftOutcome {
        final_selections: BTreeMap<PlayerId, HeroId>,
    },
    /// The match ended.
    MatchResult { winning_team: TeamId },
    /// Combat statistics for one player.
    Stats {
        player_id: PlayerId,
        kills: u32,
        deaths: u32,
        assists: u32,
    },
}

/// Outcome of applying a delta to a replica.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Already seen (seq at or below the replica's).
    Stale,
    /// One or more deltas were skipped; the replica needs a full resync.
    Gap,
}

/// Client-side passive copy of the authoritative state.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplicaState {
    pub seq: DeltaSeq,
    pub phase: SessionPhase,
    pub phase_timer: f64,
    pub players: BTreeMap<PlayerId, PlayerRecord>,
    pub completion_countdown: Option<f64>,
    pub hero_assignment: BTreeMap<PlayerId, HeroId>,
    pub winning_team: Option<TeamId>,
    /// False until the first snapshot arrives.
    pub synced: bool,
}

impl Default for ReplicaState {
    fn default() -> Self {
        Self {
            seq: DeltaSeq(0),
            phase: SessionPhase::Lobby,
            phase_timer: 0.0,
            players: BTreeMap::new(),
            completion_countdown: None,
            hero_assignment: BTreeMap::new(),
            winning_team: None,
            synced: false,
        }
    }
}

impl ReplicaState {
    /// Replace the replica wholesale with a snapshot.
    pub fn load_snapshot(&mut self, snapshot: SessionSnapshot) {
        self.seq = snapshot.seq;
        self.phase = snapshot.phase;
        self.phase_timer = snapshot.phase_timer;
        self.players = snapshot
            .players
            .into_iter()
            .map(|r| (r.player_id, r))
            .collect();
        self.completion_countdown = snapshot.draft.and_then(|d| d.completion_countdown);
        self.hero_assignment = snapshot.hero_assignment;
        self.winning_team = snapshot.winning_team;
        self.synced = true;
    }

    /// Apply one sequenced delta. Deltas before the first snapshot are
    /// ignored as stale; the snapshot supersedes them.
    pub fn apply(&mut self, seq: DeltaSeq, delta: StateDelta) -> ApplyOutcome {
        if !self.synced || seq <= self.seq {
            return ApplyOutcome::Stale;
        }
        if seq != self.seq.next() {
            return ApplyOutcome::Gap;
        }
        self.seq = seq;
        match delta {
            StateDelta::Roster(entry) => {
                let record = self
                    .players
                    .entry(entry.player_id)
                    .or_insert_with(|| PlayerRecord::new(entry.player_id, entry.name.clone()));
                record.name = entry.name;
                record.connection_alive = entry.connection_alive;
                record.team_id = entry.team_id;
                record.ready = entry.ready;
                record.selected_hero = entry.selected_hero;
            }
            StateDelta::PlayerRemoved { player_id } => {
                self.players.remove(&player_id);
            }
            StateDelta::PhaseChanged { phase, phase_timer } => {
                self.phase = phase;
                self.phase_timer = phase_timer;
                self.completion_countdown = None;
                if phase == SessionPhase::Lobby {
                    self.winning_team = None;
                }
            }
            StateDelta::CountdownStarted { seconds } => {
                self.completion_countdown = Some(seconds);
            }
            StateDelta::CountdownCancelled => {
                self.completion_countdown = None;
            }
            StateDelta::DraftOutcome { final_selections } => {
                self.hero_assignment = final_selections;
            }
            StateDelta::MatchResult { winning_team } => {
                self.winning_team = Some(winning_team);
            }
            StateDelta::Stats {
                player_id,
                kills,
                deaths,
                assists,
            } => {
                if let Some(record) = self.players.get_mut(&player_id) {
                    record.kills = kills;
                    record.deaths = deaths;
                    record.assists = assists;
                }
            }
        }
        ApplyOutcome::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with(players: Vec<PlayerRecord>) -> SessionSnapshot {
        SessionSnapshot {
            seq: DeltaSeq(4),
            phase: SessionPhase::Lobby,
            phase_timer: 0.0,
            players,
            draft: None,
            hero_assignment: BTreeMap::new(),
            winning_team: None,
        }
    }

    #[test]
    fn replica_ignores_deltas_before_snapshot() {
        let mut replica = ReplicaState::default();
        let outcome = replica.apply(
            DeltaSeq(1),
            StateDelta::PlayerRemoved {
                player_id: PlayerId(0),
            },
        );
        assert_eq!(outcome, ApplyOutcome::Stale);
        assert!(!replica.synced);
    }

    #[test]
    fn replica_applies_consecutive_deltas() {
        let mut replica = ReplicaState::default();
        replica.load_snapshot(snapshot_with(vec![PlayerRecord::new(
            PlayerId(0),
            "Ari".into(),
        )]));

        let mut entry = replica.players[&PlayerId(0)].roster_entry();
        entry.team_id = Some(TeamId(2));
        entry.ready = true;
        assert_eq!(
            replica.apply(DeltaSeq(5), StateDelta::Roster(entry)),
            ApplyOutcome::Applied
        );
        let record = &replica.players[&PlayerId(0)];
        assert_eq!(record.team_id, Some(TeamId(2)));
        assert!(record.ready);
        assert_eq!(replica.seq, DeltaSeq(5));
    }

    #[test]
    fn replica_detects_gap() {
        let mut replica = ReplicaState::default();
        replica.load_snapshot(snapshot_with(Vec::new()));
        let outcome = replica.apply(DeltaSeq(7), StateDelta::CountdownCancelled);
        assert_eq!(outcome, ApplyOutcome::Gap);
        assert_eq!(replica.seq, DeltaSeq(4), "gap must not advance the replica");
    }

    #[test]
    fn phase_change_clears_countdown() {
        let mut replica = ReplicaState::default();
        replica.load_snapshot(snapshot_with(Vec::new()));
        replica.apply(DeltaSeq(5), StateDelta::CountdownStarted { seconds: 3.0 });
        assert_eq!(replica.completion_countdown, Some(3.0));
        replica.apply(
            DeltaSeq(6),
            StateDelta::PhaseChanged {
                phase: SessionPhase::Playing,
                phase_timer: 0.0,
            },
        );
        assert_eq!(replica.completion_countdown, None);
        assert_eq!(replica.phase, SessionPhase::Playing);
    }

    #[test]
    fn snapshot_with_player_keyed_maps_serializes() {
        let mut snapshot = snapshot_with(vec![PlayerRecord::new(PlayerId(3), "Bo".into())]);
        snapshot
            .hero_assignment
            .insert(PlayerId(3), HeroId::from("hero_x"));
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: SessionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
