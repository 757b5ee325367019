// Team assignment and balancing.
//
// `TeamAssignmentService` places joining players, validates explicit team
// changes, and keeps reported parties together. It owns the team table and
// the party bookkeeping; team membership itself lives on the player records
// in `PlayerRegistry`, so capacity is always counted from the records.
//
// Automatic placement, in order:
// 1. A player who already has a team keeps it.
// 2. A party member joins a teammate's team if that team has room.
// 3. Otherwise the candidates are the open teams with the fewest members.
//    With skill balancing the candidate with the lowest mean rating wins
//    (default rating for unrated players); ties go to the lowest team id.
//    Restricting to the smallest teams keeps sizes within one of each other
//    for any join sequence. Ranking by mean rating first and size second
//    would let one team run ahead in size, so the order stays size, rating.
//
// Party block placement picks the team with the most remaining room that
// fits the whole party, else the roomiest team; members that would overflow
// it stay where they are.

use std::collections::{BTreeMap, BTreeSet};

use skirmish_protocol::{PartyId, PlayerId, TeamId};
use tracing::{debug, warn};

use crate::config::{SessionConfig, TeamConfig};
use crate::error::SessionError;
use crate::registry::PlayerRegistry;

#[derive(Clone, Debug, PartialEq)]
pub struct BalancePolicy {
    pub skill_balancing: bool,
    pub keep_parties_together: bool,
    pub default_skill_rating: f64,
}

/// Result of placing a party as a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartyPlacement {
    pub team: TeamId,
    /// Members whose team changed.
    pub moved: Vec<PlayerId>,
    /// Members that did not fit and kept their previous team.
    pub overflow: Vec<PlayerId>,
}

#[derive(Debug)]
pub struct TeamAssignmentService {
    teams: Vec<TeamConfig>,
    policy: BalancePolicy,
    parties: BTreeMap<PartyId, BTreeSet<PlayerId>>,
    party_of: BTreeMap<PlayerId, PartyId>,
}

impl TeamAssignmentService {
    pub fn new(teams: &[TeamConfig], policy: BalancePolicy) -> Self {
        let mut teams = teams.to_vec();
        teams.sort_by_key(|t| t.team_id);
        Self {
            teams,
            policy,
            parties: BTreeMap::new(),
            party_of: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            &config.teams,
            BalancePolicy {
                skill_balancing: config.skill_balancing,
                keep_parties_together: config.keep_parties_together,
                default_skill_rating: config.default_skill_rating,
            },
        )
    }

    pub fn team(&self, team: TeamId) -> Option<&TeamConfig> {
        self.teams.iter().find(|t| t.team_id == team)
    }

    pub fn teams(&self) -> &[TeamConfig] {
        &self.teams
    }

    /// Seats left on `team`, or 0 for an unknown team.
    pub fn remaining(&self, team: TeamId, registry: &PlayerRegistry) -> usize {
        self.team(team)
            .map(|t| t.max_players.saturating_sub(registry.team_size(team)))
            .unwrap_or(0)
    }

    pub fn team_sizes(&self, registry: &PlayerRegistry) -> BTreeMap<TeamId, usize> {
        self.teams
            .iter()
            .map(|t| (t.team_id, registry.team_size(t.team_id)))
            .collect()
    }

    /// Place `player` automatically. Idempotent for already-placed players.
    pub fn assign(
        &self,
        player: PlayerId,
        registry: &mut PlayerRegistry,
    ) -> Result<TeamId, SessionError> {
        let record = registry
            .get(player)
            .ok_or_else(|| SessionError::invalid(format!("unknown {player}")))?;
        if let Some(team) = record.team_id {
            return Ok(team);
        }
        let team = self.pick_team(player, registry)?;
        if let Some(record) = registry.get_mut(player) {
            record.team_id = Some(team);
        }
        debug!(%player, %team, "assigned team");
        Ok(team)
    }

    fn pick_team(
        &self,
        player: PlayerId,
        registry: &PlayerRegistry,
    ) -> Result<TeamId, SessionError> {
        if self.policy.keep_parties_together
            && let Some(team) = self.teammate_team(player, registry)
        {
            return Ok(team);
        }

        let open: Vec<(TeamId, usize)> = self
            .teams
            .iter()
            .map(|t| (t.team_id, registry.team_size(t.team_id)))
            .filter(|(id, size)| self.team(*id).is_some_and(|t| *size < t.max_players))
            .collect();
        let Some(min_size) = open.iter().map(|(_, size)| *size).min() else {
            return Err(SessionError::CapacityExceeded(
                "every team is full".into(),
            ));
        };
        let smallest = open.into_iter().filter(|(_, size)| *size == min_size);

        let chosen = if self.policy.skill_balancing {
            smallest
                .map(|(id, size)| (id, size, self.mean_skill(id, registry)))
                .min_by(|a, b| {
                    a.2.total_cmp(&b.2)
                        .then(a.1.cmp(&b.1))
                        .then(a.0.cmp(&b.0))
                })
                .map(|(id, _, _)| id)
        } else {
            smallest.map(|(id, _)| id).next()
        };
        chosen.ok_or_else(|| SessionError::CapacityExceeded("every team is full".into()))
    }

    /// Team of the first placed party member whose team still has room.
    fn teammate_team(&self, player: PlayerId, registry: &PlayerRegistry) -> Option<TeamId> {
        let party = self.party_of.get(&player)?;
        self.parties
            .get(party)?
            .iter()
            .filter(|m| **m != player)
            .filter_map(|m| registry.get(*m).and_then(|r| r.team_id))
            .find(|team| self.remaining(*team, registry) > 0)
    }

    /// Mean skill of `team`'s current members; 0 for an empty team.
    fn mean_skill(&self, team: TeamId, registry: &PlayerRegistry) -> f64 {
        let members = registry.team_members(team);
        if members.is_empty() {
            return 0.0;
        }
        let total: f64 = members
            .iter()
            .map(|m| registry.skill_of(*m, self.policy.default_skill_rating))
            .sum();
        total / members.len() as f64
    }

    /// Apply an explicit team change. Returns false if `player` was already
    /// on `team` (nothing changed).
    pub fn request_change(
        &self,
        player: PlayerId,
        team: TeamId,
        registry: &mut PlayerRegistry,
    ) -> Result<bool, SessionError> {
        let config = self
            .team(team)
            .ok_or_else(|| SessionError::invalid(format!("no such team {team}")))?;
        let current = registry
            .get(player)
            .ok_or_else(|| SessionError::invalid(format!("unknown {player}")))?
            .team_id;
        if current == Some(team) {
            return Ok(false);
        }
        if registry.team_size(team) >= config.max_players {
            return Err(SessionError::team_full(team, config.max_players));
        }
        if let Some(record) = registry.get_mut(player) {
            record.team_id = Some(team);
        }
        debug!(%player, from = ?current, to = %team, "team change applied");
        Ok(true)
    }

    /// Record a party. Members must exist; a player belongs to at most one
    /// party, so members are removed from any earlier one.
    pub fn register_party(
        &mut self,
        party: PartyId,
        members: &[PlayerId],
        registry: &PlayerRegistry,
    ) -> Result<(), SessionError> {
        let members: BTreeSet<PlayerId> = members.iter().copied().collect();
        if members.is_empty() {
            return Err(SessionError::invalid(format!("{party} has no members")));
        }
        if let Some(missing) = members.iter().find(|m| registry.get(**m).is_none()) {
            return Err(SessionError::invalid(format!(
                "{party} names unknown {missing}"
            )));
        }
        if let Some(old) = self.parties.remove(&party) {
            for m in old {
                self.party_of.remove(&m);
            }
        }
        for m in &members {
            self.forget_player(*m);
            self.party_of.insert(*m, party);
        }
        self.parties.insert(party, members);
        Ok(())
    }

    pub fn party_of(&self, player: PlayerId) -> Option<PartyId> {
        self.party_of.get(&player).copied()
    }

    pub fn party_members(&self, party: PartyId) -> Vec<PlayerId> {
        self.parties
            .get(&party)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Move a party onto one team as far as capacity allows.
    pub fn place_party(
        &self,
        party: PartyId,
        registry: &mut PlayerRegistry,
    ) -> Result<PartyPlacement, SessionError> {
        let members = self
            .parties
            .get(&party)
            .ok_or_else(|| SessionError::invalid(format!("unknown {party}")))?;
        let size = members.len();

        // Room each team would have for this party, counting seats its
        // members already occupy there.
        let room: Vec<(TeamId, usize)> = self
            .teams
            .iter()
            .map(|t| {
                let already = members
                    .iter()
                    .filter(|m| registry.get(**m).and_then(|r| r.team_id) == Some(t.team_id))
                    .count();
                (t.team_id, self.remaining(t.team_id, registry) + already)
            })
            .collect();
        let team = roomiest(room.iter().filter(|(_, r)| *r >= size))
            .or_else(|| roomiest(room.iter()))
            .ok_or_else(|| SessionError::CapacityExceeded("no teams configured".into()))?;

        let mut placement = PartyPlacement {
            team,
            moved: Vec::new(),
            overflow: Vec::new(),
        };
        for member in members.iter().copied() {
            match self.request_change(member, team, registry) {
                Ok(true) => placement.moved.push(member),
                Ok(false) => {}
                Err(_) => placement.overflow.push(member),
            }
        }
        for member in &placement.overflow {
            if let Err(err) = self.assign(*member, registry) {
                warn!(player = %member, %err, "party overflow member left unplaced");
            }
        }
        debug!(
            %party,
            %team,
            moved = placement.moved.len(),
            overflow = placement.overflow.len(),
            "party placed"
        );
        Ok(placement)
    }

    /// Drop a player from party bookkeeping (on purge or re-registration).
    pub fn forget_player(&mut self, player: PlayerId) {
        if let Some(party) = self.party_of.remove(&player)
            && let Some(members) = self.parties.get_mut(&party)
        {
            members.remove(&player);
            if members.is_empty() {
                self.parties.remove(&party);
            }
        }
    }
}

/// Team with the most room; ties go to the lowest id.
fn roomiest<'a>(candidates: impl Iterator<Item = &'a (TeamId, usize)>) -> Option<TeamId> {
    candidates
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(id, _)| *id)
}
