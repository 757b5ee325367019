// The authoritative session state machine.
//
// `Session` owns every piece of authoritative state (registry, team service,
// draft, phase, timers) and is driven from a single-threaded loop: the
// transport queues `SessionInput`s with `enqueue`, and `tick` applies them in
// arrival order, re-evaluates the phase conditions, then advances the timers
// by the elapsed wall-clock time. Nothing here blocks or spawns threads.
//
// Phase flow (see `phase.rs` for the legality table):
// - Lobby → Draft when at least `min_players` connected, team-assigned
//   players are all ready (or the host forces it).
// - Draft → Playing when everyone stays ready through the completion
//   countdown, or when the draft clock runs out (stragglers get random
//   heroes). Draft → Lobby if the connected count falls below the quorum.
// - Playing → Result on the combat subsystem's winner signal.
// - Result → Lobby after `result_display_secs`; readiness, picks and stats
//   are cleared and disconnected records purged.
//
// Replication: every mutation of replicated state is paired with exactly one
// `StateDelta` through the `Replicator`. Snapshots are built on demand from
// the same state, so a resync with no mutation in between is byte-identical.
//
// Validation failures never escape: a bad request becomes a targeted
// `RequestRejected` notice, a bad handshake a `Rejected` notice plus detach.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use skirmish_prng::SessionRng;
use skirmish_protocol::{
    AdminCommand, ConnectionId, HeroId, PROTOCOL_VERSION, PartyId, PlayerId, PlayerRequest,
    RequestKind, ServerMessage, SessionPhase, SessionSnapshot, StateDelta, TeamId,
};
use tracing::{debug, info, warn};

use crate::catalog::HeroCatalog;
use crate::config::{ConfigError, Pose, SessionConfig};
use crate::draft::{
    CountdownChange, DisconnectDisposition, DraftPolicy, DraftTick, HeroDraftCoordinator,
};
use crate::error::SessionError;
use crate::phase::{self, TransitionCause};
use crate::registry::{JoinOutcome, PlayerRegistry};
use crate::replication::{ReplicationChannel, Replicator};
use crate::scene::SceneLoader;
use crate::teams::TeamAssignmentService;

/// An asynchronous input, applied at the start of the next tick.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionInput {
    Connect {
        connection: ConnectionId,
        protocol_version: u32,
        player_name: String,
        skill_rating: Option<f64>,
    },
    Disconnect {
        connection: ConnectionId,
    },
    Request {
        connection: ConnectionId,
        request: PlayerRequest,
    },
    /// Win condition from the combat/objective subsystem.
    Winner { team_id: TeamId },
    /// Combat statistics for one player.
    Stats {
        player_id: PlayerId,
        kills: u32,
        deaths: u32,
        assists: u32,
    },
}

pub struct Session<C> {
    config: SessionConfig,
    phase: SessionPhase,
    phase_timer: f64,
    registry: PlayerRegistry,
    teams: TeamAssignmentService,
    draft: Option<HeroDraftCoordinator>,
    catalog: Option<Box<dyn HeroCatalog>>,
    /// Last pool the catalog returned, used while it is unreachable.
    last_pool: Vec<HeroId>,
    scene: Option<Box<dyn SceneLoader>>,
    replicator: Replicator<C>,
    rng: SessionRng,
    hero_assignment: BTreeMap<PlayerId, HeroId>,
    winning_team: Option<TeamId>,
    spawns: BTreeMap<PlayerId, Pose>,
    inputs: VecDeque<SessionInput>,
}

impl<C: ReplicationChannel> Session<C> {
    pub fn new(config: SessionConfig, channel: C) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = match config.rng_seed {
            Some(seed) => SessionRng::new(seed),
            None => SessionRng::from_entropy(),
        };
        Ok(Self {
            teams: TeamAssignmentService::from_config(&config),
            config,
            phase: SessionPhase::Lobby,
            phase_timer: 0.0,
            registry: PlayerRegistry::new(),
            draft: None,
            catalog: None,
            last_pool: Vec::new(),
            scene: None,
            replicator: Replicator::new(channel),
            rng,
            hero_assignment: BTreeMap::new(),
            winning_team: None,
            spawns: BTreeMap::new(),
            inputs: VecDeque::new(),
        })
    }

    pub fn with_catalog(mut self, catalog: impl HeroCatalog + 'static) -> Self {
        self.catalog = Some(Box::new(catalog));
        self
    }

    pub fn with_scene_loader(mut self, loader: impl SceneLoader + 'static) -> Self {
        self.scene = Some(Box::new(loader));
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn phase_timer(&self) -> f64 {
        self.phase_timer
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    pub fn teams(&self) -> &TeamAssignmentService {
        &self.teams
    }

    pub fn draft(&self) -> Option<&HeroDraftCoordinator> {
        self.draft.as_ref()
    }

    /// The committed result of the most recent completed draft.
    pub fn hero_assignment(&self) -> &BTreeMap<PlayerId, HeroId> {
        &self.hero_assignment
    }

    pub fn winning_team(&self) -> Option<TeamId> {
        self.winning_team
    }

    /// Spawn pose per player, computed on Draft → Playing.
    pub fn spawn_assignments(&self) -> &BTreeMap<PlayerId, Pose> {
        &self.spawns
    }

    pub fn channel(&self) -> &C {
        self.replicator.channel()
    }

    pub fn channel_mut(&mut self) -> &mut C {
        self.replicator.channel_mut()
    }

    pub fn pending_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn enqueue(&mut self, input: SessionInput) {
        self.inputs.push_back(input);
    }

    /// One authoritative step: drain queued inputs, re-check phase
    /// conditions, then advance timers by `elapsed`.
    pub fn tick(&mut self, elapsed: Duration) {
        while let Some(input) = self.inputs.pop_front() {
            self.handle_input(input);
        }
        self.evaluate();
        self.advance_timers(elapsed.as_secs_f64());
    }

    /// Apply one input immediately. Failures are reported to the requester
    /// and logged; they never propagate.
    pub fn handle_input(&mut self, input: SessionInput) {
        match input {
            SessionInput::Connect {
                connection,
                protocol_version,
                player_name,
                skill_rating,
            } => {
                let _ =
                    self.handle_connect(connection, protocol_version, &player_name, skill_rating);
            }
            SessionInput::Disconnect { connection } => self.handle_disconnect(connection),
            SessionInput::Request {
                connection,
                request,
            } => {
                let _ = self.handle_request(connection, request);
            }
            SessionInput::Winner { team_id } => {
                if let Err(err) = self.declare_winner(team_id) {
                    warn!(team = %team_id, %err, "winner signal ignored");
                }
            }
            SessionInput::Stats {
                player_id,
                kills,
                deaths,
                assists,
            } => {
                if let Err(err) = self.record_stats(player_id, kills, deaths, assists) {
                    warn!(player = %player_id, %err, "stats ignored");
                }
            }
        }
    }

    // --- connection lifecycle ---

    /// Handshake. On success the connection gets `Welcome` and everyone a
    /// roster delta; on failure it gets `Rejected` and is detached.
    pub fn handle_connect(
        &mut self,
        connection: ConnectionId,
        protocol_version: u32,
        player_name: &str,
        skill_rating: Option<f64>,
    ) -> Result<JoinOutcome, SessionError> {
        match self.join(connection, protocol_version, player_name, skill_rating) {
            Ok(outcome) => {
                let player_id = outcome.player_id();
                let reconnected = matches!(outcome, JoinOutcome::Reconnected(_));
                info!(
                    %connection,
                    player = %player_id,
                    name = player_name.trim(),
                    reconnected,
                    "player joined"
                );
                self.replicator.notify(
                    connection,
                    &ServerMessage::Welcome {
                        player_id,
                        session_name: self.config.session_name.clone(),
                        reconnected,
                    },
                );
                self.broadcast_roster(player_id);
                self.evaluate();
                Ok(outcome)
            }
            Err(err) => {
                warn!(%connection, %err, "join rejected");
                self.replicator.notify(
                    connection,
                    &ServerMessage::Rejected {
                        reason: err.reason(),
                        detail: err.to_string(),
                    },
                );
                self.replicator.detach(connection);
                Err(err)
            }
        }
    }

    fn join(
        &mut self,
        connection: ConnectionId,
        protocol_version: u32,
        player_name: &str,
        skill_rating: Option<f64>,
    ) -> Result<JoinOutcome, SessionError> {
        if protocol_version != PROTOCOL_VERSION {
            return Err(SessionError::invalid(format!(
                "protocol version {protocol_version}, server speaks {PROTOCOL_VERSION}"
            )));
        }
        if self.phase == SessionPhase::Playing
            && self.registry.resolve(player_name.trim()).is_none()
        {
            return Err(SessionError::NotPermittedInPhase {
                action: "joining as a new player",
                phase: self.phase,
            });
        }
        let outcome = self.registry.join(connection, player_name, skill_rating)?;
        let player = outcome.player_id();
        if let Err(err) = self.teams.assign(player, &mut self.registry) {
            match outcome {
                JoinOutcome::New(_) => {
                    self.registry.purge(player);
                }
                JoinOutcome::Reconnected(_) => {
                    self.registry.leave(connection);
                }
            }
            return Err(err);
        }
        Ok(outcome)
    }

    /// Connection lost or closed. The record is retained or purged
    /// according to the current phase.
    pub fn handle_disconnect(&mut self, connection: ConnectionId) {
        self.replicator.detach(connection);
        let Some(player) = self.registry.leave(connection) else {
            debug!(%connection, "disconnect from connection with no player");
            return;
        };
        let retained = match self.phase {
            SessionPhase::Lobby | SessionPhase::Result => false,
            SessionPhase::Playing => true,
            SessionPhase::Draft => matches!(
                self.draft.as_mut().map(|d| d.on_disconnect(player)),
                Some(DisconnectDisposition::Retained)
            ),
        };
        info!(%connection, %player, phase = ?self.phase, retained, "player left");
        if retained {
            self.broadcast_roster(player);
        } else {
            self.remove_player(player);
        }
        self.evaluate();
    }

    // --- requests ---

    /// Validate and apply a request. Rejections are sent to `connection`.
    pub fn handle_request(
        &mut self,
        connection: ConnectionId,
        request: PlayerRequest,
    ) -> Result<(), SessionError> {
        let kind = request.kind();
        let result = match self.registry.player_for(connection) {
            Some(player) => self.apply_request(connection, player, request),
            None => Err(SessionError::invalid(format!("{connection} has not joined"))),
        };
        match result {
            Ok(()) => {
                self.evaluate();
                Ok(())
            }
            Err(err) => {
                self.reject(connection, kind, &err);
                Err(err)
            }
        }
    }

    fn apply_request(
        &mut self,
        connection: ConnectionId,
        player: PlayerId,
        request: PlayerRequest,
    ) -> Result<(), SessionError> {
        debug!(%player, ?request, "request");
        match request {
            PlayerRequest::SelectHero { hero_id } => self.select_hero(player, hero_id),
            PlayerRequest::SetReady { is_ready } => self.set_ready(player, is_ready),
            PlayerRequest::RequestTeamChange { team_id } => self.change_team(player, team_id),
            PlayerRequest::ReportParty {
                party_id,
                member_ids,
            } => self.report_party(player, party_id, &member_ids),
            PlayerRequest::RequestFullResync => {
                self.on_request_resync(connection);
                Ok(())
            }
            PlayerRequest::Admin { command } => self.admin(player, command),
        }
    }

    fn reject(&mut self, connection: ConnectionId, request: RequestKind, err: &SessionError) {
        warn!(%connection, ?request, %err, "request rejected");
        self.replicator.notify(
            connection,
            &ServerMessage::RequestRejected {
                request,
                reason: err.reason(),
                detail: err.to_string(),
            },
        );
    }

    fn select_hero(&mut self, player: PlayerId, hero: HeroId) -> Result<(), SessionError> {
        let Some(draft) = self.draft.as_mut() else {
            return Err(SessionError::NotPermittedInPhase {
                action: "hero selection",
                phase: self.phase,
            });
        };
        let outcome = draft.select_hero(player, hero, self.catalog.as_deref(), &mut self.rng)?;
        let Some(record) = self.registry.get_mut(player) else {
            return Err(SessionError::invalid(format!("unknown {player}")));
        };
        if record.selected_hero.as_ref() == Some(&outcome.hero) {
            return Ok(());
        }
        record.selected_hero = Some(outcome.hero);
        self.broadcast_roster(player);
        Ok(())
    }

    fn set_ready(&mut self, player: PlayerId, ready: bool) -> Result<(), SessionError> {
        match self.phase {
            SessionPhase::Lobby => {
                let record = self
                    .registry
                    .get_mut(player)
                    .ok_or_else(|| SessionError::invalid(format!("unknown {player}")))?;
                if record.ready == ready {
                    return Ok(());
                }
                record.ready = ready;
            }
            SessionPhase::Draft => {
                let Some(draft) = self.draft.as_mut() else {
                    return Err(SessionError::invalid("no draft in progress"));
                };
                if !draft.set_ready(player, ready)? {
                    return Ok(());
                }
                if let Some(record) = self.registry.get_mut(player) {
                    record.ready = ready;
                }
            }
            phase => {
                return Err(SessionError::NotPermittedInPhase {
                    action: "changing readiness",
                    phase,
                });
            }
        }
        self.broadcast_roster(player);
        Ok(())
    }

    fn change_team(&mut self, player: PlayerId, team: TeamId) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Lobby {
            return Err(SessionError::NotPermittedInPhase {
                action: "changing teams",
                phase: self.phase,
            });
        }
        if self.teams.request_change(player, team, &mut self.registry)? {
            self.broadcast_roster(player);
        }
        Ok(())
    }

    fn report_party(
        &mut self,
        reporter: PlayerId,
        party: PartyId,
        members: &[PlayerId],
    ) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Lobby {
            return Err(SessionError::NotPermittedInPhase {
                action: "reporting a party",
                phase: self.phase,
            });
        }
        if !members.contains(&reporter) {
            return Err(SessionError::invalid(format!(
                "{reporter} is not a member of {party}"
            )));
        }
        self.teams.register_party(party, members, &self.registry)?;
        if !self.config.keep_parties_together {
            return Ok(());
        }
        let placement = self.teams.place_party(party, &mut self.registry)?;
        for player in placement.moved {
            self.broadcast_roster(player);
        }
        Ok(())
    }

    /// Send the full authoritative state to one observer.
    pub fn on_request_resync(&mut self, connection: ConnectionId) {
        let snapshot = self.snapshot();
        self.replicator.broadcast_full(connection, snapshot);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            seq: self.replicator.seq(),
            phase: self.phase,
            phase_timer: self.phase_timer,
            players: self.registry.records().cloned().collect(),
            draft: self.draft.as_ref().map(HeroDraftCoordinator::view),
            hero_assignment: self.hero_assignment.clone(),
            winning_team: self.winning_team,
        }
    }

    // --- collaborator events ---

    /// Win condition: Playing → Result.
    pub fn declare_winner(&mut self, team: TeamId) -> Result<(), SessionError> {
        phase::check_transition(self.phase, SessionPhase::Result)?;
        if self.teams.team(team).is_none() {
            return Err(SessionError::invalid(format!("no such team {team}")));
        }
        self.winning_team = Some(team);
        self.replicator
            .broadcast_delta(StateDelta::MatchResult { winning_team: team });
        self.set_phase(
            SessionPhase::Result,
            self.config.result_display_secs,
            TransitionCause::Winner,
        );
        Ok(())
    }

    pub fn record_stats(
        &mut self,
        player: PlayerId,
        kills: u32,
        deaths: u32,
        assists: u32,
    ) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Playing {
            return Err(SessionError::NotPermittedInPhase {
                action: "recording match statistics",
                phase: self.phase,
            });
        }
        let record = self
            .registry
            .get_mut(player)
            .ok_or_else(|| SessionError::invalid(format!("unknown {player}")))?;
        record.kills = kills;
        record.deaths = deaths;
        record.assists = assists;
        self.replicator.broadcast_delta(StateDelta::Stats {
            player_id: player,
            kills,
            deaths,
            assists,
        });
        Ok(())
    }

    // --- admin ---

    fn admin(&mut self, sender: PlayerId, command: AdminCommand) -> Result<(), SessionError> {
        if self.registry.host() != Some(sender) {
            return Err(SessionError::invalid(format!(
                "{sender} is not the session host"
            )));
        }
        info!(player = %sender, ?command, "admin command");
        match command {
            AdminCommand::ForceDraft => {
                phase::check_transition(self.phase, SessionPhase::Draft)?;
                let connected = self.registry.connected_assigned_ids().len();
                if connected < self.config.min_players {
                    return Err(SessionError::InsufficientPlayers {
                        connected,
                        required: self.config.min_players,
                    });
                }
                self.enter_draft(TransitionCause::Forced)
            }
            AdminCommand::ExpireDraftTimer => {
                phase::check_transition(self.phase, SessionPhase::Playing)?;
                if let Some(draft) = self.draft.as_mut() {
                    draft.expire();
                }
                self.phase_timer = 0.0;
                self.complete_draft(TransitionCause::DraftTimeout)
            }
            AdminCommand::DeclareWinner { team_id } => self.declare_winner(team_id),
            AdminCommand::Kick { player_id } => self.kick(sender, player_id),
            AdminCommand::AbortToLobby => match self.phase {
                SessionPhase::Draft => self.abort_draft(TransitionCause::Forced),
                SessionPhase::Result => self.return_to_lobby(TransitionCause::Forced),
                phase => Err(SessionError::NotPermittedInPhase {
                    action: "aborting to the lobby",
                    phase,
                }),
            },
        }
    }

    fn kick(&mut self, sender: PlayerId, target: PlayerId) -> Result<(), SessionError> {
        if sender == target {
            return Err(SessionError::invalid("the host cannot kick themselves"));
        }
        if self.registry.get(target).is_none() {
            return Err(SessionError::invalid(format!("unknown {target}")));
        }
        if let Some(connection) = self.registry.connection_of(target) {
            self.registry.leave(connection);
            self.replicator.detach(connection);
        }
        info!(player = %target, "player kicked");
        self.remove_player(target);
        Ok(())
    }

    // --- phase machinery ---

    /// Check the transition conditions of the current phase.
    fn evaluate(&mut self) {
        match self.phase {
            SessionPhase::Lobby => {
                let eligible = self.registry.connected_assigned_ids();
                let all_ready = eligible.len() >= self.config.min_players
                    && eligible
                        .iter()
                        .all(|p| self.registry.get(*p).is_some_and(|r| r.ready));
                if all_ready && let Err(err) = self.enter_draft(TransitionCause::AllReady) {
                    warn!(%err, "could not start draft");
                }
            }
            SessionPhase::Draft => {
                let connected = self.registry.connected_ids().len();
                if connected < self.config.min_players {
                    let err = SessionError::InsufficientPlayers {
                        connected,
                        required: self.config.min_players,
                    };
                    warn!(%err, "draft lost its quorum");
                    if let Err(err) = self.abort_draft(TransitionCause::QuorumLost) {
                        warn!(%err, "could not abort draft");
                    }
                    return;
                }
                let eligible = self.registry.connected_assigned_ids();
                match self
                    .draft
                    .as_mut()
                    .and_then(|d| d.evaluate_countdown(&eligible))
                {
                    Some(CountdownChange::Started(seconds)) => {
                        info!(seconds, "all players ready; completion countdown started");
                        self.replicator
                            .broadcast_delta(StateDelta::CountdownStarted { seconds });
                    }
                    Some(CountdownChange::Cancelled) => {
                        info!("completion countdown cancelled");
                        self.replicator.broadcast_delta(StateDelta::CountdownCancelled);
                    }
                    None => {}
                }
            }
            SessionPhase::Playing | SessionPhase::Result => {}
        }
    }

    fn advance_timers(&mut self, dt: f64) {
        match self.phase {
            SessionPhase::Draft => {
                let Some(draft) = self.draft.as_mut() else {
                    return;
                };
                let outcome = draft.tick(dt);
                self.phase_timer = draft.remaining();
                let cause = match outcome {
                    DraftTick::Running => return,
                    DraftTick::CountdownElapsed => TransitionCause::CountdownElapsed,
                    DraftTick::TimedOut => TransitionCause::DraftTimeout,
                };
                if let Err(err) = self.complete_draft(cause) {
                    warn!(%err, "could not complete draft");
                }
            }
            SessionPhase::Result => {
                self.phase_timer = (self.phase_timer - dt).max(0.0);
                if self.phase_timer <= 0.0
                    && let Err(err) = self.return_to_lobby(TransitionCause::ResultElapsed)
                {
                    warn!(%err, "could not return to lobby");
                }
            }
            SessionPhase::Lobby | SessionPhase::Playing => {}
        }
    }

    /// Record the new phase and announce it. Callers check legality first.
    fn set_phase(&mut self, to: SessionPhase, timer: f64, cause: TransitionCause) {
        let from = self.phase;
        self.phase = to;
        self.phase_timer = timer;
        info!(?from, ?to, %cause, "phase changed");
        self.replicator.broadcast_delta(StateDelta::PhaseChanged {
            phase: to,
            phase_timer: timer,
        });
        if let Some(loader) = self.scene.as_mut()
            && let Err(err) = loader.load(to)
        {
            warn!(phase = ?to, %err, "scene load failed; continuing");
        }
    }

    fn enter_draft(&mut self, cause: TransitionCause) -> Result<(), SessionError> {
        phase::check_transition(self.phase, SessionPhase::Draft)?;
        let pool = self.hero_pool();
        let policy = DraftPolicy {
            enforce_unique_picks: self.config.enforce_unique_picks,
            completion_grace_secs: self.config.completion_grace_secs,
            fallback_hero: self.config.fallback_hero.clone(),
        };
        let duration = self.config.draft_duration_secs;
        self.draft = Some(HeroDraftCoordinator::begin(duration, pool, policy));
        self.set_phase(SessionPhase::Draft, duration, cause);
        let players: Vec<PlayerId> = self.registry.records().map(|r| r.player_id).collect();
        for player in players {
            self.reset_player(player, false);
        }
        Ok(())
    }

    /// Catalog ids, else the last good pool, else the fallback hero.
    fn hero_pool(&mut self) -> Vec<HeroId> {
        match self.catalog.as_ref().map(|c| c.all_ids()) {
            Some(Ok(ids)) if !ids.is_empty() => {
                self.last_pool = ids.clone();
                return ids;
            }
            Some(Ok(_)) => warn!("hero catalog is empty"),
            Some(Err(source)) => {
                let err = SessionError::MissingCollaborator("hero catalog");
                warn!(%err, %source, "falling back to last known hero pool");
            }
            None => debug!("no hero catalog attached"),
        }
        if self.last_pool.is_empty() {
            vec![self.config.fallback_hero.clone()]
        } else {
            self.last_pool.clone()
        }
    }

    fn complete_draft(&mut self, cause: TransitionCause) -> Result<(), SessionError> {
        phase::check_transition(self.phase, SessionPhase::Playing)?;
        let Some(mut draft) = self.draft.take() else {
            return Err(SessionError::invalid("no draft in progress"));
        };
        let eligible = self.registry.connected_assigned_ids();
        let completed = draft.force_complete(&eligible, &mut self.rng);
        for player in completed {
            if let Some(record) = self.registry.get_mut(player) {
                record.selected_hero = draft.selection(player).cloned();
                record.ready = true;
            }
            self.broadcast_roster(player);
        }

        let final_selections = draft.final_selections();
        info!(picks = final_selections.len(), %cause, "draft complete");
        self.hero_assignment = final_selections.clone();
        self.replicator
            .broadcast_delta(StateDelta::DraftOutcome { final_selections });
        self.assign_spawns();
        self.set_phase(SessionPhase::Playing, 0.0, cause);
        Ok(())
    }

    /// Map each team's players, by ascending id, onto its spawn points.
    fn assign_spawns(&mut self) {
        self.spawns.clear();
        for team in self.teams.teams() {
            let members = self.registry.team_members(team.team_id);
            if team.spawn_points.is_empty() {
                if !members.is_empty() {
                    debug!(team = %team.team_id, "team has no spawn points");
                }
                continue;
            }
            for (i, player) in members.into_iter().enumerate() {
                let pose = team.spawn_points[i % team.spawn_points.len()].clone();
                self.spawns.insert(player, pose);
            }
        }
    }

    fn abort_draft(&mut self, cause: TransitionCause) -> Result<(), SessionError> {
        phase::check_transition(self.phase, SessionPhase::Lobby)?;
        self.draft = None;
        self.set_phase(SessionPhase::Lobby, 0.0, cause);
        self.reset_for_lobby(false);
        Ok(())
    }

    fn return_to_lobby(&mut self, cause: TransitionCause) -> Result<(), SessionError> {
        phase::check_transition(self.phase, SessionPhase::Lobby)?;
        self.winning_team = None;
        self.spawns.clear();
        self.set_phase(SessionPhase::Lobby, 0.0, cause);
        self.reset_for_lobby(true);
        Ok(())
    }

    /// Lobby entry: purge disconnected records, clear the rest.
    fn reset_for_lobby(&mut self, clear_stats: bool) {
        for player in self.registry.disconnected_ids() {
            self.remove_player(player);
        }
        for player in self.registry.connected_ids() {
            self.reset_player(player, clear_stats);
        }
    }

    fn reset_player(&mut self, player: PlayerId, clear_stats: bool) {
        let Some(record) = self.registry.get_mut(player) else {
            return;
        };
        let roster_changed = record.ready || record.selected_hero.is_some();
        record.ready = false;
        record.selected_hero = None;
        let stats_changed =
            clear_stats && (record.kills != 0 || record.deaths != 0 || record.assists != 0);
        if stats_changed {
            record.kills = 0;
            record.deaths = 0;
            record.assists = 0;
        }
        if roster_changed {
            self.broadcast_roster(player);
        }
        if stats_changed {
            self.replicator.broadcast_delta(StateDelta::Stats {
                player_id: player,
                kills: 0,
                deaths: 0,
                assists: 0,
            });
        }
    }

    fn remove_player(&mut self, player: PlayerId) {
        if let Some(draft) = self.draft.as_mut() {
            draft.remove_player(player);
        }
        self.teams.forget_player(player);
        self.spawns.remove(&player);
        if self.registry.purge(player).is_some() {
            self.replicator
                .broadcast_delta(StateDelta::PlayerRemoved { player_id: player });
        }
    }

    fn broadcast_roster(&mut self, player: PlayerId) {
        if let Some(record) = self.registry.get(player) {
            let entry = record.roster_entry();
            self.replicator.broadcast_delta(StateDelta::Roster(entry));
        }
    }
}
