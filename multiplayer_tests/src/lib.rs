// Test-only player client for multi-client session tests.
//
// Wraps the real `NetClient` (from `skirmish_server::client`) with blocking
// helpers: wait for a phase, wait for a predicate over the replica, wait for
// a rejection notice. All networking and replication goes through the same
// code paths a real game client uses; the only test-specific code here is the
// polling loops.
//
// See also: `tests/full_match.rs` for the scenarios.

use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use skirmish_protocol::{
    AdminCommand, HeroId, PlayerId, PlayerRecord, RejectReason, ReplicaState, RequestKind,
    ServerMessage, SessionPhase, TeamId,
};
use skirmish_server::{ClientError, NetClient, WelcomeInfo};

/// Default timeout for blocking poll operations.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep duration between poll attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A player connection with a synchronous, test-friendly API.
pub struct TestClient {
    client: NetClient,
    pub info: WelcomeInfo,
    /// Rejection notices seen by any poll, oldest first.
    pub rejections: Vec<(RequestKind, RejectReason)>,
}

impl TestClient {
    /// Connect and handshake; panics if the server rejects the player.
    pub fn connect(addr: SocketAddr, name: &str, skill_rating: Option<f64>) -> Self {
        let (client, info) = Self::try_connect(addr, name, skill_rating)
            .unwrap_or_else(|err| panic!("connect as {name} failed: {err}"));
        Self {
            client,
            info,
            rejections: Vec::new(),
        }
    }

    pub fn try_connect(
        addr: SocketAddr,
        name: &str,
        skill_rating: Option<f64>,
    ) -> Result<(NetClient, WelcomeInfo), ClientError> {
        NetClient::connect(&addr.to_string(), name, skill_rating)
    }

    pub fn id(&self) -> PlayerId {
        self.info.player_id
    }

    pub fn replica(&self) -> &ReplicaState {
        self.client.replica()
    }

    /// This client's view of `player`'s record.
    pub fn record(&self, player: PlayerId) -> Option<&PlayerRecord> {
        self.client.replica().players.get(&player)
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    /// Non-blocking: drain pending messages into the replica.
    pub fn pump(&mut self) {
        for msg in self.client.poll() {
            if let ServerMessage::RequestRejected {
                request, reason, ..
            } = msg
            {
                self.rejections.push((request, reason));
            }
        }
    }

    /// Blocking poll until `done` holds for this client's replica.
    pub fn wait_for(&mut self, what: &str, mut done: impl FnMut(&ReplicaState) -> bool) {
        let start = Instant::now();
        loop {
            self.pump();
            if self.client.replica().synced && done(self.client.replica()) {
                return;
            }
            assert!(
                start.elapsed() < POLL_TIMEOUT,
                "{}: timed out waiting for {what}",
                self.info.player_id
            );
            thread::sleep(POLL_INTERVAL);
        }
    }

    pub fn wait_for_phase(&mut self, phase: SessionPhase) {
        self.wait_for(&format!("{phase:?}"), |r| r.phase == phase);
    }

    /// Blocking poll until a rejection for `request` arrives; returns its
    /// reason.
    pub fn wait_for_rejection(&mut self, request: RequestKind) -> RejectReason {
        let start = Instant::now();
        loop {
            self.pump();
            if let Some(pos) = self.rejections.iter().position(|(kind, _)| *kind == request) {
                return self.rejections.remove(pos).1;
            }
            assert!(
                start.elapsed() < POLL_TIMEOUT,
                "timed out waiting for a {request:?} rejection"
            );
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Blocking poll until the server closes the connection.
    pub fn wait_for_close(&mut self) {
        let start = Instant::now();
        while !self.client.is_closed() {
            self.pump();
            assert!(start.elapsed() < POLL_TIMEOUT, "connection never closed");
            thread::sleep(POLL_INTERVAL);
        }
    }

    pub fn select_hero(&mut self, hero: &str) {
        self.client.select_hero(hero).expect("select_hero failed");
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.client.set_ready(ready).expect("set_ready failed");
    }

    pub fn change_team(&mut self, team: TeamId) {
        self.client
            .request_team_change(team)
            .expect("request_team_change failed");
    }

    pub fn admin(&mut self, command: AdminCommand) {
        self.client.admin(command).expect("admin failed");
    }

    pub fn resync(&mut self) {
        self.client.request_resync().expect("request_resync failed");
    }

    /// The hero this client's replica holds for `player` in the committed
    /// assignment.
    pub fn assigned_hero(&self, player: PlayerId) -> Option<&HeroId> {
        self.client.replica().hero_assignment.get(&player)
    }

    /// Send Goodbye; the server closes the connection.
    pub fn disconnect(&mut self) {
        self.client.disconnect();
    }
}
