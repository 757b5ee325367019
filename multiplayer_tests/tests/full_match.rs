// End-to-end scenarios for the session server with several live clients.
//
// Each test starts a real server on a random port and connects real
// `NetClient`s (via `TestClient`). Assertions are made on the clients'
// replicas, so every check also exercises delta replication and resync.

use std::net::SocketAddr;
use std::time::Duration;

use multiplayer_tests::TestClient;
use skirmish_protocol::{
    AdminCommand, HeroId, PlayerId, RejectReason, RequestKind, SessionPhase, TeamId,
};
use skirmish_server::{ClientError, ServerConfig, ServerHandle, start_server};
use skirmish_session::{SessionConfig, SessionInput, StaticCatalog};

const HEROES: [&str; 4] = ["ember", "frost", "gale", "thorn"];

fn start(session: SessionConfig) -> (ServerHandle, SocketAddr) {
    let config = ServerConfig {
        port: 0,
        tick_interval: Duration::from_millis(10),
        session,
        catalog: Some(StaticCatalog::new(HEROES)),
        ..ServerConfig::default()
    };
    start_server(config).unwrap()
}

fn quick_session() -> SessionConfig {
    SessionConfig {
        session_name: "integration-test".into(),
        draft_duration_secs: 30.0,
        completion_grace_secs: 0.2,
        result_display_secs: 0.3,
        rng_seed: Some(11),
        ..SessionConfig::default()
    }
}

/// Start a server and connect a host and a guest, both synced.
fn start_pair(session: SessionConfig) -> (ServerHandle, SocketAddr, TestClient, TestClient) {
    let (handle, addr) = start(session);
    let mut host = TestClient::connect(addr, "Host", Some(1500.0));
    let mut guest = TestClient::connect(addr, "Guest", Some(900.0));
    let guest_id = guest.id();
    host.wait_for("guest on a team", |r| {
        r.players.get(&guest_id).is_some_and(|p| p.team_id.is_some())
    });
    guest.wait_for("both players", |r| r.players.len() == 2);
    (handle, addr, host, guest)
}

/// Drive a pair from the lobby into `Playing` through the host's admin
/// commands.
fn force_into_match(host: &mut TestClient, guest: &mut TestClient) {
    host.admin(AdminCommand::ForceDraft);
    host.wait_for_phase(SessionPhase::Draft);
    guest.wait_for_phase(SessionPhase::Draft);
    host.admin(AdminCommand::ExpireDraftTimer);
    host.wait_for_phase(SessionPhase::Playing);
    guest.wait_for_phase(SessionPhase::Playing);
}

#[test]
fn ready_countdown_match_and_result() {
    let (handle, _addr, mut host, mut guest) = start_pair(quick_session());
    let (host_id, guest_id) = (host.id(), guest.id());

    host.set_ready(true);
    guest.set_ready(true);
    host.wait_for_phase(SessionPhase::Draft);
    guest.wait_for_phase(SessionPhase::Draft);

    host.select_hero("frost");
    guest.select_hero("thorn");
    host.set_ready(true);
    guest.set_ready(true);

    // All ready: the short grace countdown completes the draft well before
    // the 30s draft timer.
    host.wait_for_phase(SessionPhase::Playing);
    guest.wait_for_phase(SessionPhase::Playing);
    for client in [&host, &guest] {
        assert_eq!(client.assigned_hero(host_id), Some(&HeroId::from("frost")));
        assert_eq!(client.assigned_hero(guest_id), Some(&HeroId::from("thorn")));
    }

    handle.submit(SessionInput::Stats {
        player_id: guest_id,
        kills: 4,
        deaths: 1,
        assists: 2,
    });
    host.wait_for("guest stats", |r| r.players[&guest_id].kills == 4);

    host.admin(AdminCommand::DeclareWinner { team_id: TeamId(2) });
    guest.wait_for("match result", |r| r.winning_team == Some(TeamId(2)));
    assert_eq!(guest.replica().phase, SessionPhase::Result);

    // Result display elapses; the lobby starts clean.
    host.wait_for_phase(SessionPhase::Lobby);
    guest.wait_for("stats cleared", |r| {
        r.phase == SessionPhase::Lobby && r.players[&guest_id].kills == 0
    });
    for record in guest.replica().players.values() {
        assert!(!record.ready);
        assert_eq!(record.selected_hero, None);
        assert!(record.team_id.is_some());
    }
    assert_eq!(guest.replica().winning_team, None);

    host.disconnect();
    guest.disconnect();
    handle.stop();
}

#[test]
fn reconnect_during_match_keeps_identity_and_hero() {
    let (handle, addr, mut host, mut guest) = start_pair(quick_session());
    let guest_id = guest.id();
    force_into_match(&mut host, &mut guest);
    let hero = guest
        .assigned_hero(guest_id)
        .cloned()
        .expect("guest has a hero");
    let team = guest.replica().players[&guest_id].team_id;

    guest.disconnect();
    host.wait_for("guest marked disconnected", |r| {
        r.players
            .get(&guest_id)
            .is_some_and(|p| !p.connection_alive)
    });

    let mut back = TestClient::connect(addr, "Guest", None);
    assert!(back.info.reconnected);
    assert_eq!(back.id(), guest_id);
    back.wait_for_phase(SessionPhase::Playing);
    assert_eq!(back.assigned_hero(guest_id), Some(&hero));
    assert_eq!(back.replica().players[&guest_id].team_id, team);
    host.wait_for("guest back", |r| r.players[&guest_id].connection_alive);

    handle.stop();
}

#[test]
fn new_player_cannot_join_a_running_match() {
    let (handle, addr, mut host, mut guest) = start_pair(quick_session());
    force_into_match(&mut host, &mut guest);

    match TestClient::try_connect(addr, "Latecomer", None) {
        Err(ClientError::Rejected { reason, .. }) => {
            assert_eq!(reason, RejectReason::NotPermittedInPhase);
        }
        Err(other) => panic!("expected Rejected, got {other}"),
        Ok(_) => panic!("latecomer was admitted mid-match"),
    }
    handle.stop();
}

#[test]
fn draft_aborts_when_quorum_is_lost() {
    let (handle, _addr, mut host, mut guest) = start_pair(quick_session());
    let guest_id = guest.id();

    host.admin(AdminCommand::ForceDraft);
    guest.wait_for_phase(SessionPhase::Draft);
    guest.disconnect();

    // The guest never readied, so their record is dropped and the draft
    // falls below two players.
    host.wait_for("back in the lobby without the guest", |r| {
        r.phase == SessionPhase::Lobby && !r.players.contains_key(&guest_id)
    });
    handle.stop();
}

#[test]
fn host_kick_closes_the_connection() {
    let (handle, _addr, mut host, mut guest) = start_pair(quick_session());
    let guest_id = guest.id();

    // Only the host may issue admin commands.
    guest.admin(AdminCommand::Kick {
        player_id: host.id(),
    });
    assert_eq!(
        guest.wait_for_rejection(RequestKind::Admin),
        RejectReason::InvalidRequest
    );

    host.admin(AdminCommand::Kick { player_id: guest_id });
    guest.wait_for_close();
    host.wait_for("guest removed", |r| !r.players.contains_key(&guest_id));
    handle.stop();
}

#[test]
fn team_change_respects_capacity() {
    let json = serde_json::json!({
        "session_name": "one-a-side",
        "teams": [
            { "team_id": 1, "display_name": "Dawn", "max_players": 1 },
            { "team_id": 2, "display_name": "Dusk", "max_players": 1 },
            { "team_id": 3, "display_name": "Spare", "max_players": 1 }
        ],
        "rng_seed": 3
    });
    let session = SessionConfig::from_json(&json.to_string()).unwrap();
    let (handle, _addr, mut host, mut guest) = start_pair(session);
    let (host_id, guest_id) = (host.id(), guest.id());
    let placed = |id: PlayerId| host.replica().players[&id].team_id.expect("player placed");
    let (host_team, guest_team) = (placed(host_id), placed(guest_id));
    assert_ne!(host_team, guest_team);
    let spare = (1..=3)
        .map(TeamId)
        .find(|t| *t != host_team && *t != guest_team)
        .expect("one team is empty");

    guest.change_team(host_team);
    assert_eq!(
        guest.wait_for_rejection(RequestKind::TeamChange),
        RejectReason::CapacityExceeded
    );

    guest.change_team(spare);
    host.wait_for("guest on the spare team", |r| {
        r.players[&guest_id].team_id == Some(spare)
    });
    handle.stop();
}

#[test]
fn ready_in_playing_is_rejected_and_resync_matches() {
    let (handle, _addr, mut host, mut guest) = start_pair(quick_session());
    force_into_match(&mut host, &mut guest);

    guest.set_ready(false);
    assert_eq!(
        guest.wait_for_rejection(RequestKind::SetReady),
        RejectReason::NotPermittedInPhase
    );

    // A fresh snapshot agrees with the delta-built replica. Requests are
    // handled in order, so the snapshot lands before the second rejection.
    let before = guest.replica().clone();
    guest.resync();
    guest.set_ready(false);
    guest.wait_for_rejection(RequestKind::SetReady);
    assert_eq!(guest.replica().seq, before.seq);
    assert_eq!(guest.replica().players, before.players);
    assert_eq!(guest.replica().hero_assignment, before.hero_assignment);
    handle.stop();
}
