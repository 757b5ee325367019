// Integration smoke test for the session server.
//
// Starts a server on localhost, connects real `NetClient`s, and walks one
// match through lobby, draft, playing and result. Also checks the handshake
// failure paths over plain sockets: a version mismatch and a duplicate live
// name are both answered with `Rejected` and a closed connection.

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use skirmish_protocol::{
    ClientMessage, HeroId, RejectReason, RequestKind, ServerMessage, SessionPhase, TeamId,
    recv_json, send_json,
};
use skirmish_server::{ClientError, NetClient, ServerConfig, ServerHandle, start_server};
use skirmish_session::{SessionConfig, SessionInput, StaticCatalog};

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn start(draft_duration_secs: f64) -> (ServerHandle, SocketAddr) {
    let config = ServerConfig {
        port: 0,
        tick_interval: Duration::from_millis(10),
        session: SessionConfig {
            session_name: "smoke-test".into(),
            draft_duration_secs,
            completion_grace_secs: 0.2,
            result_display_secs: 0.3,
            rng_seed: Some(7),
            ..SessionConfig::default()
        },
        catalog: Some(StaticCatalog::new(["ember", "frost", "gale"])),
        ..ServerConfig::default()
    };
    start_server(config).unwrap()
}

/// Poll every client until `done` holds or the timeout passes.
fn wait_until(clients: &mut [&mut NetClient], mut done: impl FnMut(&[&mut NetClient]) -> bool) {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    loop {
        for client in clients.iter_mut() {
            client.poll();
        }
        if done(&*clients) {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for replicas");
        thread::sleep(POLL_INTERVAL);
    }
}

fn all_in(phase: SessionPhase) -> impl FnMut(&[&mut NetClient]) -> bool {
    move |clients: &[&mut NetClient]| clients.iter().all(|c| c.replica().phase == phase)
}

#[test]
fn full_match_cycle() {
    let (handle, addr) = start(1.0);
    let addr = addr.to_string();

    let (mut ari, ari_info) = NetClient::connect(&addr, "Ari", Some(1200.0)).unwrap();
    let (mut bo, bo_info) = NetClient::connect(&addr, "Bo", Some(1100.0)).unwrap();
    assert_eq!(ari_info.session_name, "smoke-test");
    assert!(!bo_info.reconnected);
    assert_ne!(ari_info.player_id, bo_info.player_id);

    // Both replicas see both players, one per team.
    wait_until(&mut [&mut ari, &mut bo], |clients| {
        clients.iter().all(|c| {
            c.replica().synced
                && c.replica().players.len() == 2
                && c.replica().players.values().all(|r| r.team_id.is_some())
        })
    });
    let teams = &ari.replica().players;
    assert_eq!(teams[&ari_info.player_id].team_id, Some(TeamId(1)));
    assert_eq!(teams[&bo_info.player_id].team_id, Some(TeamId(2)));

    ari.set_ready(true).unwrap();
    bo.set_ready(true).unwrap();
    wait_until(&mut [&mut ari, &mut bo], all_in(SessionPhase::Draft));
    assert!(ari.replica().players.values().all(|r| !r.ready));

    // Ari locks in a hero; Bo asks for the same one and gets a substitute.
    ari.select_hero("ember").unwrap();
    ari.set_ready(true).unwrap();
    wait_until(&mut [&mut ari, &mut bo], |clients| {
        clients[1].replica().players[&ari_info.player_id].ready
    });
    bo.select_hero("ember").unwrap();
    wait_until(&mut [&mut ari, &mut bo], |clients| {
        clients[0].replica().players[&bo_info.player_id]
            .selected_hero
            .is_some()
    });
    let bo_hero = ari.replica().players[&bo_info.player_id]
        .selected_hero
        .clone();
    assert_ne!(bo_hero, Some(HeroId::from("ember")));

    // Bo never readies; the draft timer runs out and completes the draft.
    wait_until(&mut [&mut ari, &mut bo], all_in(SessionPhase::Playing));
    let assignment = &bo.replica().hero_assignment;
    assert_eq!(assignment.len(), 2);
    assert_eq!(assignment[&ari_info.player_id], HeroId::from("ember"));
    assert_ne!(assignment[&bo_info.player_id], HeroId::from("ember"));

    handle.submit(SessionInput::Winner { team_id: TeamId(2) });
    wait_until(&mut [&mut ari, &mut bo], |clients| {
        clients
            .iter()
            .all(|c| c.replica().winning_team == Some(TeamId(2)))
    });
    assert_eq!(ari.replica().phase, SessionPhase::Result);

    wait_until(&mut [&mut ari, &mut bo], all_in(SessionPhase::Lobby));
    assert_eq!(ari.replica().winning_team, None);
    assert_eq!(ari.replica().players.len(), 2);

    ari.disconnect();
    bo.disconnect();
    handle.stop();
}

#[test]
fn request_outside_its_phase_is_rejected_to_sender() {
    let (handle, addr) = start(30.0);
    let addr = addr.to_string();
    let (mut ari, _) = NetClient::connect(&addr, "Ari", None).unwrap();

    ari.select_hero("ember").unwrap();
    let deadline = Instant::now() + WAIT_TIMEOUT;
    let rejection = loop {
        let found = ari.poll().into_iter().find_map(|msg| match msg {
            ServerMessage::RequestRejected {
                request, reason, ..
            } => Some((request, reason)),
            _ => None,
        });
        if let Some(found) = found {
            break found;
        }
        assert!(Instant::now() < deadline, "no rejection received");
        thread::sleep(POLL_INTERVAL);
    };
    assert_eq!(
        rejection,
        (RequestKind::SelectHero, RejectReason::NotPermittedInPhase)
    );
    assert_eq!(ari.replica().phase, SessionPhase::Lobby);
    handle.stop();
}

#[test]
fn duplicate_live_name_is_rejected() {
    let (handle, addr) = start(30.0);
    let addr = addr.to_string();
    let (_ari, _) = NetClient::connect(&addr, "Ari", None).unwrap();

    match NetClient::connect(&addr, "Ari", None) {
        Err(ClientError::Rejected { reason, .. }) => {
            assert_eq!(reason, RejectReason::InvalidRequest);
        }
        Err(other) => panic!("expected Rejected, got {other}"),
        Ok(_) => panic!("duplicate name was accepted"),
    }
    handle.stop();
}

#[test]
fn protocol_mismatch_is_rejected_and_closed() {
    let (handle, addr) = start(30.0);

    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(WAIT_TIMEOUT)).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut writer = BufWriter::new(stream);
    send_json(
        &mut writer,
        &ClientMessage::Hello {
            protocol_version: 99,
            player_name: "Old".into(),
            skill_rating: None,
        },
    )
    .unwrap();

    let msg: ServerMessage = recv_json(&mut reader).unwrap();
    match msg {
        ServerMessage::Rejected { reason, .. } => {
            assert_eq!(reason, RejectReason::InvalidRequest);
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
    let err = recv_json::<_, ServerMessage>(&mut reader).unwrap_err();
    assert!(err.is_eof());
    handle.stop();
}
