// TCP client that keeps a replica of the authoritative session.
//
// - `connect()` performs the TCP connect and `Hello` handshake on the calling
//   thread, spawns a background reader thread, and immediately asks for a
//   full resync: a fresh observer never relies on having seen earlier
//   deltas.
// - The reader thread reads framed `ServerMessage`s and pushes them into an
//   `mpsc` channel.
// - `poll()` drains that channel without blocking, folds snapshots and deltas
//   into the local `ReplicaState`, and returns every message for callers that
//   want to inspect notices. A sequence gap triggers one resync request;
//   further deltas are ignored until the snapshot arrives.
//
// Requests are written synchronously from the calling thread; they are small.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use skirmish_protocol::{
    AdminCommand, ApplyOutcome, ClientMessage, HeroId, PROTOCOL_VERSION, PartyId, PlayerId,
    PlayerRequest, ReplicaState, ServerMessage, TeamId, recv_json, send_json,
};
use tracing::{debug, warn};

use crate::error::ClientError;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Information returned by a successful handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WelcomeInfo {
    pub player_id: PlayerId,
    pub session_name: String,
    pub reconnected: bool,
}

pub struct NetClient {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<ServerMessage>,
    _reader_thread: JoinHandle<()>,
    player_id: PlayerId,
    replica: ReplicaState,
    resync_pending: bool,
    closed: bool,
}

impl NetClient {
    /// Connect, handshake, start the reader thread and request a resync.
    pub fn connect(
        addr: &str,
        player_name: &str,
        skill_rating: Option<f64>,
    ) -> Result<(Self, WelcomeInfo), ClientError> {
        let stream = TcpStream::connect(addr).map_err(|source| ClientError::Connect {
            addr: addr.to_owned(),
            source,
        })?;
        stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
        stream.set_nodelay(true).ok();
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = BufWriter::new(stream);

        send_json(
            &mut writer,
            &ClientMessage::Hello {
                protocol_version: PROTOCOL_VERSION,
                player_name: player_name.into(),
                skill_rating,
            },
        )?;

        // Broadcasts can reach us between attach and the welcome; they
        // predate our snapshot and are dropped.
        let info = loop {
            match recv_json::<_, ServerMessage>(&mut reader) {
                Ok(ServerMessage::Welcome {
                    player_id,
                    session_name,
                    reconnected,
                }) => {
                    break WelcomeInfo {
                        player_id,
                        session_name,
                        reconnected,
                    };
                }
                Ok(ServerMessage::Rejected { reason, detail }) => {
                    return Err(ClientError::Rejected { reason, detail });
                }
                Ok(other) => debug!(?other, "ignoring message before welcome"),
                Err(err) if err.is_eof() => return Err(ClientError::Closed),
                Err(err) => return Err(err.into()),
            }
        };
        reader.get_ref().set_read_timeout(None)?;

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::spawn(move || reader_loop(reader, tx));

        let mut client = Self {
            writer,
            inbox: rx,
            _reader_thread: reader_thread,
            player_id: info.player_id,
            replica: ReplicaState::default(),
            resync_pending: false,
            closed: false,
        };
        client.request_resync()?;
        Ok((client, info))
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// The local copy of authoritative state, as of the last `poll()`.
    pub fn replica(&self) -> &ReplicaState {
        &self.replica
    }

    /// True once the server has closed the connection.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Drain queued server messages, applying them to the replica.
    pub fn poll(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        loop {
            match self.inbox.try_recv() {
                Ok(msg) => {
                    self.absorb(&msg);
                    messages.push(msg);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
        messages
    }

    fn absorb(&mut self, msg: &ServerMessage) {
        match msg {
            ServerMessage::Snapshot(snapshot) => {
                self.replica.load_snapshot(snapshot.clone());
                self.resync_pending = false;
            }
            ServerMessage::Delta { seq, delta } => {
                let outcome = self.replica.apply(*seq, delta.clone());
                if outcome == ApplyOutcome::Gap && !self.resync_pending {
                    warn!(have = ?self.replica.seq, got = ?seq, "delta gap; requesting resync");
                    if let Err(err) = self.request_resync() {
                        warn!(%err, "resync request failed");
                    }
                }
            }
            ServerMessage::RequestRejected {
                request,
                reason,
                detail,
            } => debug!(?request, ?reason, %detail, "request rejected"),
            ServerMessage::Welcome { .. } | ServerMessage::Rejected { .. } => {}
        }
    }

    pub fn send(&mut self, request: PlayerRequest) -> Result<(), ClientError> {
        send_json(&mut self.writer, &ClientMessage::Request(request))?;
        Ok(())
    }

    pub fn request_resync(&mut self) -> Result<(), ClientError> {
        self.resync_pending = true;
        self.send(PlayerRequest::RequestFullResync)
    }

    pub fn select_hero(&mut self, hero: &str) -> Result<(), ClientError> {
        self.send(PlayerRequest::SelectHero {
            hero_id: HeroId::from(hero),
        })
    }

    pub fn set_ready(&mut self, is_ready: bool) -> Result<(), ClientError> {
        self.send(PlayerRequest::SetReady { is_ready })
    }

    pub fn request_team_change(&mut self, team_id: TeamId) -> Result<(), ClientError> {
        self.send(PlayerRequest::RequestTeamChange { team_id })
    }

    pub fn report_party(
        &mut self,
        party_id: PartyId,
        member_ids: Vec<PlayerId>,
    ) -> Result<(), ClientError> {
        self.send(PlayerRequest::ReportParty {
            party_id,
            member_ids,
        })
    }

    pub fn admin(&mut self, command: AdminCommand) -> Result<(), ClientError> {
        self.send(PlayerRequest::Admin { command })
    }

    /// Send Goodbye. The server closes the connection afterwards.
    pub fn disconnect(&mut self) {
        let _ = send_json(&mut self.writer, &ClientMessage::Goodbye);
    }
}

/// Reader thread: read framed messages in a loop, push to channel.
fn reader_loop(mut reader: BufReader<TcpStream>, tx: mpsc::Sender<ServerMessage>) {
    loop {
        match recv_json::<_, ServerMessage>(&mut reader) {
            Ok(msg) => {
                if tx.send(msg).is_err() {
                    break;
                }
            }
            Err(err) => {
                if !err.is_eof() {
                    debug!(%err, "client reader stopped");
                }
                break;
            }
        }
    }
}
