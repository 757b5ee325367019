// Protocol messages between observers and the authoritative coordinator.
//
// - `ClientMessage`: sent by clients. After the `Hello` handshake every
//   message is a `PlayerRequest`, which the coordinator validates and either
//   applies or rejects with a `RejectReason`. Clients never mutate
//   authoritative state directly.
// - `ServerMessage`: sent by the coordinator. Deltas and snapshots go to
//   every attached observer; `Welcome`, `Rejected` and `RequestRejected` go
//   only to the connection they concern.

use serde::{Deserialize, Serialize};

use crate::state::{SessionSnapshot, StateDelta};
use crate::types::{DeltaSeq, HeroId, PartyId, PlayerId, TeamId};

/// Messages sent by a client to the coordinator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Handshake. `player_name` is the stable identity used for reconnection.
    Hello {
        protocol_version: u32,
        player_name: String,
        skill_rating: Option<f64>,
    },
    /// A validated request against authoritative state.
    Request(PlayerRequest),
    /// Player is leaving gracefully.
    Goodbye,
}

/// Inbound requests, validated by the coordinator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PlayerRequest {
    SelectHero { hero_id: HeroId },
    SetReady { is_ready: bool },
    RequestTeamChange { team_id: TeamId },
    ReportParty {
        party_id: PartyId,
        member_ids: Vec<PlayerId>,
    },
    RequestFullResync,
    /// Host-only administrative command.
    Admin { command: AdminCommand },
}

/// Administrative/debug commands accepted from the session host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AdminCommand {
    /// Enter the draft from the lobby without waiting for readiness.
    ForceDraft,
    /// Expire the draft timer now, forcing timeout completion.
    ExpireDraftTimer,
    /// Signal the win condition on behalf of the combat subsystem.
    DeclareWinner { team_id: TeamId },
    /// Disconnect and purge a player.
    Kick { player_id: PlayerId },
    /// Cancel the draft and return to the lobby.
    AbortToLobby,
}

/// Which request a rejection refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    Hello,
    SelectHero,
    SetReady,
    TeamChange,
    ReportParty,
    Resync,
    Admin,
}

impl PlayerRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::SelectHero { .. } => RequestKind::SelectHero,
            Self::SetReady { .. } => RequestKind::SetReady,
            Self::RequestTeamChange { .. } => RequestKind::TeamChange,
            Self::ReportParty { .. } => RequestKind::ReportParty,
            Self::RequestFullResync => RequestKind::Resync,
            Self::Admin { .. } => RequestKind::Admin,
        }
    }
}

/// Reason code carried by every rejection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    InvalidRequest,
    CapacityExceeded,
    NotPermittedInPhase,
    MissingCollaborator,
    InsufficientPlayers,
}

/// Messages sent by the coordinator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Handshake accepted. The client should follow up with a resync request.
    Welcome {
        player_id: PlayerId,
        session_name: String,
        reconnected: bool,
    },
    /// Handshake rejected; the connection will be closed.
    Rejected { reason: RejectReason, detail: String },
    /// A request was rejected; no state changed.
    RequestRejected {
        request: RequestKind,
        reason: RejectReason,
        detail: String,
    },
    /// One authoritative change.
    Delta { seq: DeltaSeq, delta: StateDelta },
    /// Full state, in response to `RequestFullResync`.
    Snapshot(SessionSnapshot),
}
