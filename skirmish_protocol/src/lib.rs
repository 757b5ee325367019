// skirmish_protocol — wire protocol for the match-session coordinator.
//
// Shared by the authoritative side (`skirmish_session`, `skirmish_server`)
// and by clients. No dependency on the coordinator logic or on any transport.
//
// Module overview:
// - `types.rs`:    ID newtypes: `PlayerId`, `ConnectionId`, `TeamId`,
//                  `PartyId`, `HeroId`, `DeltaSeq`.
// - `state.rs`:    Replicated data (`PlayerRecord`, `SessionPhase`,
//                  `DraftView`, `SessionSnapshot`), the typed delta union
//                  `StateDelta`, and the client-side `ReplicaState`.
// - `message.rs`:  `ClientMessage` / `PlayerRequest` inbound,
//                  `ServerMessage` outbound, rejection reason codes.
// - `framing.rs`:  4-byte length prefix + JSON payload over `Read`/`Write`.
//
// Partial updates travel as `StateDelta` variants rather than string-keyed
// field bags, so replicas apply them with a single `match`.

pub mod framing;
pub mod message;
pub mod state;
pub mod types;

pub use framing::{FrameError, MAX_FRAME_SIZE, read_frame, recv_json, send_json, write_frame};
pub use message::{
    AdminCommand, ClientMessage, PlayerRequest, RejectReason, RequestKind, ServerMessage,
};
pub use state::{
    ApplyOutcome, DraftView, PlayerRecord, ReplicaState, RosterEntry, SessionPhase,
    SessionSnapshot, StateDelta,
};
pub use types::{ConnectionId, DeltaSeq, HeroId, PROTOCOL_VERSION, PartyId, PlayerId, TeamId};
