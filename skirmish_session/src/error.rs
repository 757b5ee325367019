// Session error taxonomy.
//
// Every validation failure a component detects becomes one of these. None of
// them is fatal to the session: the coordinator turns them into a targeted
// `RequestRejected` notice for the requester (see `reason()`), a corrective
// substitution, or, for `InsufficientPlayers`, the draft abort path.

use skirmish_protocol::{RejectReason, SessionPhase, TeamId};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum SessionError {
    /// Malformed or referencing entities that do not exist.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),
    #[error("{action} is not permitted during {phase:?}")]
    NotPermittedInPhase {
        action: &'static str,
        phase: SessionPhase,
    },
    /// A required external collaborator is unreachable.
    #[error("{0} is unavailable")]
    MissingCollaborator(&'static str),
    #[error("{connected} connected players, {required} required")]
    InsufficientPlayers { connected: usize, required: usize },
}

impl SessionError {
    /// Wire reason code for a rejection notice.
    pub fn reason(&self) -> RejectReason {
        match self {
            Self::InvalidRequest(_) => RejectReason::InvalidRequest,
            Self::CapacityExceeded(_) => RejectReason::CapacityExceeded,
            Self::NotPermittedInPhase { .. } => RejectReason::NotPermittedInPhase,
            Self::MissingCollaborator(_) => RejectReason::MissingCollaborator,
            Self::InsufficientPlayers { .. } => RejectReason::InsufficientPlayers,
        }
    }

    pub(crate) fn invalid(detail: impl Into<String>) -> Self {
        Self::InvalidRequest(detail.into())
    }

    pub(crate) fn team_full(team: TeamId, max_players: usize) -> Self {
        Self::CapacityExceeded(format!("{team} is full ({max_players} players)"))
    }
}
