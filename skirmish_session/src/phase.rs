// Phase transition rules.
//
// Phases only move forward (Lobby → Draft → Playing → Result) with two
// exceptions: Result → Lobby, the cycle that allows repeated matches, and
// Draft → Lobby, the abort path when the draft loses its quorum. Every
// transition the session performs goes through `check_transition`, so an
// admin command or a stray collaborator event cannot move the session
// backwards.

use std::fmt;

use skirmish_protocol::SessionPhase;

use crate::error::SessionError;

/// Why a transition fired. Logged with every phase change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionCause {
    AllReady,
    Forced,
    CountdownElapsed,
    DraftTimeout,
    Winner,
    ResultElapsed,
    QuorumLost,
}

impl fmt::Display for TransitionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AllReady => "all players ready",
            Self::Forced => "forced by host",
            Self::CountdownElapsed => "completion countdown elapsed",
            Self::DraftTimeout => "draft timer expired",
            Self::Winner => "winner declared",
            Self::ResultElapsed => "result display elapsed",
            Self::QuorumLost => "quorum lost",
        };
        f.write_str(s)
    }
}

pub fn is_allowed(from: SessionPhase, to: SessionPhase) -> bool {
    use SessionPhase::*;
    matches!(
        (from, to),
        (Lobby, Draft) | (Draft, Playing) | (Playing, Result) | (Result, Lobby) | (Draft, Lobby)
    )
}

pub fn check_transition(from: SessionPhase, to: SessionPhase) -> Result<(), SessionError> {
    if is_allowed(from, to) {
        Ok(())
    } else {
        Err(SessionError::NotPermittedInPhase {
            action: transition_action(to),
            phase: from,
        })
    }
}

fn transition_action(to: SessionPhase) -> &'static str {
    match to {
        SessionPhase::Lobby => "returning to the lobby",
        SessionPhase::Draft => "starting the draft",
        SessionPhase::Playing => "starting the match",
        SessionPhase::Result => "ending the match",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionPhase::*;

    const ALL: [SessionPhase; 4] = [Lobby, Draft, Playing, Result];

    #[test]
    fn forward_cycle_is_allowed() {
        assert!(is_allowed(Lobby, Draft));
        assert!(is_allowed(Draft, Playing));
        assert!(is_allowed(Playing, Result));
        assert!(is_allowed(Result, Lobby));
    }

    #[test]
    fn only_draft_may_abort_to_lobby() {
        assert!(is_allowed(Draft, Lobby));
        assert!(!is_allowed(Playing, Lobby));
    }

    #[test]
    fn everything_else_is_rejected() {
        let mut allowed = 0;
        for from in ALL {
            for to in ALL {
                if is_allowed(from, to) {
                    allowed += 1;
                } else {
                    assert!(check_transition(from, to).is_err(), "{from:?} -> {to:?}");
                }
            }
        }
        assert_eq!(allowed, 5);
    }

    #[test]
    fn rejection_names_current_phase() {
        let err = check_transition(Lobby, Playing).unwrap_err();
        assert_eq!(
            err,
            SessionError::NotPermittedInPhase {
                action: "starting the match",
                phase: Lobby,
            }
        );
    }
}
