// World/scene loader collaborator, invoked on phase entry.
//
// Loading is best-effort: the session logs a failure and carries on with the
// transition. A session with no loader attached skips the call entirely.

use skirmish_protocol::SessionPhase;

pub trait SceneLoader: Send {
    fn load(&mut self, target: SessionPhase) -> Result<(), String>;
}
