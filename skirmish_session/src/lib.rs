// skirmish_session — authoritative match-session coordinator.
//
// Drives one match session through Lobby → Draft → Playing → Result and back
// to Lobby, arbitrating team placement and hero picks, and replicating every
// authoritative change to observers. The crate is network-agnostic: the
// transport plugs in through `ReplicationChannel` and feeds inputs into
// `Session::enqueue`; `skirmish_server` is the TCP implementation.
//
// Module overview:
// - `session.rs`:     `Session`, the phase state machine and tick loop. Owns
//                     all authoritative state; every mutation emits one delta.
// - `phase.rs`:       Phase transition legality and transition causes.
// - `draft.rs`:       `HeroDraftCoordinator`: selections, readiness, pick
//                     uniqueness, completion countdown, timeout completion.
// - `teams.rs`:       `TeamAssignmentService`: balanced auto-placement,
//                     explicit team changes, party placement.
// - `registry.rs`:    `PlayerRegistry`: connection ↔ identity ↔ record.
// - `replication.rs`: `ReplicationChannel` contract, `Replicator` (delta
//                     sequencing), and the in-memory `MemoryChannel`.
// - `catalog.rs`:     `HeroCatalog` collaborator trait and `StaticCatalog`.
// - `scene.rs`:       `SceneLoader` collaborator trait.
// - `config.rs`:      `SessionConfig` (JSON, serde defaults) and team table.
// - `error.rs`:       `SessionError`, mapped to wire rejection reasons.
//
// Dependencies: `skirmish_protocol` for the wire vocabulary, `skirmish_prng`
// for the draft's random picks. Logging goes through `tracing`; installing a
// subscriber is left to the binary.

pub mod catalog;
pub mod config;
pub mod draft;
pub mod error;
pub mod phase;
pub mod registry;
pub mod replication;
pub mod scene;
pub mod session;
pub mod teams;

pub use catalog::{CatalogError, HeroCatalog, StaticCatalog};
pub use config::{ConfigError, Pose, SessionConfig, TeamConfig};
pub use draft::HeroDraftCoordinator;
pub use error::SessionError;
pub use registry::{JoinOutcome, PlayerRegistry};
pub use replication::{MemoryChannel, ReplicationChannel, Replicator};
pub use scene::SceneLoader;
pub use session::{Session, SessionInput};
pub use teams::TeamAssignmentService;
