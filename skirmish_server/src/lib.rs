// skirmish_server — TCP transport for the Skirmish session coordinator.
//
// Puts a `skirmish_session::Session` behind a plain `std::net` TCP listener.
// Clients speak the length-prefixed JSON protocol from `skirmish_protocol`:
// a `Hello` handshake, then `PlayerRequest`s; the server answers with a
// welcome or rejection, targeted request rejections, sequenced deltas, and
// snapshots on request.
//
// Module overview:
// - `server.rs`:  Listener thread, per-connection reader threads, and the
//                 main loop that owns the session and ticks it on a fixed
//                 cadence via `mpsc::recv_timeout`.
// - `channel.rs`: `TcpChannel`, the socket-backed `ReplicationChannel`.
// - `client.rs`:  `NetClient`, a client that keeps a `ReplicaState` and
//                 resyncs on sequence gaps. Used by tests and tools.
// - `error.rs`:   `ServerError` (startup) and `ClientError`.
//
// The server can run as a standalone binary (`main.rs`) or be embedded via
// `start_server`.

pub mod channel;
pub mod client;
pub mod error;
pub mod server;

pub use channel::TcpChannel;
pub use client::{NetClient, WelcomeInfo};
pub use error::{ClientError, ServerError};
pub use server::{ServerConfig, ServerHandle, start_server};
