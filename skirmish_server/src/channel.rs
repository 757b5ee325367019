// TCP implementation of `ReplicationChannel`.
//
// Holds the write half of every attached connection, wrapped in a
// `BufWriter`. Only the server's main thread writes; reader threads own the
// read halves. A broadcast serializes the message once and writes the same
// frame to every observer.
//
// A failed write drops that observer's writer and shuts the socket down. The
// connection's reader thread then sees EOF and reports the disconnect, so
// the session learns about dead peers through the normal input path. Writes
// carry a timeout: a peer that stops reading fills its socket buffer, and the
// timed-out write drops it like any other failure instead of holding up the
// tick for everyone else.

use std::collections::BTreeMap;
use std::io::BufWriter;
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use skirmish_protocol::{ConnectionId, ServerMessage, write_frame};
use skirmish_session::ReplicationChannel;
use tracing::{debug, warn};

/// How long one frame write may block before the observer is dropped.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct TcpChannel {
    writers: BTreeMap<ConnectionId, BufWriter<TcpStream>>,
    write_timeout: Duration,
}

impl Default for TcpChannel {
    fn default() -> Self {
        Self::with_write_timeout(DEFAULT_WRITE_TIMEOUT)
    }
}

impl TcpChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_write_timeout(write_timeout: Duration) -> Self {
        Self {
            writers: BTreeMap::new(),
            write_timeout,
        }
    }

    /// Start delivering to `connection` through `stream` (a write half).
    /// A stream that refuses a write timeout is not attached.
    pub fn attach(&mut self, connection: ConnectionId, stream: TcpStream) {
        if let Err(err) = stream.set_write_timeout(Some(self.write_timeout)) {
            warn!(%connection, %err, "cannot set write timeout; closing");
            let _ = stream.shutdown(Shutdown::Both);
            return;
        }
        self.writers.insert(connection, BufWriter::new(stream));
    }

    pub fn is_attached(&self, connection: ConnectionId) -> bool {
        self.writers.contains_key(&connection)
    }

    pub fn len(&self) -> usize {
        self.writers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    fn encode(msg: &ServerMessage) -> Option<Vec<u8>> {
        match serde_json::to_vec(msg) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(%err, "cannot encode server message");
                None
            }
        }
    }

    fn close(&mut self, connection: ConnectionId) {
        if let Some(writer) = self.writers.remove(&connection) {
            let _ = writer.get_ref().shutdown(Shutdown::Both);
        }
    }
}

impl ReplicationChannel for TcpChannel {
    fn broadcast(&mut self, msg: &ServerMessage) {
        let Some(payload) = Self::encode(msg) else {
            return;
        };
        let failed: Vec<ConnectionId> = self
            .writers
            .iter_mut()
            .filter_map(|(connection, writer)| match write_frame(writer, &payload) {
                Ok(()) => None,
                Err(err) => {
                    warn!(%connection, %err, "write failed; dropping observer");
                    Some(*connection)
                }
            })
            .collect();
        for connection in failed {
            self.close(connection);
        }
    }

    fn send_to(&mut self, connection: ConnectionId, msg: &ServerMessage) {
        let Some(writer) = self.writers.get_mut(&connection) else {
            debug!(%connection, "send to detached observer skipped");
            return;
        };
        let Some(payload) = Self::encode(msg) else {
            return;
        };
        if let Err(err) = write_frame(writer, &payload) {
            warn!(%connection, %err, "write failed; dropping observer");
            self.close(connection);
        }
    }

    fn detach(&mut self, connection: ConnectionId) {
        self.close(connection);
    }
}
