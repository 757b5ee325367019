// Transport-level errors.
//
// `ServerError` covers startup: binding the listener and loading the session
// config and hero list. Once the loop runs, per-connection failures are
// logged and turned into disconnects rather than surfaced.
//
// `ClientError` is what `NetClient` callers see.

use skirmish_protocol::{FrameError, RejectReason};
use skirmish_session::{CatalogError, ConfigError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("rejected ({reason:?}): {detail}")]
    Rejected { reason: RejectReason, detail: String },
    #[error("connection closed before the handshake completed")]
    Closed,
}
