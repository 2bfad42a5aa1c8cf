//! Error taxonomy.
//!
//! | Kind         | Raised by                         | Surfaced to caller? |
//! |--------------|-----------------------------------|---------------------|
//! | `Connection` | transport open / send             | yes (`connect`)     |
//! | `Encoding`   | datagram encoder                  | yes, before sending |
//! | `Protocol`   | envelope / payload decode         | no, logged + dropped|
//! | `Io`         | socket setup                      | yes                 |
//!
//! Logic conditions (move for an unknown id, duplicate join, leave of an
//! absent id) are not errors at all; the reconciler absorbs them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
