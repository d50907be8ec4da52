use std::io;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),

    #[error("connection i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("no line received within {0:?}")]
    ReadTimeout(Duration),

    #[error("server closed the connection")]
    Eof,

    /// The server rejected PASS/NICK. Carries the server's line.
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("not joined to #{0}")]
    NotJoined(String),

    #[error("no channel configured")]
    NoChannel,

    #[error("connection is closed")]
    Closed,
}
