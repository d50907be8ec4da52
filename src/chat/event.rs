use crate::chat::message::Message;
use crate::error::Error;

/// What subscribers receive, in the order lines arrived.
#[derive(Debug, Clone)]
pub enum Event {
    Message(Message),

    /// The read loop has ended. Always the last event of a session.
    Closed(CloseReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` was called or the session was dropped.
    Requested,
    EndOfStream,
    ReadTimeout,
    /// The server rejected the credential. Carries its line.
    AuthenticationFailed(String),
    Io(String),
}

impl CloseReason {
    /// Whether the session ended because something went wrong.
    pub fn is_error(&self) -> bool {
        !matches!(self, CloseReason::Requested)
    }
}

impl From<Error> for CloseReason {
    fn from(err: Error) -> Self {
        match err {
            Error::Closed => CloseReason::Requested,
            Error::Eof => CloseReason::EndOfStream,
            Error::ReadTimeout(_) => CloseReason::ReadTimeout,
            Error::Authentication(line) => CloseReason::AuthenticationFailed(line),
            other => CloseReason::Io(other.to_string()),
        }
    }
}
