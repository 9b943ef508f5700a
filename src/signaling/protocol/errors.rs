use thiserror::Error;

use crate::signaling::errors::ErrorCode;

/// Why an inbound frame could not be turned into a `ClientMsg`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtoError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("envelope has no string \"event\" field")]
    MissingEvent,
    #[error("unknown event {0:?}")]
    UnknownEvent(String),
    #[error("invalid {event} message: {reason}")]
    InvalidFields { event: String, reason: String },
    #[error("binary frames are not supported")]
    BinaryFrame,
    #[error("message too large ({actual} > {max} bytes)")]
    TooLarge { max: usize, actual: usize },
}

impl ProtoError {
    /// Code reported to the client in the `error` event.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownEvent(_) => ErrorCode::UnknownEvent,
            Self::BinaryFrame => ErrorCode::UnsupportedFrame,
            Self::InvalidJson(_)
            | Self::MissingEvent
            | Self::InvalidFields { .. }
            | Self::TooLarge { .. } => ErrorCode::MalformedMessage,
        }
    }
}
