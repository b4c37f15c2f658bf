use msg::{InvalidMessage, RequestId};
use thiserror::Error;

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors surfaced by the dispatch core.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// A required message or result was missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A lifecycle transition was requested out of order or twice.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The request was torn down before a result arrived.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// A result arrived for an id that is no longer pending.
    #[error("unknown request {0}")]
    UnknownRequest(RequestId),

    /// The destination was unreachable or forwarding failed.
    #[error("dispatch failure: {0}")]
    DispatchFailure(String),
}

impl DispatchError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        DispatchError::InvalidArgument(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        DispatchError::InvalidState(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        DispatchError::Cancelled(msg.into())
    }

    pub fn dispatch_failure(msg: impl Into<String>) -> Self {
        DispatchError::DispatchFailure(msg.into())
    }

    /// Numeric code used at the foreign boundary.
    pub fn code(&self) -> ErrorCode {
        match self {
            DispatchError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            DispatchError::InvalidState(_) => ErrorCode::InvalidState,
            DispatchError::Cancelled(_) => ErrorCode::Cancelled,
            DispatchError::UnknownRequest(_) => ErrorCode::UnknownRequest,
            DispatchError::DispatchFailure(_) => ErrorCode::DispatchFailure,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DispatchError::Cancelled(_))
    }
}

impl From<InvalidMessage> for DispatchError {
    fn from(err: InvalidMessage) -> Self {
        DispatchError::InvalidArgument(err.to_string())
    }
}

/// Stable status codes for callers that cannot carry [`DispatchError`].
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Ok = 0,
    InvalidArgument = 1,
    InvalidState = 2,
    Cancelled = 3,
    UnknownRequest = 4,
    DispatchFailure = 5,
}

impl ErrorCode {
    pub fn from_i32(value: i32) -> Option<Self> {
        Some(match value {
            0 => ErrorCode::Ok,
            1 => ErrorCode::InvalidArgument,
            2 => ErrorCode::InvalidState,
            3 => ErrorCode::Cancelled,
            4 => ErrorCode::UnknownRequest,
            5 => ErrorCode::DispatchFailure,
            _ => return None,
        })
    }
}
