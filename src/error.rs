use thiserror::Error;

/// Errors returned synchronously by session, response and tool-gate operations.
///
/// All of them are recoverable: the operation had no effect and the caller can
/// keep using the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("turn {0} already has a response attached")]
    DuplicateResponse(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
}

impl SessionError {
    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
