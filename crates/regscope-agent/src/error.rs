use thiserror::Error;
use uuid::Uuid;

/// Rejections from [`crate::hub::ClarificationHub::submit_response`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClarificationError {
    #[error("unknown session {0}")]
    UnknownSession(Uuid),

    #[error("session {0} has no pending clarification")]
    NoPendingRequest(Uuid),

    #[error("answer targets request {got}, but request {expected} is pending")]
    RequestMismatch { expected: Uuid, got: Uuid },

    #[error("request {0} has already been answered")]
    AlreadyAnswered(Uuid),

    #[error("answer text is empty")]
    EmptyAnswer,
}
