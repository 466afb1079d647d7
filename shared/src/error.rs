use serde::{Serialize, Deserialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    #[error("Invalid input provided")]
    InvalidInput,
    #[error("Resource not found")]
    NotFound,
    #[error("Vote limit reached")]
    LimitReached,
    #[error("Internal system error")]
    SystemError,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VotingError {
    #[error("A voter id is required to vote")]
    InvalidVoter,
    #[error("You have used all of your votes!")]
    VoteLimitExceeded { remaining: u32 },
    #[error("Character not found: {0}")]
    UnknownCandidate(String),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl VotingError {
    pub fn code(&self) -> ErrorCode {
        match self {
            VotingError::InvalidVoter => ErrorCode::InvalidInput,
            VotingError::VoteLimitExceeded { .. } => ErrorCode::LimitReached,
            VotingError::UnknownCandidate(_) => ErrorCode::NotFound,
            VotingError::StorageUnavailable(_) => ErrorCode::SystemError,
        }
    }

    /// Business-rule rejections. These are never transient and never retried.
    pub fn is_client_error(&self) -> bool {
        self.code() != ErrorCode::SystemError
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            remaining: None,
        }
    }
}

impl From<&VotingError> for ErrorResponse {
    fn from(err: &VotingError) -> Self {
        match err {
            VotingError::VoteLimitExceeded { remaining } => Self {
                error: err.to_string(),
                remaining: Some(*remaining),
            },
            // Storage details stay in the logs.
            VotingError::StorageUnavailable(_) => Self::new("Storage is temporarily unavailable"),
            _ => Self::new(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, VotingError>;
