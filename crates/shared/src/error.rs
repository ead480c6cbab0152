use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::DocumentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    InvalidInput,
    TransportFailure,
    ConcurrentUploadRejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocsError {
    #[error("document {id} not found")]
    NotFound { id: DocumentId },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("upload failed: {0}")]
    TransportFailure(String),
    #[error("an upload is already in progress")]
    ConcurrentUploadRejected,
}

impl DocsError {
    pub fn not_found(id: &DocumentId) -> Self {
        Self::NotFound { id: id.clone() }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::InvalidInput(_) => ErrorCode::InvalidInput,
            Self::TransportFailure(_) => ErrorCode::TransportFailure,
            Self::ConcurrentUploadRejected => ErrorCode::ConcurrentUploadRejected,
        }
    }
}

impl From<DocsError> for ApiError {
    fn from(value: DocsError) -> Self {
        Self {
            code: value.code(),
            message: value.to_string(),
        }
    }
}

pub type DocsResult<T> = Result<T, DocsError>;
