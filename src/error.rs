//! The error taxonomy described in the core's error handling design: transport,
//! protocol, validation, dependency-degrade and fatal-server errors all collapse
//! into one enum so the session layer never has to pattern-match on internals.

use serde::Serialize;

/// Error codes carried on the wire inside an `error` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum ErrorCode {
    InvalidMessageFormat,
    UnknownMessageType,
    InvalidSubscriptionRequest,
    NotFound,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidMessageFormat => "InvalidMessageFormat",
            Self::UnknownMessageType => "UnknownMessageType",
            Self::InvalidSubscriptionRequest => "InvalidSubscriptionRequest",
            Self::NotFound => "NotFound",
            Self::InternalError => "InternalError",
        }
    }
}

/// The core error type. Every fallible operation in this crate returns this,
/// or a narrower error that converts into it via `From`.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid subscription request: {0}")]
    InvalidSubscriptionRequest(String),

    #[error("malformed frame: {0}")]
    InvalidMessageFormat(String),

    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("procedural generation failed for ({floor}, {chunk_index}): {source}")]
    ProceduralGeneration {
        floor: i32,
        chunk_index: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("repository error: {0}")]
    Repository(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Maps this error onto the wire-level error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidSubscriptionRequest(_) => ErrorCode::InvalidSubscriptionRequest,
            Self::InvalidMessageFormat(_) => ErrorCode::InvalidMessageFormat,
            Self::UnknownMessageType(_) => ErrorCode::UnknownMessageType,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::ProceduralGeneration { .. } | Self::Repository(_) | Self::Internal(_) => {
                ErrorCode::InternalError
            }
        }
    }

    /// True for errors that the dependency-degrade policy absorbs rather than
    /// surfaces as a hard failure to the subscriber (see §4.12/§4.6).
    pub fn is_degradable(&self) -> bool {
        matches!(self, Self::ProceduralGeneration { .. } | Self::Repository(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
