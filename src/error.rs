//! Error types for tracking and reframing.

use thiserror::Error;

/// Result type for tracking and reframing operations.
pub type ReframeResult<T> = Result<T, ReframeError>;

/// Errors that can occur while tracking or computing a reframe path.
#[derive(Debug, Error)]
pub enum ReframeError {
    #[error("invalid config value for `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("unknown output ratio: {0}")]
    UnknownOutputRatio(String),

    #[error("frame {got} is not after the last processed frame {last}")]
    OutOfOrderFrame { last: u64, got: u64 },

    #[error("invalid frame size {width}x{height}")]
    InvalidFrameSize { width: u32, height: u32 },

    #[error("innovation covariance is singular")]
    SingularMatrix,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReframeError {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        ReframeError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}
