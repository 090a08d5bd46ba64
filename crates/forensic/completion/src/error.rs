use std::time::Duration;

use thiserror::Error;

/// Failures of a single completion call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    /// The request could not be established: connection, auth, rate limit or
    /// any non-2xx response.
    #[error("completion service unavailable (status {}): {reason}", status_label(.status))]
    Unavailable { status: Option<u16>, reason: String },

    #[error("completion call timed out after {after:?}")]
    Timeout { after: Duration },

    /// The stream broke after it was established.
    #[error("completion stream interrupted: {0}")]
    Stream(String),

    #[error("invalid completion configuration: {0}")]
    InvalidConfig(String),
}

impl CompletionError {
    pub fn unavailable(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            status,
            reason: reason.into(),
        }
    }

    /// HTTP status, when the service answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unavailable { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether a caller may reasonably try the same call again later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable { status, .. } => !matches!(status, Some(400 | 401 | 403 | 404)),
            Self::Timeout { .. } | Self::Stream(_) => true,
            Self::InvalidConfig(_) => false,
        }
    }
}

fn status_label(status: &Option<u16>) -> String {
    status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
