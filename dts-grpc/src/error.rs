use std::fmt;

use thiserror::Error;
use tonic::Code;

/// Reporting categories every transport failure is folded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallCategory {
    Unavailable,
    InvalidArgument,
    NotFound,
    Internal,
    Unimplemented,
}

impl CallCategory {
    /// Fold a gRPC status code into one of the five categories.
    ///
    /// Timeouts and cancellation count as `Unavailable`; rejected credentials
    /// and failed preconditions count as `InvalidArgument`; anything not
    /// listed is `Internal`.
    pub fn from_code(code: Code) -> Self {
        match code {
            Code::Unavailable | Code::DeadlineExceeded | Code::Cancelled => Self::Unavailable,
            Code::InvalidArgument
            | Code::OutOfRange
            | Code::FailedPrecondition
            | Code::Unauthenticated
            | Code::PermissionDenied => Self::InvalidArgument,
            Code::NotFound => Self::NotFound,
            Code::Unimplemented => Self::Unimplemented,
            _ => Self::Internal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::InvalidArgument => "invalid argument",
            Self::NotFound => "not found",
            Self::Internal => "internal",
            Self::Unimplemented => "unimplemented",
        }
    }
}

impl fmt::Display for CallCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed call, normalized by [`crate::guard`].
#[derive(Debug, Clone, Error)]
#[error("{category}: {message}")]
pub struct CallError {
    pub category: CallCategory,
    pub message: String,
    /// Original status code, kept for logging.
    pub code: Code,
}

impl CallError {
    pub fn is_unavailable(&self) -> bool {
        self.category == CallCategory::Unavailable
    }
}

impl From<tonic::Status> for CallError {
    fn from(status: tonic::Status) -> Self {
        let code = status.code();
        let message = if status.message().is_empty() {
            code.description().to_string()
        } else {
            status.message().to_string()
        };
        Self {
            category: CallCategory::from_code(code),
            message,
            code,
        }
    }
}

/// Errors building a channel; no call has been attempted yet.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("invalid server endpoint {target}: {source}")]
    Endpoint {
        target: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("TLS configuration rejected for {target}: {source}")]
    Tls {
        target: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("shared secret is not valid call metadata: {0}")]
    InvalidSecret(#[from] tonic::metadata::errors::InvalidMetadataValue),
}

impl From<ChannelError> for CallError {
    fn from(err: ChannelError) -> Self {
        let (category, code) = match err {
            ChannelError::InvalidSecret(_) => (CallCategory::InvalidArgument, Code::InvalidArgument),
            ChannelError::Endpoint { .. } | ChannelError::Tls { .. } => {
                (CallCategory::Unavailable, Code::Unavailable)
            }
        };
        Self {
            category,
            message: err.to_string(),
            code,
        }
    }
}
