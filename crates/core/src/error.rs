use std::error::Error as StdError;
use std::fmt::{self, Display};

use prof_buzz_model::{ErrorKind as ProviderErrorKind, ProviderError};

/// The kind of error that occurred while relaying a chat request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The conversation is empty, or its last message has no content.
    MalformedRequest,
    /// The embedding provider failed.
    UpstreamEmbedding,
    /// The vector index failed.
    UpstreamRetrieval,
    /// The completion provider rejected the request.
    UpstreamCompletion,
    /// The completion broke after streaming had started.
    StreamRelay,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::MalformedRequest => write!(f, "Malformed request"),
            ErrorKind::UpstreamEmbedding => write!(f, "Upstream embedding error"),
            ErrorKind::UpstreamRetrieval => write!(f, "Upstream retrieval error"),
            ErrorKind::UpstreamCompletion => {
                write!(f, "Upstream completion error")
            }
            ErrorKind::StreamRelay => write!(f, "Stream relay error"),
        }
    }
}

/// Describes a failed chat request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    provider_kind: Option<ProviderErrorKind>,
}

impl Error {
    #[inline]
    pub(crate) fn malformed_request<S: Into<String>>(reason: S) -> Self {
        Self {
            kind: ErrorKind::MalformedRequest,
            message: reason.into(),
            provider_kind: None,
        }
    }

    #[inline]
    pub(crate) fn upstream(kind: ErrorKind, err: &dyn ProviderError) -> Self {
        Self {
            kind,
            message: err.to_string(),
            provider_kind: Some(err.kind()),
        }
    }

    #[inline]
    pub(crate) fn with_message<S: Into<String>>(
        kind: ErrorKind,
        message: S,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            provider_kind: None,
        }
    }

    /// Returns the kind of this error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the kind of the provider failure this error wraps, if any.
    #[inline]
    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        self.provider_kind
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl StdError for Error {}
