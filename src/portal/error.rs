//! Error taxonomy shared by every portal component.

use serde::Serialize;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse classification surfaced to callers alongside every failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    NotInitialized,
    Unauthenticated,
    PortalFormatMismatch,
    NetworkFailure,
    ServerRejected,
}

/// Why the portal explicitly refused a request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InvalidCredentials,
    InvalidCode,
    ExpiredCode,
    SensorsOpen,
    CommandFailed,
}

impl RejectReason {
    pub(crate) fn from_wire(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "EXPIRED_CODE" | "EXPIRED" => Self::ExpiredCode,
            "INVALID_CODE" | "INVALID" | "WRONG_CODE" => Self::InvalidCode,
            _ => Self::CommandFailed,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unknown verification method: {0}")]
    UnknownVerificationMethod(String),
    #[error("no arm button renders the {from} -> {to} transition")]
    NoMatchingButton { from: String, to: String },
    #[error("command tokens are stale: {0}")]
    StaleTokens(&'static str),
    #[error("not initialized: {0}")]
    NotInitialized(&'static str),
    #[error("authentication required")]
    Unauthenticated,
    #[error("portal format mismatch: {0}")]
    FormatMismatch(String),
    #[error("unsupported portal version: {0}")]
    UnsupportedVersion(String),
    #[error("portal path not found: {0}")]
    NotFound(String),
    #[error("portal server error: {status} on {path}")]
    Server { status: u16, path: String },
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("network failure: {0}")]
    Network(#[from] reqwest::Error),
    #[error("portal rejected the request: {message}")]
    Rejected {
        reason: RejectReason,
        message: String,
    },
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_)
            | Self::UnknownVerificationMethod(_)
            | Self::StaleTokens(_)
            | Self::Pattern(_) => ErrorKind::InvalidInput,
            Self::NotInitialized(_) => ErrorKind::NotInitialized,
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::FormatMismatch(_)
            | Self::UnsupportedVersion(_)
            | Self::NotFound(_)
            | Self::NoMatchingButton { .. } => ErrorKind::PortalFormatMismatch,
            Self::Server { .. } | Self::Network(_) => ErrorKind::NetworkFailure,
            Self::Rejected { .. } => ErrorKind::ServerRejected,
        }
    }

    /// Only transport-level failures are worth another attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::NetworkFailure
    }

    pub(crate) fn format(what: impl Into<String>) -> Self {
        Self::FormatMismatch(what.into())
    }

    pub(crate) fn rejected(reason: RejectReason, message: impl Into<String>) -> Self {
        Self::Rejected {
            reason,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::Rejected { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Serialized form of an [`Error`] carried in failed responses.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ErrorObject {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    pub message: String,
}

impl From<&Error> for ErrorObject {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            reason: err.reject_reason(),
            message: err.to_string(),
        }
    }
}
