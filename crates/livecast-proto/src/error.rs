//! Error taxonomy shared by the daemon and its clients.

use std::fmt;

use thiserror::Error;

use crate::normalize::CanonicalStatus;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("not authenticated")]
    NotAuthenticated,

    /// Also returned by list endpoints with nothing to list; callers treat
    /// that case as an empty result.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    ValidationFailed(Validation),

    #[error("asset acquisition failed: {0}")]
    RemoteAcquisitionFailed(String),

    #[error("could not refresh: {0}")]
    TransientFetchFailed(String),

    /// The backend answered but refused the request.
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Reasons an action is refused before anything is sent.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    CountMismatch { names: usize, keys: usize },
    MissingField(&'static str),
    InvalidDuration(i32),
    IllegalTransition {
        action: &'static str,
        status: CanonicalStatus,
    },
    AlreadyInFlight(String),
    NothingSelected,
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validation::CountMismatch { names, keys } => write!(
                f,
                "line count mismatch: {} names, {} stream keys",
                names, keys
            ),
            Validation::MissingField(field) => write!(f, "missing required field: {}", field),
            Validation::InvalidDuration(minutes) => write!(
                f,
                "invalid duration {} (use minutes, or -1 for unbounded)",
                minutes
            ),
            Validation::IllegalTransition { action, status } => {
                write!(f, "cannot {} a stream that is {}", action, status)
            }
            Validation::AlreadyInFlight(what) => write!(f, "{} is already in progress", what),
            Validation::NothingSelected => write!(f, "select at least one stream"),
        }
    }
}

impl Error {
    pub fn validation(v: Validation) -> Self {
        Self::ValidationFailed(v)
    }

    pub fn acquisition(msg: impl Into<String>) -> Self {
        Self::RemoteAcquisitionFailed(msg.into())
    }

    /// True for the "nothing there yet" outcome of a list endpoint.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Errors that block a user action and are reported to them as-is.
    pub fn is_action_blocking(&self) -> bool {
        matches!(
            self,
            Error::ValidationFailed(_) | Error::RemoteAcquisitionFailed(_)
        )
    }
}

/// Turns a `NotFound` from a list call into an empty list.
pub fn empty_if_not_found<T>(result: Result<Vec<T>>) -> Result<Vec<T>> {
    match result {
        Err(Error::NotFound(_)) => Ok(Vec::new()),
        other => other,
    }
}
