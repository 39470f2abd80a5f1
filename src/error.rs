use std::{sync::Arc, time::Duration};

use crate::model::RequestField;

/// Represents a result type for operations of the targeting engine.
///
/// This `Result` type is a standard Rust `Result` type where the error variant is defined by the
/// crate-specific [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur in the targeting engine.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// A delivery request is missing a required field (or the field is blank after trimming).
    #[error("missing required request field `{0}`")]
    MissingField(RequestField),

    /// The campaign source failed to return campaigns or targeting rules.
    #[error("campaign source error: {0}")]
    // Source errors are not clonable in general, so we're wrapping them in an Arc.
    Source(#[source] Arc<dyn std::error::Error + Send + Sync>),

    /// The campaign source did not answer within the configured fetch timeout.
    #[error("campaign source did not respond within {0:?}")]
    SourceTimeout(Duration),

    /// Indicates that the poller thread panicked. This should normally never happen.
    #[error("poller thread panicked")]
    PollerThreadPanicked,

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),
}

impl Error {
    /// Wrap an error produced by a [`CampaignSource`](crate::CampaignSource) implementation.
    pub fn from_source(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Error {
        Error::Source(Arc::from(err.into()))
    }

    /// Returns `true` if the error was caused by the caller's request rather than by the engine or
    /// its source. Client errors should be reported back and never retried.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::MissingField(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}
