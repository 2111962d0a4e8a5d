pub type BoxError = Box<dyn core::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The index page no longer carries one of the hidden anti-forgery inputs.
    #[error("hidden input {0:?} not found on index page")]
    TokenNotFound(&'static str),
    #[error("network error: {0}")]
    Network(#[source] BoxError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("sink error: {0}")]
    Sink(#[source] BoxError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl Error {
    /// Parse and configuration failures reproduce deterministically, so retrying them is pointless.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TokenNotFound(_) | Self::Network(_))
    }

    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<reqwest::Error> for Error {
    #[inline]
    fn from(e: reqwest::Error) -> Self {
        Self::Network(Box::new(e))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("subject column {field:?} is not an integer: {value:?}")]
    BadInteger { field: &'static str, value: String },
    #[error("transcript has no roll number")]
    MissingRollNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("crawl cancelled")]
pub struct Cancelled;
