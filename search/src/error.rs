use seek_core::QueryError;
use thiserror::Error;

/// Failures an external source may report. All of them drop that source
/// from the blend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("source timed out")]
    Timeout,
    #[error("source returned HTTP {0}")]
    Status(u16),
    #[error("source rate limited")]
    RateLimited,
    #[error("could not decode source response: {0}")]
    Decode(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryError),
    #[error("unknown search source `{0}`")]
    UnknownSource(String),
}
