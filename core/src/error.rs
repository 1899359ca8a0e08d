/// Query syntax problems, reported before any search runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("query cannot be empty")]
    Empty,

    #[error("unmatched quotes in query")]
    UnmatchedQuote,

    #[error("unknown filter: {0}")]
    UnknownFilter(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamError {
    #[error("k1 must be within [0, 3], got {0}")]
    K1OutOfRange(f64),

    #[error("b must be within [0, 1], got {0}")]
    BOutOfRange(f64),
}
