use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CoreError {
    /// Rating text outside `again|hard|good|easy`.
    #[error("invalid rating: {0:?}")]
    InvalidRating(String),
    /// Stored scheduling state breaks an invariant; points at bad upstream data.
    #[error("invalid scheduling state: {0}")]
    InvalidState(&'static str),
    #[error("not found: {0}")]
    NotFound(&'static str),
    #[error("invalid input: {0}")]
    Invalid(&'static str),
    #[error("conflict: {0}")]
    Conflict(&'static str),
    #[error("storage error: {0}")]
    Storage(&'static str),
}
