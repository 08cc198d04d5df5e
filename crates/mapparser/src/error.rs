use thiserror::Error;

/// A parse failure. `message` already carries the offending line and a
/// caret marker where position information was available.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ParseError {
    pub row: usize,
    pub col: usize,
    pub message: String,
}

impl ParseError {
    pub(crate) fn plain(message: String) -> ParseError {
        ParseError {
            row: 0,
            col: 0,
            message,
        }
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;
