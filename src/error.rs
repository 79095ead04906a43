use thiserror::Error;

/// Errors reported while compiling a query into a [`crate::Matcher`].
///
/// Evaluation never fails: an ill-typed or missing record value simply does
/// not match.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid type => {0}")]
    InvalidType(String),
    #[error("invalid argument => {0}")]
    InvalidArgument(String),
    #[error("unsupported operation => {0}")]
    UnsupportedOperation(String),
    #[error("failed to parse => {0}")]
    Parse(String),
}
