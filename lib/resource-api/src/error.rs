use thiserror::Error;

pub type Result<T> = std::result::Result<T, ParseError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid API identifier: {0}")]
    InvalidApi(String),

    #[error("Invalid resource name: {0}")]
    InvalidName(String),
}
