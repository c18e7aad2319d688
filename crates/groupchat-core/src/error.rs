use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),
}
