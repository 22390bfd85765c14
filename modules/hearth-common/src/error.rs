use thiserror::Error;

#[derive(Error, Debug)]
pub enum HearthError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Parent entity not found: {0}")]
    ParentNotFound(String),

    #[error("Name resolution error: {0}")]
    Resolution(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
