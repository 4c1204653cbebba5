use thiserror::Error;

pub type StoreResult<T> = core::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("{0}")]
    Validation(String),
    #[error("Task not found: {0}")]
    TaskNotFound(u64),
    #[error("Category not found: {0}")]
    CategoryNotFound(u64),
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }
}
