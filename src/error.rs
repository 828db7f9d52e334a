use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitError {
    #[error("Invalid hierarchy configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("Child execution failed: {0}")]
    ChildExecutionFailed(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for MonitError {
    fn from(error: sqlx::Error) -> Self {
        MonitError::PersistenceUnavailable(error.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for MonitError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        MonitError::PersistenceUnavailable(format!("migrations failed: {error}"))
    }
}

pub type Result<T> = std::result::Result<T, MonitError>;
