use thiserror::Error;

use shared_models::error::AppError;

#[derive(Error, Debug)]
pub enum ReminderError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),

    #[error("Dispatch failed: {0}")]
    Dispatch(String),
}

impl ReminderError {
    pub fn validation(message: impl Into<String>) -> Self {
        ReminderError::Validation(message.into())
    }
}

impl From<ReminderError> for AppError {
    fn from(error: ReminderError) -> Self {
        match error {
            ReminderError::Validation(msg) => AppError::ValidationError(msg),
            ReminderError::NotFound(msg) => AppError::NotFound(msg),
            ReminderError::Database(e) => AppError::Database(e.to_string()),
            ReminderError::Dispatch(msg) => AppError::ExternalService(msg),
        }
    }
}
