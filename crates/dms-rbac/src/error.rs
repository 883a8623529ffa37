//! RBAC Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RbacError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid assignment status: {value:?}")]
    InvalidStatus { value: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RbacError {
    pub fn invalid_status(value: impl Into<String>) -> Self {
        Self::InvalidStatus { value: value.into() }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, RbacError>;
