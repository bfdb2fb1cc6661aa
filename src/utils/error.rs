// src/utils/error.rs

use serde::{Deserialize, Serialize};
use std::fmt;

pub type RelayResult<T> = Result<T, RelayError>;

/// Main error type for the relay worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayError {
    pub message: String,
    pub status: Option<u16>,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    #[default]
    UnknownError,
    NetworkError,
    ValidationError,
    AuthenticationError,
    ConfigurationError,
    SerializationError,
    DeserializationError,
    NotFoundError,
    StorageError,
    ExternalServiceError,
    InternalServerError,
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RelayError {}

impl RelayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            kind,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    // Convenience constructors for the error shapes this worker raises
    pub fn network_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkError, message).with_status(503)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message).with_status(400)
    }

    pub fn authentication_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthenticationError, message).with_status(401)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFoundError, message).with_status(404)
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DeserializationError, message).with_status(400)
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigurationError, message).with_status(500)
    }

    pub fn storage_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StorageError, message).with_status(500)
    }

    pub fn telegram_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExternalServiceError, message).with_status(502)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalServerError, message).with_status(500)
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::parse_error(format!("JSON parsing error: {}", err))
    }
}

impl From<worker::Error> for RelayError {
    fn from(err: worker::Error) -> Self {
        RelayError::internal_error(format!("Worker error: {:?}", err))
    }
}

impl From<worker::kv::KvError> for RelayError {
    fn from(err: worker::kv::KvError) -> Self {
        RelayError::storage_error(format!("KV error: {:?}", err))
    }
}

impl From<url::ParseError> for RelayError {
    fn from(err: url::ParseError) -> Self {
        RelayError::validation_error(format!("URL parse error: {}", err))
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::network_error(format!("HTTP request failed: {}", err))
    }
}

impl From<RelayError> for worker::Error {
    fn from(err: RelayError) -> Self {
        let message = if let Some(status) = err.status {
            format!(
                "[Status: {}] RelayError (Kind: {:?}): {}",
                status, err.kind, err.message
            )
        } else {
            format!("RelayError (Kind: {:?}): {}", err.kind, err.message)
        };

        worker::Error::RustError(message)
    }
}
