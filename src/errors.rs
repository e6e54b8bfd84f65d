//! Error types for async-tables.
//!
//! Failures reported by the storage client travel through as
//! [`Error::Service`] without inspection or re-classification. The other
//! variants come from this crate itself (bad queries, full batches, lost
//! callbacks).
//!
//! DynamoDB errors are mapped using typed `SdkError` variant matching, no
//! string parsing of debug output.

use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use std::fmt;

/// Status code a storage service uses for a missing table or entity.
pub const STATUS_NOT_FOUND: u16 = 404;

/// Status code a storage service uses when an entity already exists.
pub const STATUS_CONFLICT: u16 = 409;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Reported by the storage client. Never wrapped or reinterpreted.
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("batch already holds the maximum of {max} operations")]
    BatchFull { max: usize },

    /// The client dropped the completion callback without calling it.
    #[error("{operation} completed without invoking its callback")]
    CallbackDropped { operation: &'static str },

    #[error("invalid continuation token: {0}")]
    InvalidContinuationToken(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// The service error behind this failure, if the storage client reported it.
    pub fn service(&self) -> Option<&ServiceError> {
        match self {
            Error::Service(err) => Some(err),
            _ => None,
        }
    }
}

/// An error reported by the storage service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    /// HTTP status, when the failure came from a response.
    pub status_code: Option<u16>,
    /// Service error code such as `ResourceNotFoundException`.
    pub code: Option<String>,
    pub message: String,
}

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Shorthand for a 404 with the given code.
    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(message)
            .with_status(STATUS_NOT_FOUND)
            .with_code(code)
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code == Some(STATUS_NOT_FOUND)
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, self.status_code) {
            (Some(code), Some(status)) => write!(f, "{} ({}): {}", code, status, self.message),
            (Some(code), None) => write!(f, "{}: {}", code, self.message),
            (None, Some(status)) => write!(f, "status {}: {}", status, self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ServiceError {}

// ========== DYNAMODB ERROR MAPPING ==========

/// Map a DynamoDB `SdkError` to a [`ServiceError`].
///
/// Dispatch failures and timeouts carry no status. Service errors keep the
/// HTTP status of the raw response and the error code from
/// `ProvideErrorMetadata`.
pub fn map_sdk_error<E>(err: SdkError<E>, table: &str) -> ServiceError
where
    E: ProvideErrorMetadata + fmt::Debug + fmt::Display,
{
    match &err {
        SdkError::DispatchFailure(dispatch) => {
            let message = if dispatch.is_timeout() {
                "Connection timed out to DynamoDB. Check your network or endpoint."
            } else if dispatch.is_io() {
                "Connection failed to DynamoDB (I/O error). Check if the endpoint is reachable."
            } else {
                "Connection failed to DynamoDB. Check if the endpoint is reachable."
            };
            return ServiceError::new(message).with_code("DispatchFailure");
        }
        SdkError::TimeoutError(_) => {
            return ServiceError::new("Connection timed out to DynamoDB.")
                .with_code("TimeoutError");
        }
        SdkError::ConstructionFailure(inner) => {
            return ServiceError::new(format!("Failed to build request: {:?}", inner))
                .with_code("ConstructionFailure");
        }
        _ => {}
    }

    let status_code = err.raw_response().map(|raw| raw.status().as_u16());

    if let Some(service_err) = err.as_service_error() {
        return ServiceError {
            status_code,
            code: service_err.code().map(str::to_string),
            message: service_message(service_err),
        };
    }

    ServiceError {
        status_code,
        code: None,
        message: format!("Unexpected DynamoDB error on '{}': {:?}", table, err),
    }
}

/// Message as the service reported it.
fn service_message<E>(err: &E) -> String
where
    E: ProvideErrorMetadata + fmt::Display,
{
    err.message()
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string())
}

/// Error code of a DynamoDB service error, if the failure is one.
pub fn sdk_error_code<E>(err: &SdkError<E>) -> Option<&str>
where
    E: ProvideErrorMetadata,
{
    err.as_service_error().and_then(|e| e.code())
}
