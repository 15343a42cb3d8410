//! Error types for webhook operations

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while resolving, delivering or replaying webhooks
#[derive(Error, Debug)]
pub enum WebhookError {
    /// Caller supplied an invalid argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Requested resource does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Optimistic lock failed because the stored version moved on
    #[error("Version conflict: the resource was modified concurrently")]
    VersionConflict,

    /// The execution never captured a request body
    #[error("webhook execution is incomplete and can't be retriggered")]
    NotRetriggerable,

    /// Persistence layer failure
    #[error("Store error: {0}")]
    Store(String),

    /// Secret could not be decrypted or used for signing
    #[error("Secret error: {0}")]
    Secret(String),

    /// The delivery URL could not be determined
    #[error("Webhook url is not resolvable: {0}")]
    UrlResolution(String),

    /// Payload serialization failed
    #[error("Payload error: {0}")]
    PayloadError(String),

    /// The request could not be built
    #[error("Failed to create request: {0}")]
    RequestBuild(String),

    /// Delivery did not get a response within the time limit
    #[error("request exceeded time limit of {0:?}")]
    Timeout(Duration),

    /// DNS lookup for the target host failed
    #[error("Failed to resolve host name '{0}'")]
    HostNotFound(String),

    /// Target address is forbidden by the network policy
    #[error("Destination not allowed: {0}")]
    DestinationBlocked(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Remote server answered with an unsuccessful status
    #[error("Unsuccessful response ({status}): {message}")]
    Response { status: u16, message: String },

    /// The response could not be read
    #[error("Failed to read response: {0}")]
    ResponseRead(String),

    /// At least one webhook ended retriable; the event has to be redelivered
    #[error("webhook executions for trigger '{trigger_id}' ended with retriable errors: {failed:?}")]
    RetriableExecutions { trigger_id: String, failed: Vec<i64> },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WebhookError {
    /// Check if this error reports a missing resource
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<serde_json::Error> for WebhookError {
    fn from(err: serde_json::Error) -> Self {
        WebhookError::PayloadError(err.to_string())
    }
}
