//! Webhook execution records

use crate::WebhookTrigger;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message stored until the delivery overwrites it
pub(crate) const UNKNOWN_ERROR: &str = "An unknown error occurred";

/// Classification of a delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookExecutionResult {
    /// Target accepted the delivery
    Success,

    /// Delivery failed; the source event should be redelivered
    RetriableError,

    /// Delivery failed for good; only a manual retrigger runs it again
    FatalError,
}

impl WebhookExecutionResult {
    /// Check if no further automatic delivery happens for the trigger
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::FatalError)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::RetriableError => "retriable_error",
            Self::FatalError => "fatal_error",
        }
    }
}

impl fmt::Display for WebhookExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request as it was sent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookExecutionRequest {
    pub url: String,

    /// Serialized header block
    pub headers: String,

    pub body: String,
}

/// Response as it was received, size-capped
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookExecutionResponse {
    pub status_code: u16,

    /// Status line, e.g. "200 OK"
    pub status: String,

    /// Serialized header block, at most 1024 bytes
    pub headers: String,

    /// At most 1024 bytes
    pub body: String,
}

/// One delivery attempt. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookExecution {
    pub id: i64,

    /// Execution this one re-delivers
    pub retrigger_of: Option<i64>,

    /// Only set once the request body was captured
    pub retriggerable: bool,

    pub webhook_id: i64,
    pub trigger_id: String,
    pub trigger_type: WebhookTrigger,

    /// Epoch millis
    pub created: i64,

    pub result: WebhookExecutionResult,

    /// Human-readable failure reason; empty on success
    pub error: String,

    /// Nanoseconds
    pub duration: i64,

    pub request: WebhookExecutionRequest,
    pub response: WebhookExecutionResponse,
}

impl WebhookExecution {
    /// Create a record that reads as an unknown fatal error until overwritten
    pub fn new(
        webhook_id: i64,
        trigger_id: impl Into<String>,
        trigger_type: WebhookTrigger,
        retrigger_of: Option<i64>,
    ) -> Self {
        Self {
            id: 0,
            retrigger_of,
            retriggerable: false,
            webhook_id,
            trigger_id: trigger_id.into(),
            trigger_type,
            created: 0,
            result: WebhookExecutionResult::FatalError,
            error: UNKNOWN_ERROR.to_string(),
            duration: 0,
            request: WebhookExecutionRequest::default(),
            response: WebhookExecutionResponse::default(),
        }
    }

    /// Record a failure outcome
    pub(crate) fn fail(&mut self, result: WebhookExecutionResult, error: impl Into<String>) {
        self.result = result;
        self.error = error.into();
    }

    /// Record a successful outcome
    pub(crate) fn succeed(&mut self) {
        self.result = WebhookExecutionResult::Success;
        self.error.clear();
    }
}

/// Paging for execution history
#[derive(Debug, Clone, Default)]
pub struct WebhookExecutionFilter {
    /// 1-based page; 0 is treated as 1
    pub page: usize,

    /// Page size; 0 returns everything
    pub size: usize,
}
