//! Fan-out of one trigger to every webhook registered in its scopes

use crate::{
    DeliveryExecutor, JsonPayload, RequestBody, Result, Webhook, WebhookError, WebhookExecution,
    WebhookExecutionResult, WebhookExecutionStore, WebhookFilter, WebhookParentInfo,
    WebhookStore, WebhookTrigger,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Why a webhook was not executed for a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The webhook is disabled
    Disabled,

    /// A previous execution for the same trigger already succeeded or failed fatally
    AlreadyExecuted,

    /// The webhook is not registered for the trigger type
    TriggerNotRegistered,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::Disabled => "webhook is disabled",
            Self::AlreadyExecuted => "webhook was already executed for this trigger",
            Self::TriggerNotRegistered => "webhook is not registered for this trigger",
        };
        f.write_str(reason)
    }
}

/// Outcome of one webhook for one trigger
#[derive(Debug)]
pub struct TriggerResult {
    pub trigger_id: String,
    pub trigger_type: WebhookTrigger,
    pub webhook: Webhook,

    /// The persisted execution; `None` when skipped
    pub execution: Option<WebhookExecution>,

    /// Set when skipped
    pub skip_reason: Option<SkipReason>,

    /// Delivery error, mirrored in the execution record
    pub error: Option<WebhookError>,
}

impl TriggerResult {
    pub(crate) fn executed(
        trigger_id: &str,
        trigger_type: WebhookTrigger,
        webhook: Webhook,
        execution: WebhookExecution,
        error: Option<WebhookError>,
    ) -> Self {
        Self {
            trigger_id: trigger_id.to_string(),
            trigger_type,
            webhook,
            execution: Some(execution),
            skip_reason: None,
            error,
        }
    }

    fn skipped(
        trigger_id: &str,
        trigger_type: WebhookTrigger,
        webhook: Webhook,
        reason: SkipReason,
    ) -> Self {
        Self {
            trigger_id: trigger_id.to_string(),
            trigger_type,
            webhook,
            execution: None,
            skip_reason: Some(reason),
            error: None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.execution.is_none()
    }

    /// Result of the execution, if one ran
    pub fn result(&self) -> Option<WebhookExecutionResult> {
        self.execution.as_ref().map(|e| e.result)
    }

    /// Whether redelivering the trigger would attempt this webhook again
    pub fn is_retriable(&self) -> bool {
        self.result() == Some(WebhookExecutionResult::RetriableError)
    }
}

/// Trigger identity of an event; stable across redeliveries of the same event
pub fn trigger_id_for_event(event_id: &str) -> String {
    format!("event-{}", event_id)
}

/// Dispatches triggers to webhooks, skipping those already terminal for the trigger
pub struct TriggerDispatcher {
    executor: Arc<DeliveryExecutor>,
    webhook_store: Arc<dyn WebhookStore>,
    execution_store: Arc<dyn WebhookExecutionStore>,
}

impl TriggerDispatcher {
    pub fn new(
        executor: Arc<DeliveryExecutor>,
        webhook_store: Arc<dyn WebhookStore>,
        execution_store: Arc<dyn WebhookExecutionStore>,
    ) -> Self {
        Self {
            executor,
            webhook_store,
            execution_store,
        }
    }

    /// Dispatch an event and decide whether the event bus should redeliver it.
    ///
    /// Returns [`WebhookError::RetriableExecutions`] if any execution ended with a retriable
    /// error. Failures are logged once for the whole event.
    pub async fn trigger_for_event(
        &self,
        event_id: &str,
        parents: &[WebhookParentInfo],
        trigger_type: WebhookTrigger,
        body: &dyn JsonPayload,
    ) -> Result<Vec<TriggerResult>> {
        let trigger_id = trigger_id_for_event(event_id);
        let results = self
            .trigger_webhooks_for(parents, &trigger_id, trigger_type, body)
            .await?;

        let failed: Vec<i64> = results
            .iter()
            .filter(|r| r.is_retriable())
            .map(|r| r.webhook.id)
            .collect();
        if failed.is_empty() {
            return Ok(results);
        }

        warn!(
            trigger_id = %trigger_id,
            trigger_type = %trigger_type,
            "webhook executions for trigger ended with retriable errors, webhooks: {:?}",
            failed
        );
        Err(WebhookError::RetriableExecutions { trigger_id, failed })
    }

    /// Dispatch to all webhooks registered on any of `parents`
    pub async fn trigger_webhooks_for(
        &self,
        parents: &[WebhookParentInfo],
        trigger_id: &str,
        trigger_type: WebhookTrigger,
        body: &dyn JsonPayload,
    ) -> Result<Vec<TriggerResult>> {
        let webhooks = self
            .webhook_store
            .list(parents, &WebhookFilter::default())
            .await?;

        self.trigger_webhooks(webhooks, trigger_id, trigger_type, body)
            .await
    }

    /// Dispatch to the given webhooks, one after the other in list order
    pub async fn trigger_webhooks(
        &self,
        webhooks: Vec<Webhook>,
        trigger_id: &str,
        trigger_type: WebhookTrigger,
        body: &dyn JsonPayload,
    ) -> Result<Vec<TriggerResult>> {
        if webhooks.is_empty() {
            return Ok(Vec::new());
        }

        let executed = self.terminal_webhooks(trigger_id).await?;

        let mut results = Vec::with_capacity(webhooks.len());
        for webhook in webhooks {
            let skip = if !webhook.enabled {
                Some(SkipReason::Disabled)
            } else if executed.contains(&webhook.id) {
                Some(SkipReason::AlreadyExecuted)
            } else if !webhook.is_registered_for(trigger_type) {
                Some(SkipReason::TriggerNotRegistered)
            } else {
                None
            };

            if let Some(reason) = skip {
                debug!(webhook_id = webhook.id, trigger_id, %reason, "skipping webhook");
                results.push(TriggerResult::skipped(trigger_id, trigger_type, webhook, reason));
                continue;
            }

            let result = self
                .executor
                .execute(&webhook, trigger_id, trigger_type, RequestBody::Payload(body), None)
                .await;
            results.push(result);
        }

        Ok(results)
    }

    /// IDs of webhooks that reached a terminal result for the trigger
    async fn terminal_webhooks(&self, trigger_id: &str) -> Result<HashSet<i64>> {
        let executions = match self.execution_store.list_for_trigger(trigger_id).await {
            Ok(executions) => executions,
            Err(err) if err.is_not_found() => Vec::new(),
            Err(err) => {
                return Err(WebhookError::Store(format!(
                    "failed to get executions for trigger '{}': {}",
                    trigger_id, err
                )));
            }
        };

        Ok(executions
            .into_iter()
            .filter(|e| e.result.is_terminal())
            .map(|e| e.webhook_id)
            .collect())
    }
}

impl std::fmt::Debug for TriggerDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerDispatcher")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}
