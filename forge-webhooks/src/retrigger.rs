//! Manual replay of past executions

use crate::{
    DeliveryExecutor, RequestBody, Result, TriggerResult, WebhookError, WebhookExecutionStore,
    WebhookStore,
};
use std::sync::Arc;
use tracing::info;

/// Replays the exact request of a stored execution under its original trigger.
///
/// Replays bypass the dispatch dedup; the source execution is left untouched.
pub struct ExecutionRetrigger {
    executor: Arc<DeliveryExecutor>,
    webhook_store: Arc<dyn WebhookStore>,
    execution_store: Arc<dyn WebhookExecutionStore>,
}

impl ExecutionRetrigger {
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

    /// Retrigger the execution with the given ID.
    ///
    /// Fails with [`WebhookError::NotRetriggerable`] without creating a new execution if the
    /// source never captured its request body.
    pub async fn retrigger(&self, execution_id: i64) -> Result<TriggerResult> {
        let source = self.execution_store.find(execution_id).await?;
        if !source.retriggerable {
            return Err(WebhookError::NotRetriggerable);
        }

        let webhook = self.webhook_store.find(source.webhook_id).await?;

        info!(
            execution_id,
            webhook_id = webhook.id,
            trigger_id = %source.trigger_id,
            "retriggering webhook execution"
        );

        let result = self
            .executor
            .execute(
                &webhook,
                &source.trigger_id,
                source.trigger_type,
                RequestBody::Raw(source.request.body.as_bytes()),
                Some(source.id),
            )
            .await;

        Ok(result)
    }
}

impl std::fmt::Debug for ExecutionRetrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionRetrigger").finish_non_exhaustive()
    }
}
