//! Persistence contracts for webhooks and their execution ledger

use crate::{
    Result, Webhook, WebhookError, WebhookExecution, WebhookExecutionFilter, WebhookFilter,
    WebhookParentInfo, WebhookParentType,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Mutation applied by [`WebhookStore::update_opt_lock`]
pub type WebhookMutation<'a> = &'a (dyn Fn(&mut Webhook) -> Result<()> + Send + Sync);

/// Storage of registered webhooks
#[async_trait]
pub trait WebhookStore: Send + Sync {
    /// Find a webhook by ID
    async fn find(&self, id: i64) -> Result<Webhook>;

    /// Find a webhook by its identifier within a parent
    async fn find_by_identifier(
        &self,
        parent_type: WebhookParentType,
        parent_id: i64,
        identifier: &str,
    ) -> Result<Webhook>;

    /// List the webhooks registered on any of the given parents, ordered by ID
    async fn list(&self, parents: &[WebhookParentInfo], filter: &WebhookFilter)
    -> Result<Vec<Webhook>>;

    /// Persist the webhook if its version still matches the stored one.
    ///
    /// On success the version is incremented and `updated` is refreshed in place.
    /// Fails with [`WebhookError::VersionConflict`] otherwise.
    async fn update(&self, webhook: &mut Webhook) -> Result<()>;

    /// Apply `mutate` with optimistic locking, re-reading the latest row on conflicts.
    async fn update_opt_lock(&self, webhook: &Webhook, mutate: WebhookMutation<'_>) -> Result<Webhook> {
        let mut current = webhook.clone();
        loop {
            let mut dup = current.clone();
            mutate(&mut dup)?;

            match self.update(&mut dup).await {
                Ok(()) => return Ok(dup),
                Err(WebhookError::VersionConflict) => {
                    current = self.find(current.id).await?;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Append-only ledger of delivery attempts
#[async_trait]
pub trait WebhookExecutionStore: Send + Sync {
    /// Find an execution by ID
    async fn find(&self, id: i64) -> Result<WebhookExecution>;

    /// Persist a new execution and assign its ID
    async fn create(&self, execution: &mut WebhookExecution) -> Result<()>;

    /// List executions of a webhook, newest first
    async fn list_for_webhook(
        &self,
        webhook_id: i64,
        filter: &WebhookExecutionFilter,
    ) -> Result<Vec<WebhookExecution>>;

    /// Count all executions of a webhook
    async fn count_for_webhook(&self, webhook_id: i64) -> Result<i64>;

    /// List all executions for a trigger, across webhooks
    async fn list_for_trigger(&self, trigger_id: &str) -> Result<Vec<WebhookExecution>>;

    /// Remove executions created before `older_than`, returning how many were removed
    async fn delete_old(&self, older_than: DateTime<Utc>) -> Result<u64>;
}
