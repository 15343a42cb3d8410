//! Webhook service wiring scope resolution, dispatch, delivery and replay

use crate::{
    DeliveryExecutor, Encrypter, ExecutionRetrigger, NoopEncrypter, Result, ScopeResolver,
    SpaceAncestry, TriggerDispatcher, TriggerResult, UrlProvider, Webhook, WebhookConfig,
    WebhookError, WebhookEvent, WebhookExecution, WebhookExecutionFilter, WebhookExecutionStore,
    WebhookParentType, WebhookStore, WebhookUrlProvider,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Entry point for delivering events to webhooks
pub struct WebhookService {
    scopes: ScopeResolver,
    dispatcher: TriggerDispatcher,
    retrigger: ExecutionRetrigger,
    webhook_store: Arc<dyn WebhookStore>,
    execution_store: Arc<dyn WebhookExecutionStore>,
}

impl WebhookService {
    pub fn builder() -> WebhookServiceBuilder {
        WebhookServiceBuilder::default()
    }

    /// Deliver an event to every webhook in the resource's scopes.
    ///
    /// `Ok` acknowledges the event. An error asks the event bus to redeliver it, either because
    /// some webhook ended retriable or because the webhooks couldn't be determined.
    pub async fn handle_event<P>(&self, event: &WebhookEvent<P>) -> Result<Vec<TriggerResult>>
    where
        P: Serialize + Send + Sync,
    {
        debug!(
            event_id = %event.id,
            resource_id = event.resource_id,
            resource_type = %event.resource_type,
            trigger = %event.trigger,
            "handling webhook event"
        );

        let parents = self
            .scopes
            .resolve(event.resource_id, event.resource_type, true)
            .await?;

        self.dispatcher
            .trigger_for_event(&event.id, &parents, event.trigger, &event.payload)
            .await
    }

    pub fn scopes(&self) -> &ScopeResolver {
        &self.scopes
    }

    pub fn dispatcher(&self) -> &TriggerDispatcher {
        &self.dispatcher
    }

    /// Replay a past execution
    pub async fn retrigger_execution(&self, execution_id: i64) -> Result<TriggerResult> {
        self.retrigger.retrigger(execution_id).await
    }

    /// Find a webhook by its identifier within a parent
    pub async fn find_webhook_by_identifier(
        &self,
        parent_type: WebhookParentType,
        parent_id: i64,
        identifier: &str,
    ) -> Result<Webhook> {
        if identifier.is_empty() {
            return Err(WebhookError::InvalidInput(
                "webhook identifier must not be empty".to_string(),
            ));
        }
        self.webhook_store
            .find_by_identifier(parent_type, parent_id, identifier)
            .await
    }

    /// Find an execution of a webhook
    pub async fn find_execution(&self, webhook_id: i64, execution_id: i64) -> Result<WebhookExecution> {
        let execution = self.execution_store.find(execution_id).await?;
        if execution.webhook_id != webhook_id {
            return Err(WebhookError::NotFound(format!(
                "Execution {} of webhook {}",
                execution_id, webhook_id
            )));
        }
        Ok(execution)
    }

    /// Page through a webhook's executions, newest first, along with the total count
    pub async fn list_executions(
        &self,
        webhook_id: i64,
        filter: &WebhookExecutionFilter,
    ) -> Result<(Vec<WebhookExecution>, i64)> {
        let executions = self
            .execution_store
            .list_for_webhook(webhook_id, filter)
            .await?;
        let count = self.execution_store.count_for_webhook(webhook_id).await?;
        Ok((executions, count))
    }

    /// Delete executions created before `older_than`
    pub async fn purge_executions(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let deleted = self.execution_store.delete_old(older_than).await?;
        info!(deleted, %older_than, "purged old webhook executions");
        Ok(deleted)
    }
}

impl std::fmt::Debug for WebhookService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookService")
            .field("scopes", &self.scopes)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

/// Builder for WebhookService
#[derive(Default)]
pub struct WebhookServiceBuilder {
    config: Option<WebhookConfig>,
    webhook_store: Option<Arc<dyn WebhookStore>>,
    execution_store: Option<Arc<dyn WebhookExecutionStore>>,
    url_provider: Option<Arc<dyn UrlProvider>>,
    encrypter: Option<Arc<dyn Encrypter>>,
    ancestry: Option<Arc<dyn SpaceAncestry>>,
}

impl WebhookServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration; defaults to [`WebhookConfig::default`]
    pub fn config(mut self, config: WebhookConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn webhook_store(mut self, store: Arc<dyn WebhookStore>) -> Self {
        self.webhook_store = Some(store);
        self
    }

    pub fn execution_store(mut self, store: Arc<dyn WebhookExecutionStore>) -> Self {
        self.execution_store = Some(store);
        self
    }

    /// Set the URL provider; defaults to the URL stored on the webhook
    pub fn url_provider(mut self, provider: Arc<dyn UrlProvider>) -> Self {
        self.url_provider = Some(provider);
        self
    }

    /// Set the secret decrypter; defaults to plaintext secrets
    pub fn encrypter(mut self, encrypter: Arc<dyn Encrypter>) -> Self {
        self.encrypter = Some(encrypter);
        self
    }

    pub fn ancestry(mut self, ancestry: Arc<dyn SpaceAncestry>) -> Self {
        self.ancestry = Some(ancestry);
        self
    }

    /// Build the service
    pub fn build(self) -> Result<WebhookService> {
        let webhook_store = self
            .webhook_store
            .ok_or_else(|| WebhookError::ConfigError("webhook store is required".to_string()))?;
        let execution_store = self
            .execution_store
            .ok_or_else(|| WebhookError::ConfigError("execution store is required".to_string()))?;
        let ancestry = self
            .ancestry
            .ok_or_else(|| WebhookError::ConfigError("space ancestry is required".to_string()))?;

        let executor = Arc::new(DeliveryExecutor::new(
            self.config.unwrap_or_default(),
            webhook_store.clone(),
            execution_store.clone(),
            self.url_provider.unwrap_or_else(|| Arc::new(WebhookUrlProvider)),
            self.encrypter.unwrap_or_else(|| Arc::new(NoopEncrypter)),
        )?);

        Ok(WebhookService {
            scopes: ScopeResolver::new(ancestry),
            dispatcher: TriggerDispatcher::new(
                executor.clone(),
                webhook_store.clone(),
                execution_store.clone(),
            ),
            retrigger: ExecutionRetrigger::new(executor, webhook_store.clone(), execution_store.clone()),
            webhook_store,
            execution_store,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryExecutionStore, MemorySpaceTree, MemoryWebhookStore};

    fn service() -> WebhookService {
        WebhookService::builder()
            .webhook_store(Arc::new(MemoryWebhookStore::new()))
            .execution_store(Arc::new(MemoryExecutionStore::new()))
            .ancestry(Arc::new(MemorySpaceTree::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_stores() {
        let err = WebhookService::builder()
            .execution_store(Arc::new(MemoryExecutionStore::new()))
            .ancestry(Arc::new(MemorySpaceTree::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, WebhookError::ConfigError(_)));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let config = WebhookConfig::builder().header_identity("").build();
        let result = WebhookService::builder()
            .config(config)
            .webhook_store(Arc::new(MemoryWebhookStore::new()))
            .execution_store(Arc::new(MemoryExecutionStore::new()))
            .ancestry(Arc::new(MemorySpaceTree::new()))
            .build();
        assert!(matches!(result, Err(WebhookError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_event_without_webhooks_is_acknowledged() {
        let tree = Arc::new(MemorySpaceTree::new());
        tree.add_space(1, None);
        tree.add_repo(10, 1);

        let service = WebhookService::builder()
            .webhook_store(Arc::new(MemoryWebhookStore::new()))
            .execution_store(Arc::new(MemoryExecutionStore::new()))
            .ancestry(tree)
            .build()
            .unwrap();

        let event = WebhookEvent::for_repo(
            "evt-1",
            10,
            crate::WebhookTrigger::BranchCreated,
            serde_json::json!({}),
        );
        let results = service.handle_event(&event).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_find_webhook_by_identifier_rejects_empty() {
        let err = service()
            .find_webhook_by_identifier(WebhookParentType::Repo, 1, "")
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_retrigger_unknown_execution() {
        let err = service().retrigger_execution(42).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_purge_on_empty_store() {
        assert_eq!(service().purge_executions(Utc::now()).await.unwrap(), 0);
    }
}
