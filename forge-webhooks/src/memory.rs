//! In-memory stores

use crate::{
    Result, SpaceAncestry, Webhook, WebhookError, WebhookExecution, WebhookExecutionFilter,
    WebhookExecutionStore, WebhookFilter, WebhookParentInfo, WebhookParentType, WebhookStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Apply 1-based paging; a size of 0 disables paging
fn paginate<T>(items: Vec<T>, page: usize, size: usize) -> Vec<T> {
    if size == 0 {
        return items;
    }
    let skip = page.saturating_sub(1).saturating_mul(size);
    items.into_iter().skip(skip).take(size).collect()
}

/// Webhook store backed by a map
#[derive(Debug, Clone, Default)]
pub struct MemoryWebhookStore {
    webhooks: Arc<RwLock<BTreeMap<i64, Webhook>>>,
    next_id: Arc<AtomicI64>,
}

impl MemoryWebhookStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a webhook, assigning the next ID
    pub fn insert(&self, mut webhook: Webhook) -> Webhook {
        webhook.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.webhooks.write().insert(webhook.id, webhook.clone());
        webhook
    }

    /// Number of registered webhooks
    pub fn count(&self) -> usize {
        self.webhooks.read().len()
    }
}

#[async_trait]
impl WebhookStore for MemoryWebhookStore {
    async fn find(&self, id: i64) -> Result<Webhook> {
        self.webhooks
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| WebhookError::NotFound(format!("webhook {}", id)))
    }

    async fn find_by_identifier(
        &self,
        parent_type: WebhookParentType,
        parent_id: i64,
        identifier: &str,
    ) -> Result<Webhook> {
        self.webhooks
            .read()
            .values()
            .find(|hook| {
                hook.parent_type == parent_type
                    && hook.parent_id == parent_id
                    && hook.identifier.eq_ignore_ascii_case(identifier)
            })
            .cloned()
            .ok_or_else(|| {
                WebhookError::NotFound(format!(
                    "webhook '{}' in {} {}",
                    identifier, parent_type, parent_id
                ))
            })
    }

    async fn list(
        &self,
        parents: &[WebhookParentInfo],
        filter: &WebhookFilter,
    ) -> Result<Vec<Webhook>> {
        let query = filter.query.as_ref().map(|q| q.to_lowercase());
        let webhooks: Vec<Webhook> = self
            .webhooks
            .read()
            .values()
            .filter(|hook| {
                parents
                    .iter()
                    .any(|p| p.parent_type == hook.parent_type && p.id == hook.parent_id)
            })
            .filter(|hook| !(filter.skip_internal && hook.internal))
            .filter(|hook| match &query {
                Some(q) => hook.identifier.to_lowercase().contains(q.as_str()),
                None => true,
            })
            .cloned()
            .collect();

        Ok(paginate(webhooks, filter.page, filter.size))
    }

    async fn update(&self, webhook: &mut Webhook) -> Result<()> {
        let mut webhooks = self.webhooks.write();
        let stored = webhooks
            .get_mut(&webhook.id)
            .ok_or_else(|| WebhookError::NotFound(format!("webhook {}", webhook.id)))?;

        if stored.version != webhook.version {
            return Err(WebhookError::VersionConflict);
        }

        webhook.version += 1;
        webhook.updated = Utc::now().timestamp_millis();
        *stored = webhook.clone();
        Ok(())
    }
}

/// Execution ledger backed by a map
#[derive(Debug, Clone, Default)]
pub struct MemoryExecutionStore {
    executions: Arc<RwLock<BTreeMap<i64, WebhookExecution>>>,
    next_id: Arc<AtomicI64>,
}

impl MemoryExecutionStore {
    /// Create a new empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// All executions in creation order
    pub fn all(&self) -> Vec<WebhookExecution> {
        self.executions.read().values().cloned().collect()
    }

    /// Number of stored executions
    pub fn count(&self) -> usize {
        self.executions.read().len()
    }
}

#[async_trait]
impl WebhookExecutionStore for MemoryExecutionStore {
    async fn find(&self, id: i64) -> Result<WebhookExecution> {
        self.executions
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| WebhookError::NotFound(format!("webhook execution {}", id)))
    }

    async fn create(&self, execution: &mut WebhookExecution) -> Result<()> {
        execution.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.executions
            .write()
            .insert(execution.id, execution.clone());
        Ok(())
    }

    async fn list_for_webhook(
        &self,
        webhook_id: i64,
        filter: &WebhookExecutionFilter,
    ) -> Result<Vec<WebhookExecution>> {
        let executions: Vec<WebhookExecution> = self
            .executions
            .read()
            .values()
            .rev()
            .filter(|e| e.webhook_id == webhook_id)
            .cloned()
            .collect();

        Ok(paginate(executions, filter.page, filter.size))
    }

    async fn count_for_webhook(&self, webhook_id: i64) -> Result<i64> {
        let count = self
            .executions
            .read()
            .values()
            .filter(|e| e.webhook_id == webhook_id)
            .count();
        Ok(count as i64)
    }

    async fn list_for_trigger(&self, trigger_id: &str) -> Result<Vec<WebhookExecution>> {
        Ok(self
            .executions
            .read()
            .values()
            .filter(|e| e.trigger_id == trigger_id)
            .cloned()
            .collect())
    }

    async fn delete_old(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let cutoff = older_than.timestamp_millis();
        let mut executions = self.executions.write();
        let before = executions.len();
        executions.retain(|_, e| e.created >= cutoff);
        Ok((before - executions.len()) as u64)
    }
}

/// Space tree for ancestry lookups
#[derive(Debug, Clone, Default)]
pub struct MemorySpaceTree {
    space_parents: Arc<RwLock<HashMap<i64, Option<i64>>>>,
    repo_spaces: Arc<RwLock<HashMap<i64, i64>>>,
}

impl MemorySpaceTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a space below `parent` (`None` for a root space)
    pub fn add_space(&self, space_id: i64, parent: Option<i64>) {
        self.space_parents.write().insert(space_id, parent);
    }

    /// Place a repository in a space
    pub fn add_repo(&self, repo_id: i64, space_id: i64) {
        self.repo_spaces.write().insert(repo_id, space_id);
    }
}

#[async_trait]
impl SpaceAncestry for MemorySpaceTree {
    async fn repo_space_id(&self, repo_id: i64) -> Result<i64> {
        self.repo_spaces
            .read()
            .get(&repo_id)
            .copied()
            .ok_or_else(|| WebhookError::NotFound(format!("repository {}", repo_id)))
    }

    async fn ancestor_space_ids(&self, space_id: i64) -> Result<Vec<i64>> {
        let spaces = self.space_parents.read();
        let mut ids = Vec::new();
        let mut current = Some(space_id);

        while let Some(id) = current {
            if ids.contains(&id) {
                return Err(WebhookError::Internal(format!(
                    "space hierarchy of {} contains a cycle",
                    space_id
                )));
            }
            let parent = spaces
                .get(&id)
                .ok_or_else(|| WebhookError::NotFound(format!("space {}", id)))?;
            ids.push(id);
            current = *parent;
        }

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{WebhookExecutionResult, WebhookTrigger};

    fn execution(webhook_id: i64, trigger_id: &str, created: i64) -> WebhookExecution {
        let mut execution =
            WebhookExecution::new(webhook_id, trigger_id, WebhookTrigger::BranchCreated, None);
        execution.created = created;
        execution
    }

    #[tokio::test]
    async fn test_list_by_parents() {
        let store = MemoryWebhookStore::new();
        store.insert(Webhook::new(WebhookParentType::Repo, 1, "a", "https://a"));
        store.insert(Webhook::new(WebhookParentType::Space, 1, "b", "https://b"));
        store.insert(Webhook::new(WebhookParentType::Repo, 2, "c", "https://c"));

        let hooks = store
            .list(&[WebhookParentInfo::repo(1)], &WebhookFilter::default())
            .await
            .unwrap();
        assert_eq!(hooks.len(), 1);
        assert_eq!(hooks[0].identifier, "a");

        let hooks = store
            .list(
                &[WebhookParentInfo::repo(1), WebhookParentInfo::space(1)],
                &WebhookFilter::default(),
            )
            .await
            .unwrap();
        let identifiers: Vec<_> = hooks.iter().map(|h| h.identifier.as_str()).collect();
        assert_eq!(identifiers, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_list_filter_and_paging() {
        let store = MemoryWebhookStore::new();
        for name in ["Deploy", "deploy-prod", "notify"] {
            store.insert(Webhook::new(WebhookParentType::Repo, 1, name, "https://x"));
        }
        store.insert(
            Webhook::builder(WebhookParentType::Repo, 1, "deploy-internal", "https://x")
                .internal(true)
                .build(),
        );

        let filter = WebhookFilter {
            query: Some("DEPLOY".to_string()),
            skip_internal: true,
            ..Default::default()
        };
        let hooks = store.list(&[WebhookParentInfo::repo(1)], &filter).await.unwrap();
        assert_eq!(hooks.len(), 2);

        let filter = WebhookFilter {
            page: 2,
            size: 3,
            ..Default::default()
        };
        let hooks = store.list(&[WebhookParentInfo::repo(1)], &filter).await.unwrap();
        assert_eq!(hooks.len(), 1);
        assert_eq!(hooks[0].identifier, "deploy-internal");
    }

    #[tokio::test]
    async fn test_find_by_identifier() {
        let store = MemoryWebhookStore::new();
        let hook = store.insert(Webhook::new(WebhookParentType::Space, 4, "Notify", "https://x"));

        let found = store
            .find_by_identifier(WebhookParentType::Space, 4, "notify")
            .await
            .unwrap();
        assert_eq!(found.id, hook.id);

        let missing = store
            .find_by_identifier(WebhookParentType::Repo, 4, "notify")
            .await;
        assert!(matches!(missing, Err(WebhookError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_version_check() {
        let store = MemoryWebhookStore::new();
        let hook = store.insert(Webhook::new(WebhookParentType::Repo, 1, "a", "https://a"));

        let mut first = hook.clone();
        first.latest_execution_result = Some(WebhookExecutionResult::Success);
        store.update(&mut first).await.unwrap();
        assert_eq!(first.version, 1);

        let mut stale = hook.clone();
        let result = store.update(&mut stale).await;
        assert!(matches!(result, Err(WebhookError::VersionConflict)));
        assert_eq!(stale.version, 0);
    }

    #[tokio::test]
    async fn test_execution_ledger_queries() {
        let store = MemoryExecutionStore::new();
        store.create(&mut execution(1, "event-a", 10)).await.unwrap();
        store.create(&mut execution(2, "event-a", 20)).await.unwrap();
        store.create(&mut execution(1, "event-b", 30)).await.unwrap();

        assert_eq!(store.list_for_trigger("event-a").await.unwrap().len(), 2);
        assert_eq!(store.count_for_webhook(1).await.unwrap(), 2);

        let newest_first = store
            .list_for_webhook(1, &WebhookExecutionFilter::default())
            .await
            .unwrap();
        assert_eq!(newest_first[0].trigger_id, "event-b");
        assert_eq!(newest_first[1].trigger_id, "event-a");

        let paged = store
            .list_for_webhook(1, &WebhookExecutionFilter { page: 2, size: 1 })
            .await
            .unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].trigger_id, "event-a");
    }

    #[tokio::test]
    async fn test_delete_old() {
        let store = MemoryExecutionStore::new();
        store.create(&mut execution(1, "event-a", 1_000)).await.unwrap();
        store.create(&mut execution(1, "event-b", 5_000)).await.unwrap();

        let cutoff = DateTime::<Utc>::from_timestamp_millis(2_000).unwrap();
        assert_eq!(store.delete_old(cutoff).await.unwrap(), 1);
        assert_eq!(store.count(), 1);
        assert_eq!(store.all()[0].trigger_id, "event-b");
    }

    #[tokio::test]
    async fn test_space_ancestry() {
        let tree = MemorySpaceTree::new();
        tree.add_space(1, None);
        tree.add_space(2, Some(1));
        tree.add_space(3, Some(2));
        tree.add_repo(10, 3);

        assert_eq!(tree.repo_space_id(10).await.unwrap(), 3);
        assert_eq!(tree.ancestor_space_ids(3).await.unwrap(), vec![3, 2, 1]);
        assert_eq!(tree.ancestor_space_ids(1).await.unwrap(), vec![1]);
        assert!(tree.ancestor_space_ids(99).await.is_err());
    }
}
