//! Expansion of a resource into the scopes searched for webhooks

use crate::{Result, SpaceAncestry, WebhookError, WebhookParentInfo, WebhookParentType};
use std::sync::Arc;

/// Resolves which scopes own the webhooks relevant for a resource
#[derive(Clone)]
pub struct ScopeResolver {
    ancestry: Arc<dyn SpaceAncestry>,
}

impl ScopeResolver {
    pub fn new(ancestry: Arc<dyn SpaceAncestry>) -> Self {
        Self { ancestry }
    }

    /// Resolve the ordered list of scopes for a resource.
    ///
    /// A repository always yields itself first. With `include_inherited`, the spaces above
    /// it follow from nearest to farthest. A space yields its ancestry (itself included)
    /// or only itself.
    pub async fn resolve(
        &self,
        resource_id: i64,
        resource_type: WebhookParentType,
        include_inherited: bool,
    ) -> Result<Vec<WebhookParentInfo>> {
        match resource_type {
            WebhookParentType::Repo => {
                let mut parents = vec![WebhookParentInfo::repo(resource_id)];
                if include_inherited {
                    let space_id = self.ancestry.repo_space_id(resource_id).await?;
                    parents.extend(self.space_ancestors(space_id).await?);
                }
                Ok(parents)
            }
            WebhookParentType::Space if include_inherited => {
                self.space_ancestors(resource_id).await
            }
            WebhookParentType::Space => Ok(vec![WebhookParentInfo::space(resource_id)]),
            other => Err(WebhookError::InvalidInput(format!(
                "webhook parent type '{}' is not supported",
                other
            ))),
        }
    }

    async fn space_ancestors(&self, space_id: i64) -> Result<Vec<WebhookParentInfo>> {
        let ids = self.ancestry.ancestor_space_ids(space_id).await?;
        Ok(ids.into_iter().map(WebhookParentInfo::space).collect())
    }
}

impl std::fmt::Debug for ScopeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySpaceTree;

    fn resolver() -> ScopeResolver {
        let tree = MemorySpaceTree::new();
        tree.add_space(1, None);
        tree.add_space(2, Some(1));
        tree.add_repo(7, 2);
        ScopeResolver::new(Arc::new(tree))
    }

    #[tokio::test]
    async fn test_repo_without_inheritance() {
        let scopes = resolver()
            .resolve(7, WebhookParentType::Repo, false)
            .await
            .unwrap();
        assert_eq!(scopes, vec![WebhookParentInfo::repo(7)]);
    }

    #[tokio::test]
    async fn test_repo_with_inheritance() {
        let scopes = resolver()
            .resolve(7, WebhookParentType::Repo, true)
            .await
            .unwrap();
        assert_eq!(
            scopes,
            vec![
                WebhookParentInfo::repo(7),
                WebhookParentInfo::space(2),
                WebhookParentInfo::space(1),
            ]
        );
    }

    #[tokio::test]
    async fn test_space_scopes() {
        let resolver = resolver();

        let own = resolver
            .resolve(2, WebhookParentType::Space, false)
            .await
            .unwrap();
        assert_eq!(own, vec![WebhookParentInfo::space(2)]);

        let inherited = resolver
            .resolve(2, WebhookParentType::Space, true)
            .await
            .unwrap();
        assert_eq!(
            inherited,
            vec![WebhookParentInfo::space(2), WebhookParentInfo::space(1)]
        );
    }

    #[tokio::test]
    async fn test_unsupported_type() {
        let result = resolver()
            .resolve(3, WebhookParentType::Registry, true)
            .await;
        assert!(matches!(result, Err(WebhookError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_unknown_repo() {
        let result = resolver().resolve(99, WebhookParentType::Repo, true).await;
        assert!(matches!(result, Err(WebhookError::NotFound(_))));
    }
}
