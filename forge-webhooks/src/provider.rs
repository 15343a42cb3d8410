//! Collaborators the engine consumes but does not own

use crate::{Result, Webhook, WebhookError};
use async_trait::async_trait;

/// Resolves the URL a webhook is delivered to
#[async_trait]
pub trait UrlProvider: Send + Sync {
    async fn webhook_url(&self, webhook: &Webhook) -> Result<String>;
}

/// Delivers to the URL stored on the webhook
#[derive(Debug, Clone, Copy, Default)]
pub struct WebhookUrlProvider;

#[async_trait]
impl UrlProvider for WebhookUrlProvider {
    async fn webhook_url(&self, webhook: &Webhook) -> Result<String> {
        Ok(webhook.url.clone())
    }
}

/// Decrypts stored webhook secrets
pub trait Encrypter: Send + Sync {
    fn decrypt(&self, ciphertext: &[u8]) -> Result<String>;
}

/// Treats stored secrets as plaintext
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEncrypter;

impl Encrypter for NoopEncrypter {
    fn decrypt(&self, ciphertext: &[u8]) -> Result<String> {
        String::from_utf8(ciphertext.to_vec())
            .map_err(|e| WebhookError::Secret(format!("secret is not valid utf-8: {}", e)))
    }
}

/// Space hierarchy lookups
#[async_trait]
pub trait SpaceAncestry: Send + Sync {
    /// ID of the space a repository lives in
    async fn repo_space_id(&self, repo_id: i64) -> Result<i64>;

    /// IDs from `space_id` up to the root space, nearest first, including `space_id`
    async fn ancestor_space_ids(&self, space_id: i64) -> Result<Vec<i64>>;
}
