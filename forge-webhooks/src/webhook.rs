//! Registered webhook targets and the scopes that own them

use crate::{WebhookError, WebhookExecutionResult, WebhookTrigger};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of resource owning a webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookParentType {
    /// Repository; scope depth is always 0
    Repo,

    /// Space; scope depth is the depth in the space tree
    Space,

    /// Artifact registry
    Registry,
}

impl WebhookParentType {
    /// Tag used on the wire and in the parent type header
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Repo => "repo",
            Self::Space => "space",
            Self::Registry => "registry",
        }
    }
}

impl fmt::Display for WebhookParentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookParentType {
    type Err = WebhookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "repo" => Ok(Self::Repo),
            "space" => Ok(Self::Space),
            "registry" => Ok(Self::Registry),
            other => Err(WebhookError::InvalidInput(format!(
                "webhook parent type '{}' is not supported",
                other
            ))),
        }
    }
}

/// A scope to search for registered webhooks. Used as a query key only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WebhookParentInfo {
    pub id: i64,
    pub parent_type: WebhookParentType,
}

impl WebhookParentInfo {
    pub fn repo(id: i64) -> Self {
        Self {
            id,
            parent_type: WebhookParentType::Repo,
        }
    }

    pub fn space(id: i64) -> Self {
        Self {
            id,
            parent_type: WebhookParentType::Space,
        }
    }
}

/// A registered webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: i64,

    /// Optimistic-lock token, incremented on every update
    pub version: i64,

    pub parent_id: i64,
    pub parent_type: WebhookParentType,

    /// 0 for repos, depth in the space tree for spaces
    pub scope: i64,

    pub created_by: i64,

    /// Epoch millis
    pub created: i64,

    /// Epoch millis
    pub updated: i64,

    pub identifier: String,
    pub display_name: String,
    pub description: String,
    pub url: String,

    /// Encrypted signing secret; empty means deliveries are unsigned
    #[serde(default, skip_serializing)]
    pub secret: String,

    pub enabled: bool,

    /// Skip TLS certificate verification
    pub insecure: bool,

    /// Target is trusted platform infrastructure
    pub internal: bool,

    /// Subscribed trigger types; empty subscribes to everything
    pub triggers: Vec<WebhookTrigger>,

    /// Cached result of the most recent execution
    pub latest_execution_result: Option<WebhookExecutionResult>,
}

impl Webhook {
    /// Create an enabled webhook without secret that subscribes to all triggers
    pub fn new(
        parent_type: WebhookParentType,
        parent_id: i64,
        identifier: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        let identifier = identifier.into();
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: 0,
            version: 0,
            parent_id,
            parent_type,
            scope: 0,
            created_by: 0,
            created: now,
            updated: now,
            display_name: identifier.clone(),
            identifier,
            description: String::new(),
            url: url.into(),
            secret: String::new(),
            enabled: true,
            insecure: false,
            internal: false,
            triggers: Vec::new(),
            latest_execution_result: None,
        }
    }

    /// Create a builder for custom configuration
    pub fn builder(
        parent_type: WebhookParentType,
        parent_id: i64,
        identifier: impl Into<String>,
        url: impl Into<String>,
    ) -> WebhookBuilder {
        WebhookBuilder {
            webhook: Self::new(parent_type, parent_id, identifier, url),
        }
    }

    /// Check if the webhook subscribed to the trigger type
    pub fn is_registered_for(&self, trigger: WebhookTrigger) -> bool {
        self.triggers.is_empty() || self.triggers.contains(&trigger)
    }

    /// Check if deliveries get an HMAC signature
    pub fn has_secret(&self) -> bool {
        !self.secret.is_empty()
    }
}

/// Builder for Webhook
#[derive(Debug, Clone)]
pub struct WebhookBuilder {
    webhook: Webhook,
}

impl WebhookBuilder {
    pub fn id(mut self, id: i64) -> Self {
        self.webhook.id = id;
        self
    }

    pub fn scope(mut self, scope: i64) -> Self {
        self.webhook.scope = scope;
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.webhook.display_name = name.into();
        self
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.webhook.description = desc.into();
        self
    }

    /// Set the (encrypted) signing secret
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook.secret = secret.into();
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.webhook.enabled = enabled;
        self
    }

    pub fn insecure(mut self, insecure: bool) -> Self {
        self.webhook.insecure = insecure;
        self
    }

    pub fn internal(mut self, internal: bool) -> Self {
        self.webhook.internal = internal;
        self
    }

    pub fn triggers(mut self, triggers: impl IntoIterator<Item = WebhookTrigger>) -> Self {
        self.webhook.triggers = triggers.into_iter().collect();
        self
    }

    pub fn build(self) -> Webhook {
        self.webhook
    }
}

/// Filter applied when listing webhooks
#[derive(Debug, Clone, Default)]
pub struct WebhookFilter {
    /// Case-insensitive identifier substring
    pub query: Option<String>,

    pub skip_internal: bool,

    /// 1-based page; 0 is treated as 1
    pub page: usize,

    /// Page size; 0 returns everything
    pub size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_defaults() {
        let webhook = Webhook::new(WebhookParentType::Repo, 7, "ci", "https://example.com/hook");

        assert!(webhook.enabled);
        assert!(!webhook.has_secret());
        assert!(webhook.triggers.is_empty());
        assert_eq!(webhook.display_name, "ci");
        assert!(webhook.latest_execution_result.is_none());
    }

    #[test]
    fn test_empty_triggers_match_everything() {
        let webhook = Webhook::new(WebhookParentType::Repo, 1, "all", "https://example.com");

        for trigger in WebhookTrigger::ALL {
            assert!(webhook.is_registered_for(trigger));
        }
    }

    #[test]
    fn test_listed_triggers_only() {
        let webhook = Webhook::builder(WebhookParentType::Space, 1, "prs", "https://example.com")
            .triggers([WebhookTrigger::PullReqCreated, WebhookTrigger::PullReqMerged])
            .build();

        assert!(webhook.is_registered_for(WebhookTrigger::PullReqCreated));
        assert!(webhook.is_registered_for(WebhookTrigger::PullReqMerged));
        assert!(!webhook.is_registered_for(WebhookTrigger::BranchCreated));
        assert!(!webhook.is_registered_for(WebhookTrigger::PullReqClosed));
    }

    #[test]
    fn test_secret_not_serialized() {
        let webhook = Webhook::builder(WebhookParentType::Repo, 1, "signed", "https://example.com")
            .secret("s3cr3t")
            .build();

        let json = serde_json::to_value(&webhook).unwrap();
        assert!(json.get("secret").is_none());
        assert_eq!(json["parent_type"], "repo");
    }

    #[test]
    fn test_parent_type_parse() {
        assert_eq!("space".parse::<WebhookParentType>().unwrap(), WebhookParentType::Space);
        assert!(matches!(
            "org".parse::<WebhookParentType>(),
            Err(WebhookError::InvalidInput(_))
        ));
    }
}
