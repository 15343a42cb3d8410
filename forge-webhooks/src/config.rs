//! Configuration for webhook delivery

use crate::{NetworkPolicy, Result, WebhookError};
use std::time::Duration;

/// Time limit of a single webhook execution
pub const DELIVERY_TIME_LIMIT: Duration = Duration::from_secs(10);

const ENV_USER_AGENT_IDENTITY: &str = "WEBHOOK_USER_AGENT_IDENTITY";
const ENV_HEADER_IDENTITY: &str = "WEBHOOK_HEADER_IDENTITY";
const ENV_TIMEOUT_SECS: &str = "WEBHOOK_TIMEOUT_SECS";
const ENV_ALLOW_LOOPBACK: &str = "WEBHOOK_ALLOW_LOOPBACK";
const ENV_ALLOW_PRIVATE_NETWORK: &str = "WEBHOOK_ALLOW_PRIVATE_NETWORK";

/// Configuration for the webhook service
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Product name sent in the User-Agent header
    pub user_agent_identity: String,

    /// Name used in the custom `X-<identity>-*` headers
    pub header_identity: String,

    /// Time limit of a single delivery
    pub delivery_timeout: Duration,

    /// Let non-internal webhooks target loopback addresses
    pub allow_loopback: bool,

    /// Let non-internal webhooks target private network ranges
    pub allow_private_network: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            user_agent_identity: "Forge".to_string(),
            header_identity: "Forge".to_string(),
            delivery_timeout: DELIVERY_TIME_LIMIT,
            allow_loopback: false,
            allow_private_network: false,
        }
    }
}

impl WebhookConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for custom configuration
    pub fn builder() -> WebhookConfigBuilder {
        WebhookConfigBuilder::new()
    }

    /// Load the configuration from `WEBHOOK_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration from a variable lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(identity) = lookup(ENV_USER_AGENT_IDENTITY) {
            config.user_agent_identity = identity;
        }
        if let Some(identity) = lookup(ENV_HEADER_IDENTITY) {
            config.header_identity = identity;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                WebhookError::ConfigError(format!("{} must be a number, got '{}'", ENV_TIMEOUT_SECS, raw))
            })?;
            config.delivery_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup(ENV_ALLOW_LOOPBACK) {
            config.allow_loopback = parse_bool(ENV_ALLOW_LOOPBACK, &raw)?;
        }
        if let Some(raw) = lookup(ENV_ALLOW_PRIVATE_NETWORK) {
            config.allow_private_network = parse_bool(ENV_ALLOW_PRIVATE_NETWORK, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the service cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.header_identity.trim().is_empty() {
            return Err(WebhookError::ConfigError(
                "header identity must not be empty".to_string(),
            ));
        }
        if self.user_agent_identity.trim().is_empty() {
            return Err(WebhookError::ConfigError(
                "user agent identity must not be empty".to_string(),
            ));
        }
        if self.delivery_timeout.is_zero() {
            return Err(WebhookError::ConfigError(
                "delivery timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// User-Agent header value
    pub fn user_agent(&self) -> String {
        format!("{}/{}", self.user_agent_identity, env!("CARGO_PKG_VERSION"))
    }

    /// Name of a custom `X-<identity>-<name>` header
    pub fn x_header(&self, name: &str) -> String {
        format!("X-{}-{}", self.header_identity, name)
    }

    /// Network policy applied to non-internal webhooks
    pub fn network_policy(&self) -> NetworkPolicy {
        NetworkPolicy::new(self.allow_loopback, self.allow_private_network)
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(WebhookError::ConfigError(format!(
            "{} must be a boolean, got '{}'",
            key, raw
        ))),
    }
}

/// Builder for WebhookConfig
#[derive(Debug, Clone, Default)]
pub struct WebhookConfigBuilder {
    config: WebhookConfig,
}

impl WebhookConfigBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            config: WebhookConfig::default(),
        }
    }

    /// Set the product name sent in the User-Agent header
    pub fn user_agent_identity(mut self, identity: impl Into<String>) -> Self {
        self.config.user_agent_identity = identity.into();
        self
    }

    /// Set the name used in custom headers
    pub fn header_identity(mut self, identity: impl Into<String>) -> Self {
        self.config.header_identity = identity.into();
        self
    }

    /// Set the delivery time limit
    pub fn delivery_timeout(mut self, timeout: Duration) -> Self {
        self.config.delivery_timeout = timeout;
        self
    }

    /// Allow loopback targets for non-internal webhooks
    pub fn allow_loopback(mut self, allow: bool) -> Self {
        self.config.allow_loopback = allow;
        self
    }

    /// Allow private network targets for non-internal webhooks
    pub fn allow_private_network(mut self, allow: bool) -> Self {
        self.config.allow_private_network = allow;
        self
    }

    /// Build the configuration
    pub fn build(self) -> WebhookConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = WebhookConfig::default();
        assert_eq!(config.delivery_timeout, Duration::from_secs(10));
        assert!(!config.allow_loopback);
        assert!(!config.allow_private_network);
        assert_eq!(config.x_header("Trigger"), "X-Forge-Trigger");
    }

    #[test]
    fn test_builder() {
        let config = WebhookConfig::builder()
            .header_identity("Acme")
            .user_agent_identity("AcmeHooks")
            .allow_loopback(true)
            .delivery_timeout(Duration::from_secs(3))
            .build();

        assert_eq!(config.x_header("Signature"), "X-Acme-Signature");
        assert!(config.user_agent().starts_with("AcmeHooks/"));
        assert!(config.allow_loopback);
        assert_eq!(config.delivery_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_from_lookup() {
        let config = WebhookConfig::from_lookup(lookup(&[
            ("WEBHOOK_HEADER_IDENTITY", "Gitforge"),
            ("WEBHOOK_TIMEOUT_SECS", "5"),
            ("WEBHOOK_ALLOW_PRIVATE_NETWORK", "true"),
        ]))
        .unwrap();

        assert_eq!(config.header_identity, "Gitforge");
        assert_eq!(config.user_agent_identity, "Forge");
        assert_eq!(config.delivery_timeout, Duration::from_secs(5));
        assert!(config.allow_private_network);
        assert!(!config.allow_loopback);
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let result = WebhookConfig::from_lookup(lookup(&[("WEBHOOK_ALLOW_LOOPBACK", "maybe")]));
        assert!(matches!(result, Err(WebhookError::ConfigError(_))));

        let result = WebhookConfig::from_lookup(lookup(&[("WEBHOOK_TIMEOUT_SECS", "ten")]));
        assert!(matches!(result, Err(WebhookError::ConfigError(_))));

        let result = WebhookConfig::from_lookup(lookup(&[("WEBHOOK_TIMEOUT_SECS", "0")]));
        assert!(matches!(result, Err(WebhookError::ConfigError(_))));
    }
}
