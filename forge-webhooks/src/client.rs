//! HTTP clients used for webhook delivery

use crate::{GuardedResolver, NetworkPolicy, Result, WebhookConfig, WebhookError};
use reqwest::Client;
use std::sync::Arc;
use tracing::debug;

/// An HTTP client bound to the network policy it enforces
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    http: Client,
    policy: NetworkPolicy,
}

impl DeliveryClient {
    /// Build a client that never follows redirects and ignores proxies
    pub fn new(policy: NetworkPolicy, insecure: bool) -> Result<Self> {
        let http = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .danger_accept_invalid_certs(insecure)
            .dns_resolver(Arc::new(GuardedResolver::new(policy)))
            .build()
            .map_err(|e| WebhookError::ConfigError(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { http, policy })
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn policy(&self) -> NetworkPolicy {
        self.policy
    }
}

/// Lookup table of the four delivery clients, indexed by (internal, insecure)
#[derive(Debug, Clone)]
pub struct HttpClients {
    clients: [[DeliveryClient; 2]; 2],
}

impl HttpClients {
    /// Build all clients once so connection pools are shared across deliveries
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        let standard = config.network_policy();
        let internal = NetworkPolicy::unrestricted();
        debug!(?standard, "building webhook HTTP clients");

        Ok(Self {
            clients: [
                [
                    DeliveryClient::new(standard, false)?,
                    DeliveryClient::new(standard, true)?,
                ],
                [
                    DeliveryClient::new(internal, false)?,
                    DeliveryClient::new(internal, true)?,
                ],
            ],
        })
    }

    /// Select the client for a webhook's flags
    pub fn select(&self, internal: bool, insecure: bool) -> &DeliveryClient {
        &self.clients[usize::from(internal)][usize::from(insecure)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_policies() {
        let config = WebhookConfig::builder().allow_loopback(true).build();
        let clients = HttpClients::new(&config).unwrap();

        let standard = NetworkPolicy::new(true, false);
        assert_eq!(clients.select(false, false).policy(), standard);
        assert_eq!(clients.select(false, true).policy(), standard);
        assert_eq!(clients.select(true, false).policy(), NetworkPolicy::unrestricted());
        assert_eq!(clients.select(true, true).policy(), NetworkPolicy::unrestricted());
    }
}
