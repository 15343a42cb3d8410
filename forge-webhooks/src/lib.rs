//! Webhook delivery for Forge
//!
//! This crate turns domain events on repositories and spaces into signed HTTP callbacks
//! to the webhooks registered on them, and keeps an audit ledger of every attempt.
//!
//! # Features
//!
//! - **Scope Resolution**: Webhooks registered on a repository's parent spaces fire too
//! - **At-most-once Delivery**: Redelivered events skip webhooks that already reached a final result
//! - **Signature Generation**: HMAC-SHA256 over the exact request body
//! - **SSRF Protection**: Loopback and private ranges are blocked unless allowed
//! - **Execution Ledger**: Every attempt is persisted, with capped response capture
//! - **Retrigger**: Replay the exact bytes of a past execution
//!
//! # Example: Handling Events
//!
//! ```rust,no_run
//! use forge_webhooks::{
//!     MemoryExecutionStore, MemorySpaceTree, MemoryWebhookStore, Webhook, WebhookEvent,
//!     WebhookParentType, WebhookService, WebhookTrigger,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tree = Arc::new(MemorySpaceTree::new());
//!     tree.add_space(1, None);
//!     tree.add_repo(10, 1);
//!
//!     let webhooks = Arc::new(MemoryWebhookStore::new());
//!     webhooks.insert(
//!         Webhook::builder(WebhookParentType::Space, 1, "ci", "https://ci.example.com/hook")
//!             .secret("s3cr3t")
//!             .triggers([WebhookTrigger::BranchCreated])
//!             .build(),
//!     );
//!
//!     let service = WebhookService::builder()
//!         .webhook_store(webhooks)
//!         .execution_store(Arc::new(MemoryExecutionStore::new()))
//!         .ancestry(tree)
//!         .build()?;
//!
//!     let event = WebhookEvent::for_repo(
//!         "evt-1",
//!         10,
//!         WebhookTrigger::BranchCreated,
//!         serde_json::json!({ "ref": "refs/heads/main" }),
//!     );
//!
//!     // an error asks the event bus to redeliver
//!     service.handle_event(&event).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Example: Verifying Signatures
//!
//! ```rust
//! use forge_webhooks::WebhookSignature;
//!
//! let signer = WebhookSignature::new("s3cr3t");
//! let body = b"{\"trigger\":\"branch_created\"}\n";
//!
//! let signature = signer.sign(body).unwrap();
//! assert!(signer.verify(body, &signature));
//! ```

mod client;
mod config;
mod dispatch;
mod error;
mod event;
mod execution;
mod executor;
pub mod headers;
mod memory;
mod network;
mod provider;
mod retrigger;
mod scope;
mod service;
mod signature;
mod store;
mod trigger;
mod webhook;

pub use client::{DeliveryClient, HttpClients};
pub use config::{DELIVERY_TIME_LIMIT, WebhookConfig, WebhookConfigBuilder};
pub use dispatch::{SkipReason, TriggerDispatcher, TriggerResult, trigger_id_for_event};
pub use error::WebhookError;
pub use event::WebhookEvent;
pub use execution::{
    WebhookExecution, WebhookExecutionFilter, WebhookExecutionRequest, WebhookExecutionResponse,
    WebhookExecutionResult,
};
pub use executor::{DeliveryExecutor, JsonPayload, RequestBody, classify_status};
pub use memory::{MemoryExecutionStore, MemorySpaceTree, MemoryWebhookStore};
pub use network::{GuardedResolver, NetworkPolicy, ResolveError};
pub use provider::{Encrypter, NoopEncrypter, SpaceAncestry, UrlProvider, WebhookUrlProvider};
pub use retrigger::ExecutionRetrigger;
pub use scope::ScopeResolver;
pub use service::{WebhookService, WebhookServiceBuilder};
pub use signature::WebhookSignature;
pub use store::{WebhookExecutionStore, WebhookMutation, WebhookStore};
pub use trigger::WebhookTrigger;
pub use webhook::{Webhook, WebhookBuilder, WebhookFilter, WebhookParentInfo, WebhookParentType};

/// Result type for webhook operations
pub type Result<T> = std::result::Result<T, WebhookError>;
