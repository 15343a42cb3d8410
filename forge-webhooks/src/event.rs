//! Events consumed from the event bus

use crate::{WebhookParentType, WebhookTrigger};
use serde::{Deserialize, Serialize};

/// A domain event that may fire webhooks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent<P> {
    /// Event bus identifier; redeliveries carry the same ID
    pub id: String,

    /// ID of the repo or space the event happened on
    pub resource_id: i64,

    /// Type of the resource
    pub resource_type: WebhookParentType,

    /// Trigger the event maps to
    pub trigger: WebhookTrigger,

    /// Body delivered to the webhooks
    pub payload: P,
}

impl<P> WebhookEvent<P> {
    /// Create an event on a repository
    pub fn for_repo(id: impl Into<String>, repo_id: i64, trigger: WebhookTrigger, payload: P) -> Self {
        Self {
            id: id.into(),
            resource_id: repo_id,
            resource_type: WebhookParentType::Repo,
            trigger,
            payload,
        }
    }

    /// Create an event on a space
    pub fn for_space(id: impl Into<String>, space_id: i64, trigger: WebhookTrigger, payload: P) -> Self {
        Self {
            id: id.into(),
            resource_id: space_id,
            resource_type: WebhookParentType::Space,
            trigger,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_constructors() {
        let event = WebhookEvent::for_repo("evt-1", 7, WebhookTrigger::BranchCreated, ());
        assert_eq!(event.resource_type, WebhookParentType::Repo);
        assert_eq!(event.resource_id, 7);

        let event = WebhookEvent::for_space("evt-2", 3, WebhookTrigger::TagDeleted, ());
        assert_eq!(event.resource_type, WebhookParentType::Space);
    }

    #[test]
    fn test_event_serde() {
        let event = WebhookEvent::for_repo(
            "evt-1",
            7,
            WebhookTrigger::BranchCreated,
            serde_json::json!({"ref": "refs/heads/main"}),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["trigger"], "branch_created");
        assert_eq!(json["resource_type"], "repo");

        let back: WebhookEvent<serde_json::Value> = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, "evt-1");
        assert_eq!(back.payload["ref"], "refs/heads/main");
    }
}
