//! Trigger types webhooks can subscribe to

use crate::WebhookError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of domain event a webhook can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WebhookTrigger {
    #[serde(rename = "branch_created")]
    BranchCreated,
    #[serde(rename = "branch_updated")]
    BranchUpdated,
    #[serde(rename = "branch_deleted")]
    BranchDeleted,
    #[serde(rename = "tag_created")]
    TagCreated,
    #[serde(rename = "tag_updated")]
    TagUpdated,
    #[serde(rename = "tag_deleted")]
    TagDeleted,
    #[serde(rename = "pullreq_created")]
    PullReqCreated,
    #[serde(rename = "pullreq_reopened")]
    PullReqReopened,
    #[serde(rename = "pullreq_branch_updated")]
    PullReqBranchUpdated,
    #[serde(rename = "pullreq_closed")]
    PullReqClosed,
    #[serde(rename = "pullreq_merged")]
    PullReqMerged,
    #[serde(rename = "pullreq_updated")]
    PullReqUpdated,
    #[serde(rename = "pullreq_comment_created")]
    PullReqCommentCreated,
    #[serde(rename = "pullreq_comment_updated")]
    PullReqCommentUpdated,
    #[serde(rename = "pullreq_comment_status_updated")]
    PullReqCommentStatusUpdated,
    #[serde(rename = "pullreq_label_assigned")]
    PullReqLabelAssigned,
    #[serde(rename = "pullreq_review_submitted")]
    PullReqReviewSubmitted,
    #[serde(rename = "pullreq_target_branch_changed")]
    PullReqTargetBranchChanged,
}

impl WebhookTrigger {
    /// All known trigger types
    pub const ALL: [WebhookTrigger; 18] = [
        Self::BranchCreated,
        Self::BranchUpdated,
        Self::BranchDeleted,
        Self::TagCreated,
        Self::TagUpdated,
        Self::TagDeleted,
        Self::PullReqCreated,
        Self::PullReqReopened,
        Self::PullReqBranchUpdated,
        Self::PullReqClosed,
        Self::PullReqMerged,
        Self::PullReqUpdated,
        Self::PullReqCommentCreated,
        Self::PullReqCommentUpdated,
        Self::PullReqCommentStatusUpdated,
        Self::PullReqLabelAssigned,
        Self::PullReqReviewSubmitted,
        Self::PullReqTargetBranchChanged,
    ];

    /// Tag used on the wire and in the trigger header
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BranchCreated => "branch_created",
            Self::BranchUpdated => "branch_updated",
            Self::BranchDeleted => "branch_deleted",
            Self::TagCreated => "tag_created",
            Self::TagUpdated => "tag_updated",
            Self::TagDeleted => "tag_deleted",
            Self::PullReqCreated => "pullreq_created",
            Self::PullReqReopened => "pullreq_reopened",
            Self::PullReqBranchUpdated => "pullreq_branch_updated",
            Self::PullReqClosed => "pullreq_closed",
            Self::PullReqMerged => "pullreq_merged",
            Self::PullReqUpdated => "pullreq_updated",
            Self::PullReqCommentCreated => "pullreq_comment_created",
            Self::PullReqCommentUpdated => "pullreq_comment_updated",
            Self::PullReqCommentStatusUpdated => "pullreq_comment_status_updated",
            Self::PullReqLabelAssigned => "pullreq_label_assigned",
            Self::PullReqReviewSubmitted => "pullreq_review_submitted",
            Self::PullReqTargetBranchChanged => "pullreq_target_branch_changed",
        }
    }
}

impl fmt::Display for WebhookTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookTrigger {
    type Err = WebhookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|trigger| trigger.as_str() == s)
            .ok_or_else(|| WebhookError::InvalidInput(format!("unknown webhook trigger '{}'", s)))
    }
}
