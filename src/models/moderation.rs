//! Moderation log entries, decisions and status transitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ContentStatus;

/// What kind of event a log entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationAction {
    /// Analyzer score applied by the pipeline
    AutoModerate,
    /// A moderator set the status by hand
    ManualStatus,
    /// Report count crossed the review threshold
    ReportThreshold,
    ReportUpheld,
    ReportDismissed,
    AppealGranted,
    AppealDenied,
    Bulk,
    /// Pending item approved by the expiry sweep
    ExpiryApprove,
}

impl std::fmt::Display for ModerationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AutoModerate => "auto_moderate",
            Self::ManualStatus => "manual_status",
            Self::ReportThreshold => "report_threshold",
            Self::ReportUpheld => "report_upheld",
            Self::ReportDismissed => "report_dismissed",
            Self::AppealGranted => "appeal_granted",
            Self::AppealDenied => "appeal_denied",
            Self::Bulk => "bulk",
            Self::ExpiryApprove => "expiry_approve",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ModerationAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto_moderate" => Ok(Self::AutoModerate),
            "manual_status" => Ok(Self::ManualStatus),
            "report_threshold" => Ok(Self::ReportThreshold),
            "report_upheld" => Ok(Self::ReportUpheld),
            "report_dismissed" => Ok(Self::ReportDismissed),
            "appeal_granted" => Ok(Self::AppealGranted),
            "appeal_denied" => Ok(Self::AppealDenied),
            "bulk" => Ok(Self::Bulk),
            "expiry_approve" => Ok(Self::ExpiryApprove),
            _ => Err(format!("Invalid moderation action: {}", s)),
        }
    }
}

/// Append-only audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationLog {
    pub id: i64,
    /// `None` when the system acted
    pub actor_id: Option<i64>,
    pub action: ModerationAction,
    pub target_type: String,
    pub target_id: i64,
    pub from_status: Option<String>,
    pub to_status: Option<String>,
    pub reason: Option<String>,
    pub batch_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of the moderation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Flag,
    Reject,
}

impl Decision {
    pub fn target_status(&self) -> ContentStatus {
        match self {
            Decision::Approve => ContentStatus::Approved,
            Decision::Flag => ContentStatus::Flagged,
            Decision::Reject => ContentStatus::Rejected,
        }
    }
}

/// A status change to apply atomically together with its log entry
#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub comment_id: i64,
    pub to: ContentStatus,
    /// Only apply when the current status is one of these (empty = any)
    pub allowed_from: Vec<ContentStatus>,
    pub actor_id: Option<i64>,
    pub action: ModerationAction,
    pub reason: Option<String>,
    /// Analyzer output stored alongside the transition
    pub analysis: Option<(f64, Vec<String>)>,
}

impl StatusTransition {
    pub fn new(comment_id: i64, to: ContentStatus, action: ModerationAction) -> Self {
        Self {
            comment_id,
            to,
            allowed_from: Vec::new(),
            actor_id: None,
            action,
            reason: None,
            analysis: None,
        }
    }

    pub fn from_states(mut self, states: &[ContentStatus]) -> Self {
        self.allowed_from = states.to_vec();
        self
    }

    pub fn by(mut self, actor_id: i64) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_analysis(mut self, score: f64, labels: Vec<String>) -> Self {
        self.analysis = Some((score, labels));
        self
    }
}

/// Result of trying to apply a transition
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Applied { from: ContentStatus, to: ContentStatus },
    /// Current status was not in `allowed_from` or equal to the target
    Skipped { current: ContentStatus },
    NotFound,
}

/// Action applied by a bulk request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    Approve,
    Flag,
    Reject,
}

impl BulkAction {
    pub fn target_status(&self) -> ContentStatus {
        match self {
            BulkAction::Approve => ContentStatus::Approved,
            BulkAction::Flag => ContentStatus::Flagged,
            BulkAction::Reject => ContentStatus::Rejected,
        }
    }
}

/// Summary of one committed bulk batch
#[derive(Debug, Clone, Serialize)]
pub struct BulkOutcome {
    pub batch_id: String,
    /// Comments whose status changed, with their authors and previous status
    pub updated: Vec<BulkChange>,
    /// Comments already in the target status
    pub skipped: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkChange {
    pub comment_id: i64,
    pub author_id: i64,
    pub from: ContentStatus,
}

/// Snapshot of outstanding moderation work
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub pending_comments: i64,
    pub flagged_comments: i64,
    pub pending_reports: i64,
    pub pending_appeals: i64,
}
