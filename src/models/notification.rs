//! Notification model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery priority; ordering is by urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// Sort key used by the listing query (higher first)
    pub fn rank(&self) -> i64 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
            Priority::Urgent => 3,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

/// Event category of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ContentFlagged,
    ContentRejected,
    ContentRestored,
    ReportResolved,
    AppealSubmitted,
    AppealResolved,
    BulkCompleted,
    OrderUpdated,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ContentFlagged => "content_flagged",
            Self::ContentRejected => "content_rejected",
            Self::ContentRestored => "content_restored",
            Self::ReportResolved => "report_resolved",
            Self::AppealSubmitted => "appeal_submitted",
            Self::AppealResolved => "appeal_resolved",
            Self::BulkCompleted => "bulk_completed",
            Self::OrderUpdated => "order_updated",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content_flagged" => Ok(Self::ContentFlagged),
            "content_rejected" => Ok(Self::ContentRejected),
            "content_restored" => Ok(Self::ContentRestored),
            "report_resolved" => Ok(Self::ReportResolved),
            "appeal_submitted" => Ok(Self::AppealSubmitted),
            "appeal_resolved" => Ok(Self::AppealResolved),
            "bulk_completed" => Ok(Self::BulkCompleted),
            "order_updated" => Ok(Self::OrderUpdated),
            _ => Err(format!("Invalid notification kind: {}", s)),
        }
    }
}

/// Stored in-app notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub kind: NotificationKind,
    pub priority: Priority,
    pub title: String,
    pub body: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A notification before it is routed to channels
#[derive(Debug, Clone)]
pub struct OutgoingNotification {
    pub user_id: i64,
    pub kind: NotificationKind,
    pub priority: Priority,
    pub title: String,
    pub body: String,
}

impl OutgoingNotification {
    pub fn new(
        user_id: i64,
        kind: NotificationKind,
        priority: Priority,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            kind,
            priority,
            title: title.into(),
            body: body.into(),
        }
    }
}
