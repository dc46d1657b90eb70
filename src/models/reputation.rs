//! Reputation activities and badges

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reputation-earning (or losing) event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    CommentApproved,
    CommentRejected,
    ReportUpheld,
    AppealGranted,
    ReviewPosted,
}

impl ActivityKind {
    /// Points credited for the activity
    pub fn points(&self) -> i64 {
        match self {
            ActivityKind::CommentApproved => 2,
            ActivityKind::CommentRejected => -5,
            ActivityKind::ReportUpheld => 3,
            ActivityKind::AppealGranted => 5,
            ActivityKind::ReviewPosted => 5,
        }
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActivityKind::CommentApproved => "comment_approved",
            ActivityKind::CommentRejected => "comment_rejected",
            ActivityKind::ReportUpheld => "report_upheld",
            ActivityKind::AppealGranted => "appeal_granted",
            ActivityKind::ReviewPosted => "review_posted",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "comment_approved" => Ok(ActivityKind::CommentApproved),
            "comment_rejected" => Ok(ActivityKind::CommentRejected),
            "report_upheld" => Ok(ActivityKind::ReportUpheld),
            "appeal_granted" => Ok(ActivityKind::AppealGranted),
            "review_posted" => Ok(ActivityKind::ReviewPosted),
            _ => Err(format!("Invalid activity kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationActivity {
    pub id: i64,
    pub user_id: i64,
    pub kind: ActivityKind,
    pub points: i64,
    pub reference_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Badges awarded once when a threshold is crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Badge {
    /// 10 reputation points
    Contributor,
    /// 50 reputation points
    Trusted,
    /// 5 upheld reports
    Guardian,
}

impl std::fmt::Display for Badge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Badge::Contributor => "contributor",
            Badge::Trusted => "trusted",
            Badge::Guardian => "guardian",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Badge {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contributor" => Ok(Badge::Contributor),
            "trusted" => Ok(Badge::Trusted),
            "guardian" => Ok(Badge::Guardian),
            _ => Err(format!("Invalid badge: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwardedBadge {
    pub badge: Badge,
    pub awarded_at: DateTime<Utc>,
}

/// Aggregated reputation of one user
#[derive(Debug, Clone, Serialize)]
pub struct ReputationSummary {
    pub user_id: i64,
    pub total: i64,
    pub badges: Vec<AwardedBadge>,
    pub recent: Vec<ReputationActivity>,
}
