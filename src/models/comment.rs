//! Comment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Moderation status shared by comments and reviews
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    /// Awaiting analysis or the expiry sweep
    #[default]
    Pending,
    Approved,
    /// Waiting for a human decision
    Flagged,
    Rejected,
}

impl ContentStatus {
    /// Whether the content is shown to everyone
    pub fn is_public(&self) -> bool {
        *self == Self::Approved
    }

    /// Whether the author may appeal the current state
    pub fn is_appealable(&self) -> bool {
        matches!(self, Self::Rejected | Self::Flagged)
    }
}

impl std::fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Flagged => write!(f, "flagged"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for ContentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "flagged" => Ok(Self::Flagged),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Invalid content status: {}", s)),
        }
    }
}

/// What a comment is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentTarget {
    /// A marketplace product page
    Product,
    /// A forum thread
    Thread,
}

impl std::fmt::Display for CommentTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Product => write!(f, "product"),
            Self::Thread => write!(f, "thread"),
        }
    }
}

impl std::str::FromStr for CommentTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "product" => Ok(Self::Product),
            "thread" => Ok(Self::Thread),
            _ => Err(format!("Invalid comment target: {}", s)),
        }
    }
}

/// Comment entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub author_id: i64,
    pub target_type: CommentTarget,
    pub target_id: i64,
    pub parent_id: Option<i64>,
    pub content: String,
    pub status: ContentStatus,
    /// Last toxicity score, absent until analyzed
    pub toxicity_score: Option<f64>,
    /// Signal labels reported by the analyzer
    pub labels: Vec<String>,
    pub report_count: i64,
    pub moderated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a comment
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommentInput {
    pub target_type: CommentTarget,
    pub target_id: i64,
    pub parent_id: Option<i64>,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_content_status_roundtrip_strings() {
        for status in [
            ContentStatus::Pending,
            ContentStatus::Approved,
            ContentStatus::Flagged,
            ContentStatus::Rejected,
        ] {
            assert_eq!(ContentStatus::from_str(&status.to_string()).unwrap(), status);
        }
        assert!(ContentStatus::from_str("hidden").is_err());
    }

    #[test]
    fn test_appealable_states() {
        assert!(ContentStatus::Rejected.is_appealable());
        assert!(ContentStatus::Flagged.is_appealable());
        assert!(!ContentStatus::Approved.is_appealable());
        assert!(!ContentStatus::Pending.is_appealable());
    }
}
