//! Moderation policy
//!
//! Combines the toxicity score, the number of reports and the author's
//! reputation into a [`Decision`].

use crate::config::ModerationConfig;
use crate::models::Decision;

/// Bonus added to the flag threshold for trusted authors
const TRUSTED_FLAG_BONUS: f64 = 0.1;

/// Gap kept between a raised flag threshold and the reject threshold
const THRESHOLD_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct ModerationPolicy {
    reject_threshold: f64,
    flag_threshold: f64,
    report_hide_threshold: i64,
    trusted_reputation: i64,
}

impl ModerationPolicy {
    pub fn new(config: &ModerationConfig) -> Self {
        Self {
            reject_threshold: config.reject_threshold,
            flag_threshold: config.flag_threshold,
            report_hide_threshold: config.report_hide_threshold,
            trusted_reputation: config.trusted_reputation,
        }
    }

    /// Flag threshold that applies to an author with `reputation`
    pub fn effective_flag_threshold(&self, reputation: i64) -> f64 {
        if reputation >= self.trusted_reputation {
            (self.flag_threshold + TRUSTED_FLAG_BONUS).min(self.reject_threshold - THRESHOLD_EPSILON)
        } else {
            self.flag_threshold
        }
    }

    pub fn decide(&self, score: f64, report_count: i64, author_reputation: i64) -> Decision {
        if score >= self.reject_threshold {
            Decision::Reject
        } else if score >= self.effective_flag_threshold(author_reputation)
            || self.reports_require_review(report_count)
        {
            Decision::Flag
        } else {
            Decision::Approve
        }
    }

    /// Whether this many reports pulls a comment into review
    pub fn reports_require_review(&self, report_count: i64) -> bool {
        report_count >= self.report_hide_threshold
    }

    /// Report count at which moderator alerts become urgent
    pub fn urgent_report_count(&self) -> i64 {
        self.report_hide_threshold * 2
    }

    pub fn flag_threshold(&self) -> f64 {
        self.flag_threshold
    }
}
