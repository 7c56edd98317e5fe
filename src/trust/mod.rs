/// Trust Score Aggregator
///
/// Peer reviews carry three categorical ratings of -2, 0 or +2. Accepted
/// reviews shift the reviewee's 0-100 trust score by the rating sum, pay the
/// reviewer, and may unlock one-time milestone bonuses.

mod aggregator;

pub use aggregator::TrustScoreAggregator;

use crate::{
    error::{MarketError, MarketResult},
    users::Role,
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_TRUST_SCORE: i64 = 0;
pub const MAX_TRUST_SCORE: i64 = 100;

/// A single category rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Rating {
    Negative,
    Neutral,
    Positive,
}

impl Rating {
    pub fn points(&self) -> i64 {
        match self {
            Rating::Negative => -2,
            Rating::Neutral => 0,
            Rating::Positive => 2,
        }
    }
}

impl TryFrom<i64> for Rating {
    type Error = MarketError;

    fn try_from(value: i64) -> MarketResult<Self> {
        match value {
            -2 => Ok(Rating::Negative),
            0 => Ok(Rating::Neutral),
            2 => Ok(Rating::Positive),
            other => Err(MarketError::Validation(format!(
                "Score must be -2, 0 or 2, got {}",
                other
            ))),
        }
    }
}

impl From<Rating> for i64 {
    fn from(rating: Rating) -> Self {
        rating.points()
    }
}

/// The three category ratings of a review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewScores {
    pub communication: Rating,
    /// On time (field reps) or paid on time (vendors)
    pub second: Rating,
    /// Quality of work (field reps) or provided what was needed (vendors)
    pub third: Rating,
}

impl ReviewScores {
    pub fn from_points(communication: i64, second: i64, third: i64) -> MarketResult<Self> {
        Ok(Self {
            communication: Rating::try_from(communication)?,
            second: Rating::try_from(second)?,
            third: Rating::try_from(third)?,
        })
    }

    pub fn delta(&self) -> i64 {
        self.communication.points() + self.second.points() + self.third.points()
    }

    pub fn has_negative(&self) -> bool {
        [self.communication, self.second, self.third].contains(&Rating::Negative)
    }
}

/// Category labels for a reviewed user's role
pub fn category_labels(role: Role) -> Option<[&'static str; 3]> {
    match role {
        Role::FieldRep => Some(["communication", "on_time", "quality_of_work"]),
        Role::Vendor => Some(["communication", "paid_on_time", "provided_what_was_needed"]),
        Role::Admin => None,
    }
}

/// Job details attached to a review
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobMeta {
    pub job_number: Option<String>,
    pub platform_system: Option<String>,
    pub completion_date: Option<NaiveDate>,
}

/// A review as submitted by the reviewer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSubmission {
    pub reviewed_user_id: String,
    pub scores: ReviewScores,
    #[serde(default)]
    pub job: JobMeta,
    #[serde(default)]
    pub review_text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl ReviewSubmission {
    /// Negative ratings must be backed by text or an attachment
    pub fn validate(&self) -> MarketResult<()> {
        if self.scores.has_negative() {
            let has_text = self
                .review_text
                .as_deref()
                .map_or(false, |t| !t.trim().is_empty());
            let has_attachment = self.attachments.iter().any(|a| !a.trim().is_empty());

            if !has_text && !has_attachment {
                return Err(MarketError::Validation(
                    "Negative ratings require an explanation or an attachment".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Stored review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustScoreReview {
    pub id: String,
    pub reviewer_id: String,
    pub reviewed_user_id: String,
    pub reviewed_role: Role,
    pub job: JobMeta,
    pub scores: ReviewScores,
    pub review_text: Option<String>,
    pub attachments: Vec<String>,
    pub week_start: NaiveDate,
    pub score_delta: i64,
    pub created_at: DateTime<Utc>,
}

/// Outcome of an accepted review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub review: TrustScoreReview,
    pub previous_score: i64,
    pub new_score: i64,
    pub reviewer_reward: i64,
    /// Thresholds whose bonus was paid by this review
    pub milestones_awarded: Vec<i64>,
}

/// Start (Sunday 00:00 UTC) of the review week containing `ts`
pub fn week_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    let date = ts.date_naive();
    let days_since_sunday = date.weekday().num_days_from_sunday() as i64;
    let sunday = date - Duration::days(days_since_sunday);
    Utc.from_utc_datetime(&sunday.and_time(chrono::NaiveTime::MIN))
}

/// Apply a rating delta and clamp into the valid range
pub fn apply_delta(score: i64, delta: i64) -> i64 {
    (score + delta).clamp(MIN_TRUST_SCORE, MAX_TRUST_SCORE)
}
