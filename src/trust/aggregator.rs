/// Review intake and trust score recomputation
use super::{
    apply_delta, week_start, JobMeta, ReviewOutcome, ReviewScores, ReviewSubmission,
    TrustScoreReview,
};
use crate::{
    config::RewardConfig,
    db::{begin_immediate, decode_ts, encode_ts},
    error::{MarketError, MarketResult},
    ledger::{CreditLedger, TransactionReference, TransactionRequest},
    metrics,
    users::{directory::fetch_user, ActorContext, Role},
};
use chrono::{NaiveDate, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone)]
pub struct TrustScoreAggregator {
    db: SqlitePool,
    rewards: RewardConfig,
}

impl TrustScoreAggregator {
    pub fn new(db: SqlitePool, rewards: RewardConfig) -> Self {
        Self { db, rewards }
    }

    /// Submit a review from the actor.
    ///
    /// The review row, the reviewee's new score, the reviewer's reward and any
    /// milestone bonus commit together or not at all.
    pub async fn submit_review(
        &self,
        actor: &ActorContext,
        submission: ReviewSubmission,
    ) -> MarketResult<ReviewOutcome> {
        submission.validate()?;

        if actor.user_id == submission.reviewed_user_id {
            return Err(MarketError::Validation("Users cannot review themselves".to_string()));
        }

        let now = Utc::now();
        let week = week_start(now).date_naive();
        let mut tx = begin_immediate(&self.db).await?;

        let reviewer = fetch_user(&mut *tx, &actor.user_id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("User {} not found", actor.user_id)))?;
        if !reviewer.is_active {
            return Err(MarketError::Unauthorized(format!(
                "User {} is deactivated",
                reviewer.id
            )));
        }

        let reviewee = fetch_user(&mut *tx, &submission.reviewed_user_id)
            .await?
            .ok_or_else(|| {
                MarketError::NotFound(format!("User {} not found", submission.reviewed_user_id))
            })?;
        if reviewee.role == Role::Admin {
            return Err(MarketError::Validation(
                "Only field reps and vendors can be reviewed".to_string(),
            ));
        }

        let review_id = Uuid::new_v4().to_string();
        let delta = submission.scores.delta();
        let attachments = serde_json::to_string(&submission.attachments)
            .map_err(|e| MarketError::Internal(format!("Failed to encode attachments: {}", e)))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO trust_score_review
            (id, reviewer_id, reviewed_user_id, reviewed_role, job_number, platform_system,
             completion_date, communication_score, second_score, third_score, review_text,
             attachments, week_start, score_delta, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&review_id)
        .bind(&reviewer.id)
        .bind(&reviewee.id)
        .bind(reviewee.role.as_str())
        .bind(&submission.job.job_number)
        .bind(&submission.job.platform_system)
        .bind(submission.job.completion_date.map(|d| d.format(DATE_FORMAT).to_string()))
        .bind(submission.scores.communication.points())
        .bind(submission.scores.second.points())
        .bind(submission.scores.third.points())
        .bind(&submission.review_text)
        .bind(&attachments)
        .bind(week.format(DATE_FORMAT).to_string())
        .bind(delta)
        .bind(encode_ts(now))
        .execute(&mut *tx)
        .await
        .map_err(MarketError::from);

        if let Err(e) = inserted {
            if e.is_unique_violation() {
                tracing::warn!(
                    "Weekly review limit hit: {} -> {}",
                    reviewer.id,
                    reviewee.id
                );
                return Err(MarketError::RateLimited(format!(
                    "{} already reviewed {} this week",
                    reviewer.id, reviewee.id
                )));
            }
            return Err(e);
        }

        // The transaction holds the write lock from its first statement, so the
        // score read above is current
        let previous_score = reviewee.trust_score;
        let new_score = apply_delta(previous_score, delta);

        sqlx::query("UPDATE app_user SET trust_score = ? WHERE id = ?")
            .bind(new_score)
            .bind(&reviewee.id)
            .execute(&mut *tx)
            .await?;

        let mut ledger_entries = Vec::new();

        if self.rewards.review_reward_credits > 0 {
            let entry = CreditLedger::apply_in(
                &mut tx,
                &TransactionRequest::earned(
                    &reviewer.id,
                    self.rewards.review_reward_credits,
                    TransactionReference::new("trust_review", &review_id),
                ),
            )
            .await?;
            ledger_entries.push(entry);
        }

        let mut milestones_awarded = Vec::new();
        for milestone in &self.rewards.milestones {
            if !(previous_score < milestone.threshold && new_score >= milestone.threshold) {
                continue;
            }

            let claimed = sqlx::query(
                r#"
                INSERT OR IGNORE INTO trust_milestone_award (user_id, threshold, bonus_credits, awarded_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&reviewee.id)
            .bind(milestone.threshold)
            .bind(milestone.bonus_credits)
            .bind(encode_ts(now))
            .execute(&mut *tx)
            .await?;

            if claimed.rows_affected() == 0 {
                tracing::debug!(
                    "Milestone {} already awarded to {}",
                    milestone.threshold,
                    reviewee.id
                );
                continue;
            }

            let entry = CreditLedger::apply_in(
                &mut tx,
                &TransactionRequest::earned(
                    &reviewee.id,
                    milestone.bonus_credits,
                    TransactionReference::new("trust_milestone", milestone.threshold.to_string()),
                ),
            )
            .await?;
            ledger_entries.push(entry);
            milestones_awarded.push(milestone.threshold);
        }

        tx.commit().await?;

        for entry in &ledger_entries {
            CreditLedger::record_applied(entry);
        }
        metrics::record_review(reviewee.role.as_str());
        tracing::info!(
            "Review {} by {} moved {} from {} to {}",
            review_id,
            reviewer.id,
            reviewee.id,
            previous_score,
            new_score
        );

        Ok(ReviewOutcome {
            review: TrustScoreReview {
                id: review_id,
                reviewer_id: reviewer.id,
                reviewed_user_id: reviewee.id,
                reviewed_role: reviewee.role,
                job: submission.job,
                scores: submission.scores,
                review_text: submission.review_text,
                attachments: submission.attachments,
                week_start: week,
                score_delta: delta,
                created_at: now,
            },
            previous_score,
            new_score,
            reviewer_reward: self.rewards.review_reward_credits,
            milestones_awarded,
        })
    }

    /// Whether `reviewer_id` may review `target_id` this week
    pub async fn can_submit_review(&self, reviewer_id: &str, target_id: &str) -> MarketResult<bool> {
        if reviewer_id == target_id {
            return Ok(false);
        }

        let week = week_start(Utc::now()).date_naive();
        let existing: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM trust_score_review
            WHERE reviewer_id = ? AND reviewed_user_id = ? AND week_start = ?
            "#,
        )
        .bind(reviewer_id)
        .bind(target_id)
        .bind(week.format(DATE_FORMAT).to_string())
        .fetch_one(&self.db)
        .await?;

        Ok(existing == 0)
    }

    pub async fn trust_score(&self, user_id: &str) -> MarketResult<i64> {
        sqlx::query_scalar("SELECT trust_score FROM app_user WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("User {} not found", user_id)))
    }

    /// Reviews received by a user, newest first
    pub async fn reviews_for(&self, user_id: &str, limit: i64) -> MarketResult<Vec<TrustScoreReview>> {
        let rows = sqlx::query(
            r#"
            SELECT id, reviewer_id, reviewed_user_id, reviewed_role, job_number, platform_system,
                   completion_date, communication_score, second_score, third_score, review_text,
                   attachments, week_start, score_delta, created_at
            FROM trust_score_review
            WHERE reviewed_user_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(review_from_row).collect()
    }
}

fn parse_date(raw: &str) -> MarketResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| MarketError::Internal(format!("Invalid date '{}': {}", raw, e)))
}

fn review_from_row(row: &SqliteRow) -> MarketResult<TrustScoreReview> {
    let role: String = row.get("reviewed_role");
    let completion_date: Option<String> = row.get("completion_date");
    let attachments: String = row.get("attachments");
    let week: String = row.get("week_start");
    let created_at: String = row.get("created_at");

    Ok(TrustScoreReview {
        id: row.get("id"),
        reviewer_id: row.get("reviewer_id"),
        reviewed_user_id: row.get("reviewed_user_id"),
        reviewed_role: Role::from_str(&role)?,
        job: JobMeta {
            job_number: row.get("job_number"),
            platform_system: row.get("platform_system"),
            completion_date: completion_date.as_deref().map(parse_date).transpose()?,
        },
        scores: ReviewScores::from_points(
            row.get("communication_score"),
            row.get("second_score"),
            row.get("third_score"),
        )?,
        review_text: row.get("review_text"),
        attachments: serde_json::from_str(&attachments)
            .map_err(|e| MarketError::Internal(format!("Invalid attachments: {}", e)))?,
        week_start: parse_date(&week)?,
        score_delta: row.get("score_delta"),
        created_at: decode_ts(&created_at)?,
    })
}
