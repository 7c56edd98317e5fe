/// Vendor referral manager
use super::{Referral, ReferralStatus};
use crate::{
    db::{begin_immediate, decode_ts, encode_ts},
    error::{MarketError, MarketResult},
    ledger::{CreditLedger, TransactionReference, TransactionRequest},
    users::{ActorContext, Role},
};
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

const REFERRAL_COLUMNS: &str =
    "id, referrer_id, rep_name, rep_initials, status, credit_earned, date_referred, updated_at";
const MAX_INITIALS_LEN: usize = 4;

#[derive(Clone)]
pub struct Referrals {
    db: SqlitePool,
    reward_credits: i64,
}

impl Referrals {
    pub fn new(db: SqlitePool, reward_credits: i64) -> Self {
        Self { db, reward_credits }
    }

    /// Record a vendor's referral of a prospective field rep
    pub async fn create_referral(
        &self,
        actor: &ActorContext,
        rep_name: &str,
        rep_initials: &str,
    ) -> MarketResult<Referral> {
        if !matches!(actor.role, Role::Vendor | Role::Admin) {
            return Err(MarketError::Unauthorized(
                "Only vendors can create referrals".to_string(),
            ));
        }

        let rep_name = rep_name.trim();
        let rep_initials = rep_initials.trim().to_uppercase();
        if rep_name.is_empty() {
            return Err(MarketError::Validation("Rep name is required".to_string()));
        }
        if rep_initials.is_empty() || rep_initials.chars().count() > MAX_INITIALS_LEN {
            return Err(MarketError::Validation(format!(
                "Rep initials must be 1-{} characters",
                MAX_INITIALS_LEN
            )));
        }

        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO referral (id, referrer_id, rep_name, rep_initials, status, credit_earned, date_referred, updated_at)
            VALUES (?, ?, ?, ?, 'pending', 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&actor.user_id)
        .bind(rep_name)
        .bind(&rep_initials)
        .bind(encode_ts(now))
        .bind(encode_ts(now))
        .execute(&self.db)
        .await?;

        tracing::info!("Referral {} created by {}", id, actor.user_id);

        Ok(Referral {
            id,
            referrer_id: actor.user_id.clone(),
            rep_name: rep_name.to_string(),
            rep_initials,
            status: ReferralStatus::Pending,
            credit_earned: false,
            date_referred: now,
            updated_at: now,
        })
    }

    /// The referred rep registered. Repeating the event is harmless.
    pub async fn mark_signed_up(&self, referral_id: &str) -> MarketResult<Referral> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE referral SET status = 'signed_up', updated_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(encode_ts(now))
        .bind(referral_id)
        .execute(&self.db)
        .await?;

        let referral = self.require(referral_id).await?;
        if result.rows_affected() == 0 && referral.status != ReferralStatus::SignedUp {
            return Err(MarketError::Conflict(format!(
                "Referral is {}, not pending",
                referral.status.as_str()
            )));
        }

        tracing::info!("Referral {} signed up", referral_id);
        Ok(referral)
    }

    /// Confirm a signed-up referral and pay the referrer exactly once.
    ///
    /// Confirming an already confirmed referral returns it unchanged.
    pub async fn confirm(&self, actor: &ActorContext, referral_id: &str) -> MarketResult<Referral> {
        let referral = self.require(referral_id).await?;
        self.check_referrer(actor, &referral)?;

        let now = Utc::now();
        let mut tx = begin_immediate(&self.db).await?;

        let claimed = sqlx::query(
            r#"
            UPDATE referral
            SET status = 'confirmed', credit_earned = 1, updated_at = ?
            WHERE id = ? AND status = 'signed_up' AND credit_earned = 0
            "#,
        )
        .bind(encode_ts(now))
        .bind(referral_id)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            tx.rollback().await?;
            let current = self.require(referral_id).await?;
            if current.status == ReferralStatus::Confirmed {
                tracing::debug!("Referral {} already confirmed", referral_id);
                return Ok(current);
            }
            return Err(MarketError::Conflict(format!(
                "Referral is {}, not signed up",
                current.status.as_str()
            )));
        }

        let entry = if self.reward_credits > 0 {
            Some(
                CreditLedger::apply_in(
                    &mut tx,
                    &TransactionRequest::earned(
                        &referral.referrer_id,
                        self.reward_credits,
                        TransactionReference::new("referral", referral_id),
                    ),
                )
                .await?,
            )
        } else {
            None
        };

        tx.commit().await?;

        if let Some(entry) = &entry {
            CreditLedger::record_applied(entry);
        }
        tracing::info!("Referral {} confirmed by {}", referral_id, actor.user_id);

        Ok(Referral {
            status: ReferralStatus::Confirmed,
            credit_earned: true,
            updated_at: now,
            ..referral
        })
    }

    /// Decline a signed-up referral; no credit is paid
    pub async fn decline(&self, actor: &ActorContext, referral_id: &str) -> MarketResult<Referral> {
        let referral = self.require(referral_id).await?;
        self.check_referrer(actor, &referral)?;

        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE referral SET status = 'declined', updated_at = ? WHERE id = ? AND status = 'signed_up'",
        )
        .bind(encode_ts(now))
        .bind(referral_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            let current = self.require(referral_id).await?;
            if current.status == ReferralStatus::Declined {
                return Ok(current);
            }
            return Err(MarketError::Conflict(format!(
                "Referral is {}, not signed up",
                current.status.as_str()
            )));
        }

        tracing::info!("Referral {} declined by {}", referral_id, actor.user_id);

        Ok(Referral {
            status: ReferralStatus::Declined,
            updated_at: now,
            ..referral
        })
    }

    fn check_referrer(&self, actor: &ActorContext, referral: &Referral) -> MarketResult<()> {
        if referral.referrer_id != actor.user_id {
            return Err(MarketError::Unauthorized(
                "Only the referring vendor can confirm or decline a referral".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn get(&self, referral_id: &str) -> MarketResult<Option<Referral>> {
        let row = sqlx::query(&format!("SELECT {} FROM referral WHERE id = ?", REFERRAL_COLUMNS))
            .bind(referral_id)
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(referral_from_row).transpose()
    }

    async fn require(&self, referral_id: &str) -> MarketResult<Referral> {
        self.get(referral_id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("Referral {} not found", referral_id)))
    }

    pub async fn list_for_referrer(&self, referrer_id: &str) -> MarketResult<Vec<Referral>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM referral WHERE referrer_id = ? ORDER BY date_referred DESC",
            REFERRAL_COLUMNS
        ))
        .bind(referrer_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(referral_from_row).collect()
    }
}

fn referral_from_row(row: &SqliteRow) -> MarketResult<Referral> {
    let status: String = row.get("status");
    let date_referred: String = row.get("date_referred");
    let updated_at: String = row.get("updated_at");

    Ok(Referral {
        id: row.get("id"),
        referrer_id: row.get("referrer_id"),
        rep_name: row.get("rep_name"),
        rep_initials: row.get("rep_initials"),
        status: ReferralStatus::from_str(&status)?,
        credit_earned: row.get("credit_earned"),
        date_referred: decode_ts(&date_referred)?,
        updated_at: decode_ts(&updated_at)?,
    })
}
