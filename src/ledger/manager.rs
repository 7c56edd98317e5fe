/// Credit ledger manager
use super::{
    CreditAccount, CreditTransaction, LedgerAudit, TransactionKind, TransactionMetadata,
    TransactionReference, TransactionRequest,
};
use crate::{
    db::{begin_immediate, decode_ts, encode_ts},
    error::{MarketError, MarketResult},
    metrics,
    users::ActorContext,
};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

#[derive(Clone)]
pub struct CreditLedger {
    db: SqlitePool,
}

impl CreditLedger {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create an empty account inside an open transaction
    pub(crate) async fn open_account_in(
        conn: &mut SqliteConnection,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> MarketResult<()> {
        sqlx::query(
            r#"
            INSERT INTO credit_account (user_id, current_balance, earned_credits, purchased_credits, updated_at)
            VALUES (?, 0, 0, 0, ?)
            "#,
        )
        .bind(user_id)
        .bind(encode_ts(now))
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Apply a balance change and record it, atomically
    pub async fn apply_transaction(
        &self,
        request: TransactionRequest,
    ) -> MarketResult<CreditTransaction> {
        let mut tx = begin_immediate(&self.db).await?;
        let transaction = Self::apply_in(&mut tx, &request).await?;
        tx.commit().await?;

        Self::record_applied(&transaction);
        Ok(transaction)
    }

    /// Apply a balance change inside a caller-owned transaction.
    ///
    /// The caller must commit; callers that commit should follow up with
    /// `record_applied` for each returned entry.
    pub(crate) async fn apply_in(
        conn: &mut SqliteConnection,
        request: &TransactionRequest,
    ) -> MarketResult<CreditTransaction> {
        request.validate()?;

        let now = Utc::now();
        let earned = if request.kind == TransactionKind::Earned { request.amount } else { 0 };
        let purchased = if request.kind == TransactionKind::Purchased { request.amount } else { 0 };

        // Single conditional write: the floor check and the update cannot interleave
        // with another writer. Admin overrides skip the floor.
        let enforce_floor = request.kind != TransactionKind::AdminOverride;
        let balance_after: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE credit_account
            SET current_balance = current_balance + ?1,
                earned_credits = earned_credits + ?2,
                purchased_credits = purchased_credits + ?3,
                updated_at = ?4
            WHERE user_id = ?5
              AND (?6 = 0 OR current_balance + ?1 >= 0)
            RETURNING current_balance
            "#,
        )
        .bind(request.amount)
        .bind(earned)
        .bind(purchased)
        .bind(encode_ts(now))
        .bind(&request.user_id)
        .bind(enforce_floor)
        .fetch_optional(&mut *conn)
        .await?;

        let balance_after = match balance_after {
            Some(balance) => balance,
            None => {
                let available: Option<i64> = sqlx::query_scalar(
                    "SELECT current_balance FROM credit_account WHERE user_id = ?",
                )
                .bind(&request.user_id)
                .fetch_optional(&mut *conn)
                .await?;

                return match available {
                    None => Err(MarketError::NotFound(format!(
                        "Credit account for {} not found",
                        request.user_id
                    ))),
                    Some(available) => {
                        tracing::warn!(
                            "Rejected {} of {} credits for {}: balance {}",
                            request.kind.as_str(),
                            -request.amount,
                            request.user_id,
                            available
                        );
                        Err(MarketError::InsufficientBalance {
                            requested: -request.amount,
                            available,
                        })
                    }
                };
            }
        };

        let id = Uuid::new_v4().to_string();
        let (reference_type, reference_id) = match &request.reference {
            Some(r) => (Some(r.reference_type.as_str()), Some(r.reference_id.as_str())),
            None => (None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO credit_transaction
            (id, user_id, amount, kind, reference_type, reference_id, reason, admin_id, balance_after, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&request.user_id)
        .bind(request.amount)
        .bind(request.kind.as_str())
        .bind(reference_type)
        .bind(reference_id)
        .bind(&request.metadata.reason)
        .bind(&request.metadata.admin_id)
        .bind(balance_after)
        .bind(encode_ts(now))
        .execute(&mut *conn)
        .await?;

        Ok(CreditTransaction {
            id,
            user_id: request.user_id.clone(),
            amount: request.amount,
            kind: request.kind,
            reference: request.reference.clone(),
            metadata: request.metadata.clone(),
            balance_after,
            created_at: now,
        })
    }

    /// Log and count a committed entry
    pub(crate) fn record_applied(transaction: &CreditTransaction) {
        metrics::record_transaction(transaction.kind.as_str());
        tracing::info!(
            "Ledger {} {:+} for {} (balance {})",
            transaction.kind.as_str(),
            transaction.amount,
            transaction.user_id,
            transaction.balance_after
        );
    }

    /// Spend the actor's own credits
    pub async fn spend(
        &self,
        actor: &ActorContext,
        amount: i64,
        reference: TransactionReference,
    ) -> MarketResult<CreditTransaction> {
        if amount <= 0 {
            return Err(MarketError::Validation("Spend amount must be positive".to_string()));
        }

        self.apply_transaction(TransactionRequest::spent(&actor.user_id, amount, reference))
            .await
    }

    /// Credit a billing purchase to the actor
    pub async fn purchase(
        &self,
        actor: &ActorContext,
        amount: i64,
        reference: TransactionReference,
    ) -> MarketResult<CreditTransaction> {
        self.apply_transaction(TransactionRequest::purchased(&actor.user_id, amount, reference))
            .await
    }

    pub async fn get_account(&self, user_id: &str) -> MarketResult<CreditAccount> {
        let row = sqlx::query(
            r#"
            SELECT user_id, current_balance, earned_credits, purchased_credits, updated_at
            FROM credit_account
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        let row = row.ok_or_else(|| {
            MarketError::NotFound(format!("Credit account for {} not found", user_id))
        })?;

        let updated_at: String = row.get("updated_at");
        Ok(CreditAccount {
            user_id: row.get("user_id"),
            current_balance: row.get("current_balance"),
            earned_credits: row.get("earned_credits"),
            purchased_credits: row.get("purchased_credits"),
            updated_at: decode_ts(&updated_at)?,
        })
    }

    /// Most recent transactions first
    pub async fn list_transactions(
        &self,
        user_id: &str,
        limit: i64,
    ) -> MarketResult<Vec<CreditTransaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, amount, kind, reference_type, reference_id, reason, admin_id,
                   balance_after, created_at
            FROM credit_transaction
            WHERE user_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(transaction_from_row).collect()
    }

    /// Compare one account's balance with the sum of its ledger
    pub async fn verify_conservation(&self, user_id: &str) -> MarketResult<LedgerAudit> {
        let row = sqlx::query(
            r#"
            SELECT a.current_balance AS balance,
                   (SELECT COALESCE(SUM(t.amount), 0) FROM credit_transaction t WHERE t.user_id = a.user_id) AS ledger_sum
            FROM credit_account a
            WHERE a.user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| MarketError::NotFound(format!("Credit account for {} not found", user_id)))?;

        Ok(LedgerAudit {
            user_id: user_id.to_string(),
            balance: row.get("balance"),
            ledger_sum: row.get("ledger_sum"),
        })
    }

    /// Every account whose balance disagrees with its ledger
    pub async fn audit_all(&self) -> MarketResult<Vec<LedgerAudit>> {
        let rows = sqlx::query(
            r#"
            SELECT a.user_id AS user_id,
                   a.current_balance AS balance,
                   COALESCE(SUM(t.amount), 0) AS ledger_sum
            FROM credit_account a
            LEFT JOIN credit_transaction t ON t.user_id = a.user_id
            GROUP BY a.user_id, a.current_balance
            HAVING a.current_balance <> COALESCE(SUM(t.amount), 0)
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let drifted: Vec<LedgerAudit> = rows
            .iter()
            .map(|row| LedgerAudit {
                user_id: row.get("user_id"),
                balance: row.get("balance"),
                ledger_sum: row.get("ledger_sum"),
            })
            .collect();

        for audit in &drifted {
            tracing::warn!(
                "Ledger drift for {}: balance {} vs ledger {}",
                audit.user_id,
                audit.balance,
                audit.ledger_sum
            );
        }

        Ok(drifted)
    }
}

fn transaction_from_row(row: &SqliteRow) -> MarketResult<CreditTransaction> {
    let kind: String = row.get("kind");
    let created_at: String = row.get("created_at");
    let reference_type: Option<String> = row.get("reference_type");
    let reference_id: Option<String> = row.get("reference_id");

    let reference = match (reference_type, reference_id) {
        (Some(reference_type), Some(reference_id)) => Some(TransactionReference {
            reference_type,
            reference_id,
        }),
        _ => None,
    };

    Ok(CreditTransaction {
        id: row.get("id"),
        user_id: row.get("user_id"),
        amount: row.get("amount"),
        kind: TransactionKind::from_str(&kind)?,
        reference,
        metadata: TransactionMetadata {
            reason: row.get("reason"),
            admin_id: row.get("admin_id"),
        },
        balance_after: row.get("balance_after"),
        created_at: decode_ts(&created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db,
        users::{Role, UserDirectory},
    };

    async fn setup() -> (SqlitePool, CreditLedger) {
        let pool = db::memory_pool().await.unwrap();
        let users = UserDirectory::new(pool.clone(), 50);
        users.create_user("rep-a", "Rep A", Role::FieldRep).await.unwrap();
        (pool.clone(), CreditLedger::new(pool))
    }

    fn unlock(id: &str) -> TransactionReference {
        TransactionReference::new("contact_unlock", id)
    }

    #[tokio::test]
    async fn test_earned_updates_balance_and_totals() {
        let (_pool, ledger) = setup().await;

        let tx = ledger
            .apply_transaction(TransactionRequest::earned("rep-a", 4, TransactionReference::new("trust_review", "r1")))
            .await
            .unwrap();
        assert_eq!(tx.balance_after, 4);

        let account = ledger.get_account("rep-a").await.unwrap();
        assert_eq!(account.current_balance, 4);
        assert_eq!(account.earned_credits, 4);
        assert_eq!(account.purchased_credits, 0);
    }

    #[tokio::test]
    async fn test_spend_beyond_balance_is_rejected_without_side_effects() {
        let (_pool, ledger) = setup().await;
        let actor = ActorContext::new("rep-a", Role::FieldRep);

        ledger.purchase(&actor, 2, TransactionReference::new("invoice", "inv-1")).await.unwrap();

        let err = ledger.spend(&actor, 5, unlock("v-9")).await.unwrap_err();
        assert!(matches!(
            err,
            MarketError::InsufficientBalance { requested: 5, available: 2 }
        ));

        let account = ledger.get_account("rep-a").await.unwrap();
        assert_eq!(account.current_balance, 2);
        assert_eq!(account.purchased_credits, 2);
        assert_eq!(ledger.list_transactions("rep-a", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_admin_override_may_go_below_zero() {
        let (_pool, ledger) = setup().await;

        let tx = ledger
            .apply_transaction(TransactionRequest::admin_override("rep-a", -3, "admin-1", "chargeback"))
            .await
            .unwrap();
        assert_eq!(tx.balance_after, -3);
        assert_eq!(tx.metadata.admin_id.as_deref(), Some("admin-1"));

        assert!(ledger.verify_conservation("rep-a").await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_unknown_account_not_found() {
        let (_pool, ledger) = setup().await;

        let err = ledger
            .apply_transaction(TransactionRequest::earned("nobody", 1, unlock("x")))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::NotFound(_)));
        assert!(matches!(
            ledger.get_account("nobody").await,
            Err(MarketError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_transactions_are_append_only() {
        let (pool, ledger) = setup().await;

        let tx = ledger
            .apply_transaction(TransactionRequest::earned("rep-a", 1, unlock("x")))
            .await
            .unwrap();

        let update = sqlx::query("UPDATE credit_transaction SET amount = 100 WHERE id = ?")
            .bind(&tx.id)
            .execute(&pool)
            .await;
        assert!(update.is_err());

        let delete = sqlx::query("DELETE FROM credit_transaction WHERE id = ?")
            .bind(&tx.id)
            .execute(&pool)
            .await;
        assert!(delete.is_err());
    }

    #[tokio::test]
    async fn test_audit_detects_out_of_band_drift() {
        let (pool, ledger) = setup().await;

        ledger
            .apply_transaction(TransactionRequest::earned("rep-a", 3, unlock("x")))
            .await
            .unwrap();
        assert!(ledger.audit_all().await.unwrap().is_empty());

        sqlx::query("UPDATE credit_account SET current_balance = 10 WHERE user_id = 'rep-a'")
            .execute(&pool)
            .await
            .unwrap();

        let drifted = ledger.audit_all().await.unwrap();
        assert_eq!(drifted.len(), 1);
        assert_eq!(drifted[0].drift(), 7);
    }

    #[tokio::test]
    async fn test_list_transactions_newest_first() {
        let (_pool, ledger) = setup().await;
        let actor = ActorContext::new("rep-a", Role::FieldRep);

        ledger.purchase(&actor, 10, TransactionReference::new("invoice", "inv-1")).await.unwrap();
        ledger.spend(&actor, 4, unlock("v-1")).await.unwrap();

        let history = ledger.list_transactions("rep-a", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind, TransactionKind::Spent);
        assert_eq!(history[0].amount, -4);
        assert_eq!(history[0].balance_after, 6);
        assert_eq!(history[1].kind, TransactionKind::Purchased);
    }
}
