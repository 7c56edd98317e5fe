/// Admin overrides manager
use super::{actions, AuditLog, AuditLogEntry};
use crate::{
    db::begin_immediate,
    error::{MarketError, MarketResult},
    ledger::{CreditLedger, CreditTransaction, TransactionRequest},
    trust::{MAX_TRUST_SCORE, MIN_TRUST_SCORE},
    users::{directory::fetch_user, ActorContext, Role, User},
};
use serde_json::json;
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct AdminOverrides {
    db: SqlitePool,
    audit: AuditLog,
    min_reason_len: usize,
}

impl AdminOverrides {
    pub fn new(db: SqlitePool, min_reason_len: usize) -> Self {
        Self {
            audit: AuditLog::new(db.clone()),
            db,
            min_reason_len,
        }
    }

    fn check_reason<'a>(&self, reason: &'a str) -> MarketResult<&'a str> {
        let reason = reason.trim();
        if reason.chars().count() < self.min_reason_len {
            return Err(MarketError::Validation(format!(
                "Override reason must be at least {} characters",
                self.min_reason_len
            )));
        }
        Ok(reason)
    }

    /// Add credits to a user's balance
    pub async fn grant_credits(
        &self,
        actor: &ActorContext,
        user_id: &str,
        amount: i64,
        reason: &str,
    ) -> MarketResult<CreditTransaction> {
        check_amount(amount)?;
        self.adjust_credits(actor, user_id, amount, reason, actions::CREDIT_GRANT)
            .await
    }

    /// Remove credits from a user's balance. The balance may go negative.
    pub async fn deduct_credits(
        &self,
        actor: &ActorContext,
        user_id: &str,
        amount: i64,
        reason: &str,
    ) -> MarketResult<CreditTransaction> {
        check_amount(amount)?;
        self.adjust_credits(actor, user_id, -amount, reason, actions::CREDIT_DEDUCT)
            .await
    }

    async fn adjust_credits(
        &self,
        actor: &ActorContext,
        user_id: &str,
        signed_amount: i64,
        reason: &str,
        action: &str,
    ) -> MarketResult<CreditTransaction> {
        actor.require_admin()?;
        let reason = self.check_reason(reason)?;
        let magnitude = signed_amount.abs();

        let mut tx = begin_immediate(&self.db).await?;

        let transaction = CreditLedger::apply_in(
            &mut tx,
            &TransactionRequest::admin_override(user_id, signed_amount, &actor.user_id, reason),
        )
        .await?;

        AuditLog::log_action_in(
            &mut tx,
            &actor.user_id,
            action,
            Some(user_id),
            &json!({
                "amount": magnitude,
                "reason": reason,
                "transaction_id": transaction.id,
                "balance_after": transaction.balance_after,
            }),
        )
        .await?;

        tx.commit().await?;

        CreditLedger::record_applied(&transaction);
        tracing::info!(
            "Admin {} applied {} of {} credits to {}: {}",
            actor.user_id,
            action,
            magnitude,
            user_id,
            reason
        );

        Ok(transaction)
    }

    /// Overwrite a user's trust score. Milestone bonuses are not granted.
    pub async fn set_trust_score(
        &self,
        actor: &ActorContext,
        user_id: &str,
        new_score: i64,
        reason: &str,
    ) -> MarketResult<User> {
        actor.require_admin()?;
        let reason = self.check_reason(reason)?;
        if !(MIN_TRUST_SCORE..=MAX_TRUST_SCORE).contains(&new_score) {
            return Err(MarketError::Validation(format!(
                "Trust score must be between {} and {}",
                MIN_TRUST_SCORE, MAX_TRUST_SCORE
            )));
        }

        let mut tx = begin_immediate(&self.db).await?;
        let user = require_user_in(&mut tx, user_id).await?;

        sqlx::query("UPDATE app_user SET trust_score = ? WHERE id = ?")
            .bind(new_score)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        AuditLog::log_action_in(
            &mut tx,
            &actor.user_id,
            actions::TRUST_SCORE_UPDATE,
            Some(user_id),
            &json!({
                "old_score": user.trust_score,
                "new_score": new_score,
                "reason": reason,
            }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Admin {} set trust score of {} from {} to {}",
            actor.user_id,
            user_id,
            user.trust_score,
            new_score
        );

        Ok(User {
            trust_score: new_score,
            ..user
        })
    }

    pub async fn update_user_role(
        &self,
        actor: &ActorContext,
        user_id: &str,
        role: Role,
    ) -> MarketResult<User> {
        actor.require_admin()?;
        if actor.user_id == user_id {
            return Err(MarketError::Validation(
                "Admins cannot change their own role".to_string(),
            ));
        }

        let mut tx = begin_immediate(&self.db).await?;
        let user = require_user_in(&mut tx, user_id).await?;

        sqlx::query("UPDATE app_user SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        AuditLog::log_action_in(
            &mut tx,
            &actor.user_id,
            actions::USER_ROLE_UPDATE,
            Some(user_id),
            &json!({
                "old_role": user.role.as_str(),
                "new_role": role.as_str(),
            }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Admin {} changed role of {} from {} to {}",
            actor.user_id,
            user_id,
            user.role.as_str(),
            role.as_str()
        );

        Ok(User { role, ..user })
    }

    /// Flip a user between active and deactivated
    pub async fn toggle_user_activation(
        &self,
        actor: &ActorContext,
        user_id: &str,
    ) -> MarketResult<User> {
        actor.require_admin()?;
        if actor.user_id == user_id {
            return Err(MarketError::Validation(
                "Admins cannot deactivate themselves".to_string(),
            ));
        }

        let mut tx = begin_immediate(&self.db).await?;

        let is_active: Option<bool> = sqlx::query_scalar(
            "UPDATE app_user SET is_active = NOT is_active WHERE id = ? RETURNING is_active",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let is_active = is_active
            .ok_or_else(|| MarketError::NotFound(format!("User {} not found", user_id)))?;

        AuditLog::log_action_in(
            &mut tx,
            &actor.user_id,
            actions::USER_ACTIVATION_TOGGLE,
            Some(user_id),
            &json!({ "is_active": is_active }),
        )
        .await?;

        let user = require_user_in(&mut tx, user_id).await?;
        tx.commit().await?;

        tracing::info!(
            "Admin {} {} user {}",
            actor.user_id,
            if is_active { "reactivated" } else { "deactivated" },
            user_id
        );

        Ok(user)
    }

    pub async fn audit_log(&self, actor: &ActorContext, limit: i64) -> MarketResult<Vec<AuditLogEntry>> {
        actor.require_admin()?;
        self.audit.recent(limit).await
    }

    pub async fn audit_log_for(
        &self,
        actor: &ActorContext,
        subject_id: &str,
    ) -> MarketResult<Vec<AuditLogEntry>> {
        actor.require_admin()?;
        self.audit.for_subject(subject_id).await
    }
}

fn check_amount(amount: i64) -> MarketResult<()> {
    if amount <= 0 {
        return Err(MarketError::Validation(
            "Override amount must be a positive number of credits".to_string(),
        ));
    }
    Ok(())
}

async fn require_user_in(conn: &mut sqlx::SqliteConnection, user_id: &str) -> MarketResult<User> {
    fetch_user(&mut *conn, user_id)
        .await?
        .ok_or_else(|| MarketError::NotFound(format!("User {} not found", user_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db,
        ledger::{TransactionKind, TransactionReference},
        users::UserDirectory,
    };

    struct Fixture {
        overrides: AdminOverrides,
        ledger: CreditLedger,
        users: UserDirectory,
        admin: ActorContext,
    }

    async fn setup() -> Fixture {
        let pool = db::memory_pool().await.unwrap();
        let users = UserDirectory::new(pool.clone(), 50);
        users.create_user("admin-1", "Ops", Role::Admin).await.unwrap();
        users.create_user("rep-1", "Rita", Role::FieldRep).await.unwrap();

        Fixture {
            overrides: AdminOverrides::new(pool.clone(), 3),
            ledger: CreditLedger::new(pool),
            users,
            admin: ActorContext::new("admin-1", Role::Admin),
        }
    }

    #[tokio::test]
    async fn test_grant_is_ledgered_and_audited() {
        let f = setup().await;

        let tx = f
            .overrides
            .grant_credits(&f.admin, "rep-1", 10, "promo")
            .await
            .unwrap();
        assert_eq!(tx.kind, TransactionKind::AdminOverride);
        assert_eq!(tx.amount, 10);
        assert_eq!(tx.metadata.admin_id.as_deref(), Some("admin-1"));
        assert_eq!(tx.metadata.reason.as_deref(), Some("promo"));

        let entries = f.overrides.audit_log_for(&f.admin, "rep-1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, actions::CREDIT_GRANT);
        assert_eq!(entries[0].details.as_ref().unwrap()["transaction_id"], tx.id.as_str());
    }

    #[tokio::test]
    async fn test_deduct_may_overdraw() {
        let f = setup().await;

        let tx = f
            .overrides
            .deduct_credits(&f.admin, "rep-1", 4, "chargeback")
            .await
            .unwrap();
        assert_eq!(tx.amount, -4);
        assert_eq!(tx.balance_after, -4);
        assert!(f.ledger.verify_conservation("rep-1").await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_overrides_require_admin_and_reason() {
        let f = setup().await;
        let rep = ActorContext::new("rep-1", Role::FieldRep);

        assert!(matches!(
            f.overrides.grant_credits(&rep, "rep-1", 10, "promo").await,
            Err(MarketError::Unauthorized(_))
        ));
        assert!(matches!(
            f.overrides.grant_credits(&f.admin, "rep-1", 10, "  ").await,
            Err(MarketError::Validation(_))
        ));
        assert!(matches!(
            f.overrides.grant_credits(&f.admin, "rep-1", 0, "promo").await,
            Err(MarketError::Validation(_))
        ));
        assert!(matches!(
            f.overrides.deduct_credits(&f.admin, "rep-1", -5, "promo").await,
            Err(MarketError::Validation(_))
        ));

        assert_eq!(f.ledger.get_account("rep-1").await.unwrap().current_balance, 0);
        assert!(f.overrides.audit_log(&f.admin, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_worked_example() {
        let f = setup().await;
        let rep = ActorContext::new("rep-1", Role::FieldRep);

        f.ledger
            .purchase(&rep, 5, TransactionReference::new("checkout", "order-1"))
            .await
            .unwrap();
        f.overrides
            .grant_credits(&f.admin, "rep-1", 10, "promo")
            .await
            .unwrap();
        assert_eq!(f.ledger.get_account("rep-1").await.unwrap().current_balance, 15);

        f.ledger
            .spend(&rep, 3, TransactionReference::new("contact_unlock", "vendor-9"))
            .await
            .unwrap();
        assert_eq!(f.ledger.get_account("rep-1").await.unwrap().current_balance, 12);

        let rejected = f
            .ledger
            .spend(&rep, 20, TransactionReference::new("contact_unlock", "vendor-10"))
            .await;
        assert!(matches!(
            rejected,
            Err(MarketError::InsufficientBalance { requested: 20, available: 12 })
        ));
        assert_eq!(f.ledger.get_account("rep-1").await.unwrap().current_balance, 12);
    }

    #[tokio::test]
    async fn test_set_trust_score_audits_old_and_new() {
        let f = setup().await;

        let user = f
            .overrides
            .set_trust_score(&f.admin, "rep-1", 95, "appeal upheld")
            .await
            .unwrap();
        assert_eq!(user.trust_score, 95);

        let entries = f.overrides.audit_log_for(&f.admin, "rep-1").await.unwrap();
        let details = entries[0].details.as_ref().unwrap();
        assert_eq!(entries[0].action, actions::TRUST_SCORE_UPDATE);
        assert_eq!(details["old_score"], 50);
        assert_eq!(details["new_score"], 95);
        assert_eq!(details["reason"], "appeal upheld");

        // Crossing a milestone by override pays nothing
        assert!(f.ledger.list_transactions("rep-1", 10).await.unwrap().is_empty());

        assert!(matches!(
            f.overrides.set_trust_score(&f.admin, "rep-1", 101, "typo fix").await,
            Err(MarketError::Validation(_))
        ));
        assert!(matches!(
            f.overrides.set_trust_score(&f.admin, "ghost", 10, "typo fix").await,
            Err(MarketError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_role_and_activation_changes() {
        let f = setup().await;

        let user = f
            .overrides
            .update_user_role(&f.admin, "rep-1", Role::Vendor)
            .await
            .unwrap();
        assert_eq!(user.role, Role::Vendor);

        let user = f.overrides.toggle_user_activation(&f.admin, "rep-1").await.unwrap();
        assert!(!user.is_active);
        let user = f.overrides.toggle_user_activation(&f.admin, "rep-1").await.unwrap();
        assert!(user.is_active);

        assert!(matches!(
            f.overrides.toggle_user_activation(&f.admin, "admin-1").await,
            Err(MarketError::Validation(_))
        ));
        assert_eq!(f.users.require_user("rep-1").await.unwrap().role, Role::Vendor);

        let actions_logged: Vec<String> = f
            .overrides
            .audit_log(&f.admin, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(
            actions_logged,
            vec![
                actions::USER_ACTIVATION_TOGGLE,
                actions::USER_ACTIVATION_TOGGLE,
                actions::USER_ROLE_UPDATE
            ]
        );
    }
}
