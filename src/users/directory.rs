/// User directory backed by the `app_user` table
use super::{Role, User};
use crate::{
    db::{begin_immediate, decode_ts, encode_ts},
    error::{MarketError, MarketResult},
    ledger::CreditLedger,
};
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqliteExecutor, SqlitePool};

const USER_COLUMNS: &str = "id, display_name, role, trust_score, is_active, created_at";

#[derive(Clone)]
pub struct UserDirectory {
    db: SqlitePool,
    initial_trust_score: i64,
}

impl UserDirectory {
    pub fn new(db: SqlitePool, initial_trust_score: i64) -> Self {
        Self {
            db,
            initial_trust_score,
        }
    }

    /// Register a user and open their credit account
    pub async fn create_user(&self, id: &str, display_name: &str, role: Role) -> MarketResult<User> {
        if id.trim().is_empty() {
            return Err(MarketError::Validation("User id cannot be empty".to_string()));
        }
        if display_name.trim().is_empty() {
            return Err(MarketError::Validation("Display name cannot be empty".to_string()));
        }

        let now = Utc::now();
        let mut tx = begin_immediate(&self.db).await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO app_user (id, display_name, role, trust_score, is_active, created_at)
            VALUES (?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(id)
        .bind(display_name)
        .bind(role.as_str())
        .bind(self.initial_trust_score)
        .bind(encode_ts(now))
        .execute(&mut *tx)
        .await
        .map_err(MarketError::from);

        if let Err(e) = inserted {
            if e.is_unique_violation() {
                return Err(MarketError::Conflict(format!("User {} already exists", id)));
            }
            return Err(e);
        }

        CreditLedger::open_account_in(&mut tx, id, now).await?;
        tx.commit().await?;

        tracing::info!("Created {} user {}", role.as_str(), id);

        Ok(User {
            id: id.to_string(),
            display_name: display_name.to_string(),
            role,
            trust_score: self.initial_trust_score,
            is_active: true,
            created_at: now,
        })
    }

    pub async fn get_user(&self, id: &str) -> MarketResult<Option<User>> {
        fetch_user(&self.db, id).await
    }

    /// Get a user or fail with `NotFound`
    pub async fn require_user(&self, id: &str) -> MarketResult<User> {
        self.get_user(id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("User {} not found", id)))
    }

    /// Get a user that may act on the platform
    pub async fn require_active_user(&self, id: &str) -> MarketResult<User> {
        let user = self.require_user(id).await?;
        if !user.is_active {
            return Err(MarketError::Unauthorized(format!("User {} is deactivated", id)));
        }
        Ok(user)
    }

    pub async fn list_users(&self, limit: i64) -> MarketResult<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM app_user ORDER BY created_at DESC LIMIT ?",
            USER_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(user_from_row).collect()
    }
}

/// Load a user through any executor (pool or open transaction)
pub(crate) async fn fetch_user<'e, E>(executor: E, id: &str) -> MarketResult<Option<User>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(&format!("SELECT {} FROM app_user WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(user_from_row).transpose()
}

fn user_from_row(row: &SqliteRow) -> MarketResult<User> {
    let role: String = row.get("role");
    let created_at: String = row.get("created_at");

    Ok(User {
        id: row.get("id"),
        display_name: row.get("display_name"),
        role: Role::from_str(&role)?,
        trust_score: row.get("trust_score"),
        is_active: row.get("is_active"),
        created_at: decode_ts(&created_at)?,
    })
}
