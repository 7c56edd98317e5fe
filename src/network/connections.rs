/// Connection request manager
use super::{ConnectionRequest, ConnectionStatus, MAX_PERSONAL_MESSAGE_LEN};
use crate::{
    db::{decode_ts, encode_ts},
    error::{MarketError, MarketResult},
    users::{directory::fetch_user, ActorContext},
};
use chrono::{DateTime, Duration, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

const REQUEST_COLUMNS: &str =
    "id, sender_id, recipient_id, status, personal_message, created_at, updated_at, expires_at";

#[derive(Clone)]
pub struct ConnectionRequests {
    db: SqlitePool,
    expiry: Duration,
}

impl ConnectionRequests {
    pub fn new(db: SqlitePool, expiry: Duration) -> Self {
        Self { db, expiry }
    }

    /// Send a connection request from the actor
    pub async fn send(
        &self,
        actor: &ActorContext,
        recipient_id: &str,
        personal_message: Option<String>,
    ) -> MarketResult<ConnectionRequest> {
        if actor.user_id == recipient_id {
            return Err(MarketError::Validation(
                "Cannot send a connection request to yourself".to_string(),
            ));
        }

        let personal_message = personal_message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        if let Some(ref message) = personal_message {
            if message.chars().count() > MAX_PERSONAL_MESSAGE_LEN {
                return Err(MarketError::Validation(format!(
                    "Personal message exceeds {} characters",
                    MAX_PERSONAL_MESSAGE_LEN
                )));
            }
        }

        let sender = fetch_user(&self.db, &actor.user_id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("User {} not found", actor.user_id)))?;
        if !sender.is_active {
            return Err(MarketError::Unauthorized(format!("User {} is deactivated", sender.id)));
        }
        if fetch_user(&self.db, recipient_id).await?.is_none() {
            return Err(MarketError::NotFound(format!("User {} not found", recipient_id)));
        }

        let now = Utc::now();
        let expires_at = now + self.expiry;
        let id = Uuid::new_v4().to_string();

        // Insert only if no live pending request exists for the same pair
        let result = sqlx::query(
            r#"
            INSERT INTO connection_request
            (id, sender_id, recipient_id, status, personal_message, created_at, updated_at, expires_at)
            SELECT ?1, ?2, ?3, 'pending', ?4, ?5, ?5, ?6
            WHERE NOT EXISTS (
                SELECT 1 FROM connection_request
                WHERE sender_id = ?2 AND recipient_id = ?3
                  AND status = 'pending' AND expires_at > ?5
            )
            "#,
        )
        .bind(&id)
        .bind(&actor.user_id)
        .bind(recipient_id)
        .bind(&personal_message)
        .bind(encode_ts(now))
        .bind(encode_ts(expires_at))
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MarketError::Conflict(format!(
                "A pending request to {} already exists",
                recipient_id
            )));
        }

        tracing::info!(
            "Connection request {} sent {} -> {} (expires {})",
            id,
            actor.user_id,
            recipient_id,
            expires_at
        );

        Ok(ConnectionRequest {
            id,
            sender_id: actor.user_id.clone(),
            recipient_id: recipient_id.to_string(),
            status: ConnectionStatus::Pending,
            personal_message,
            created_at: now,
            updated_at: now,
            expires_at,
        })
    }

    /// Withdraw a pending request; sender only
    pub async fn cancel(&self, actor: &ActorContext, request_id: &str) -> MarketResult<ConnectionRequest> {
        let request = self.require(request_id).await?;
        if request.sender_id != actor.user_id {
            return Err(MarketError::Unauthorized(
                "Only the sender can cancel a connection request".to_string(),
            ));
        }

        self.transition(&request, ConnectionStatus::Cancelled).await
    }

    /// Accept or reject a pending request; recipient only
    pub async fn respond(
        &self,
        actor: &ActorContext,
        request_id: &str,
        accept: bool,
    ) -> MarketResult<ConnectionRequest> {
        let request = self.require(request_id).await?;
        if request.recipient_id != actor.user_id {
            return Err(MarketError::Unauthorized(
                "Only the recipient can respond to a connection request".to_string(),
            ));
        }

        let next = if accept {
            ConnectionStatus::Accepted
        } else {
            ConnectionStatus::Rejected
        };
        self.transition(&request, next).await
    }

    /// Move a live pending request to `next`
    async fn transition(
        &self,
        request: &ConnectionRequest,
        next: ConnectionStatus,
    ) -> MarketResult<ConnectionRequest> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE connection_request
            SET status = ?, updated_at = ?
            WHERE id = ? AND status = 'pending' AND expires_at > ?
            "#,
        )
        .bind(next.as_str())
        .bind(encode_ts(now))
        .bind(&request.id)
        .bind(encode_ts(now))
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            let current = self.require(&request.id).await?.effective_status(now);
            tracing::warn!(
                "Rejected {} of connection request {}: currently {}",
                next.as_str(),
                request.id,
                current.as_str()
            );
            return Err(MarketError::Conflict(format!(
                "Connection request is {}, not pending",
                current.as_str()
            )));
        }

        tracing::info!("Connection request {} -> {}", request.id, next.as_str());

        Ok(ConnectionRequest {
            status: next,
            updated_at: now,
            ..request.clone()
        })
    }

    pub async fn get(&self, request_id: &str) -> MarketResult<Option<ConnectionRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM connection_request WHERE id = ?",
            REQUEST_COLUMNS
        ))
        .bind(request_id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(request_from_row).transpose()
    }

    async fn require(&self, request_id: &str) -> MarketResult<ConnectionRequest> {
        self.get(request_id).await?.ok_or_else(|| {
            MarketError::NotFound(format!("Connection request {} not found", request_id))
        })
    }

    /// Fetch a request on behalf of one of its two participants
    pub async fn get_for(&self, actor: &ActorContext, request_id: &str) -> MarketResult<ConnectionRequest> {
        let request = self.require(request_id).await?;
        if request.sender_id != actor.user_id && request.recipient_id != actor.user_id {
            return Err(MarketError::Unauthorized(
                "Only the sender or recipient can view a connection request".to_string(),
            ));
        }
        Ok(request)
    }

    /// Requests received by a user, newest first
    pub async fn list_incoming(&self, user_id: &str) -> MarketResult<Vec<ConnectionRequest>> {
        self.list_by("recipient_id", user_id).await
    }

    /// Requests sent by a user, newest first
    pub async fn list_outgoing(&self, user_id: &str) -> MarketResult<Vec<ConnectionRequest>> {
        self.list_by("sender_id", user_id).await
    }

    async fn list_by(&self, column: &'static str, user_id: &str) -> MarketResult<Vec<ConnectionRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM connection_request WHERE {} = ? ORDER BY created_at DESC",
            REQUEST_COLUMNS, column
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(request_from_row).collect()
    }

    /// Pending requests to a user that can still be answered at `now`
    pub async fn live_incoming(&self, user_id: &str, now: DateTime<Utc>) -> MarketResult<Vec<ConnectionRequest>> {
        Ok(self
            .list_incoming(user_id)
            .await?
            .into_iter()
            .filter(|r| r.effective_status(now) == ConnectionStatus::Pending)
            .collect())
    }
}

fn request_from_row(row: &SqliteRow) -> MarketResult<ConnectionRequest> {
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let expires_at: String = row.get("expires_at");

    Ok(ConnectionRequest {
        id: row.get("id"),
        sender_id: row.get("sender_id"),
        recipient_id: row.get("recipient_id"),
        status: ConnectionStatus::from_str(&status)?,
        personal_message: row.get("personal_message"),
        created_at: decode_ts(&created_at)?,
        updated_at: decode_ts(&updated_at)?,
        expires_at: decode_ts(&expires_at)?,
    })
}
