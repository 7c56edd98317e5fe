/// Admin audit log
use super::AuditLogEntry;
use crate::{
    db::{decode_ts, encode_ts},
    error::MarketResult,
};
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};

#[derive(Clone)]
pub struct AuditLog {
    db: SqlitePool,
}

impl AuditLog {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Append an entry inside the caller's transaction
    pub(crate) async fn log_action_in(
        conn: &mut SqliteConnection,
        admin_id: &str,
        action: &str,
        subject_id: Option<&str>,
        details: &serde_json::Value,
    ) -> MarketResult<()> {
        sqlx::query(
            r#"
            INSERT INTO admin_audit_log (admin_id, action, subject_id, details, timestamp)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(admin_id)
        .bind(action)
        .bind(subject_id)
        .bind(details.to_string())
        .bind(encode_ts(Utc::now()))
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Most recent entries, newest first
    pub async fn recent(&self, limit: i64) -> MarketResult<Vec<AuditLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, admin_id, action, subject_id, details, timestamp
            FROM admin_audit_log
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    /// Every entry about one subject, newest first
    pub async fn for_subject(&self, subject_id: &str) -> MarketResult<Vec<AuditLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, admin_id, action, subject_id, details, timestamp
            FROM admin_audit_log
            WHERE subject_id = ?
            ORDER BY id DESC
            "#,
        )
        .bind(subject_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }
}

fn entry_from_row(row: &SqliteRow) -> MarketResult<AuditLogEntry> {
    let details: Option<String> = row.get("details");
    let timestamp: String = row.get("timestamp");

    Ok(AuditLogEntry {
        id: row.get("id"),
        admin_id: row.get("admin_id"),
        action: row.get("action"),
        subject_id: row.get("subject_id"),
        // Entries are written by this module; anything unparseable is kept as text
        details: details.map(|raw| {
            serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
        }),
        timestamp: decode_ts(&timestamp)?,
    })
}
