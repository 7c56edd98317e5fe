/// Background task implementations
use crate::{context::AppContext, error::MarketResult, metrics};

/// Audit every account; returns how many drifted from their ledger.
///
/// Drift is reported, never repaired.
pub async fn audit_ledger(ctx: &AppContext) -> MarketResult<usize> {
    let drifted = ctx.ledger.audit_all().await?;
    metrics::record_ledger_drift(drifted.len());
    Ok(drifted.len())
}

/// Health check - verify the database answers
pub async fn health_check(ctx: &AppContext) -> MarketResult<()> {
    crate::db::test_connection(&ctx.db).await
}
