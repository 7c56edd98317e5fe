/// Credit balance and spending endpoints
use super::LimitQuery;
use crate::{
    auth::AuthContext,
    error::MarketResult,
    ledger::{CreditAccount, CreditTransaction, LedgerAudit, TransactionReference},
    AppContext,
};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

/// Build credit routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/account", get(get_account))
        .route("/transactions", get(list_transactions))
        .route("/spend", post(spend))
        .route("/verify", get(verify_conservation))
}

async fn get_account(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> MarketResult<Json<CreditAccount>> {
    Ok(Json(ctx.ledger.get_account(&auth.actor.user_id).await?))
}

async fn list_transactions(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(query): Query<LimitQuery>,
) -> MarketResult<Json<Vec<CreditTransaction>>> {
    let transactions = ctx
        .ledger
        .list_transactions(&auth.actor.user_id, query.limit())
        .await?;

    Ok(Json(transactions))
}

#[derive(Debug, Deserialize)]
struct SpendRequest {
    amount: i64,
    reference_type: String,
    reference_id: String,
}

/// Spend the caller's credits, e.g. to unlock a contact
async fn spend(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<SpendRequest>,
) -> MarketResult<Json<CreditTransaction>> {
    let transaction = ctx
        .ledger
        .spend(
            &auth.actor,
            req.amount,
            TransactionReference::new(req.reference_type, req.reference_id),
        )
        .await?;

    Ok(Json(transaction))
}

async fn verify_conservation(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> MarketResult<Json<LedgerAudit>> {
    Ok(Json(ctx.ledger.verify_conservation(&auth.actor.user_id).await?))
}
