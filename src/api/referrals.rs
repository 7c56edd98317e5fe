/// Vendor referral endpoints
use crate::{auth::AuthContext, error::MarketResult, network::Referral, AppContext};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

/// Build referral routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/", post(create_referral).get(list_referrals))
        .route("/:id/confirm", post(confirm_referral))
        .route("/:id/decline", post(decline_referral))
}

#[derive(Debug, Deserialize)]
struct CreateReferralRequest {
    rep_name: String,
    rep_initials: String,
}

async fn create_referral(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<CreateReferralRequest>,
) -> MarketResult<(StatusCode, Json<Referral>)> {
    let referral = ctx
        .referrals
        .create_referral(&auth.actor, &req.rep_name, &req.rep_initials)
        .await?;

    Ok((StatusCode::CREATED, Json(referral)))
}

async fn list_referrals(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> MarketResult<Json<Vec<Referral>>> {
    Ok(Json(ctx.referrals.list_for_referrer(&auth.actor.user_id).await?))
}

async fn confirm_referral(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> MarketResult<Json<Referral>> {
    Ok(Json(ctx.referrals.confirm(&auth.actor, &id).await?))
}

async fn decline_referral(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> MarketResult<Json<Referral>> {
    Ok(Json(ctx.referrals.decline(&auth.actor, &id).await?))
}
