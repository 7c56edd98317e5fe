/// Peer review endpoints
use super::LimitQuery;
use crate::{
    auth::AuthContext,
    error::MarketResult,
    trust::{category_labels, ReviewOutcome, ReviewSubmission, TrustScoreReview},
    AppContext,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

/// Build review routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/", post(submit_review))
        .route("/eligibility/:user_id", get(can_submit_review))
        .route("/users/:user_id", get(reviews_for))
}

async fn submit_review(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(submission): Json<ReviewSubmission>,
) -> MarketResult<(StatusCode, Json<ReviewOutcome>)> {
    let outcome = ctx.trust.submit_review(&auth.actor, submission).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

#[derive(Debug, Serialize)]
struct EligibilityResponse {
    allowed: bool,
}

/// Whether the caller may review this user in the current week
async fn can_submit_review(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(user_id): Path<String>,
) -> MarketResult<Json<EligibilityResponse>> {
    let allowed = ctx.trust.can_submit_review(&auth.actor.user_id, &user_id).await?;
    Ok(Json(EligibilityResponse { allowed }))
}

#[derive(Debug, Serialize)]
struct UserReviewsResponse {
    user_id: String,
    trust_score: i64,
    categories: Option<[&'static str; 3]>,
    reviews: Vec<TrustScoreReview>,
}

async fn reviews_for(
    State(ctx): State<AppContext>,
    _auth: AuthContext,
    Path(user_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> MarketResult<Json<UserReviewsResponse>> {
    let user = ctx.users.require_user(&user_id).await?;
    let reviews = ctx.trust.reviews_for(&user_id, query.limit()).await?;

    Ok(Json(UserReviewsResponse {
        categories: category_labels(user.role),
        trust_score: user.trust_score,
        user_id: user.id,
        reviews,
    }))
}
