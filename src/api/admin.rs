/// Admin API Endpoints
///
/// Errors from these handlers carry the raw failure detail.
use super::LimitQuery;
use crate::{
    admin::AuditLogEntry,
    auth::AdminAuthContext,
    error::AdminError,
    ledger::{CreditTransaction, LedgerAudit},
    network::Referral,
    users::{Role, User},
    AppContext,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

type AdminResult<T> = Result<T, AdminError>;

/// Build admin API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        // Users
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", get(get_user))
        .route("/users/:id/role", put(update_user_role))
        .route("/users/:id/toggle-activation", post(toggle_user_activation))
        // Overrides
        .route("/users/:id/credits/grant", post(grant_credits))
        .route("/users/:id/credits/deduct", post(deduct_credits))
        .route("/users/:id/trust-score", put(set_trust_score))
        // Ledger and referrals
        .route("/ledger/audit", get(audit_ledger))
        .route("/referrals/:id/signed-up", post(mark_referral_signed_up))
        // Audit log
        .route("/audit-log", get(audit_log))
        .route("/audit-log/:subject_id", get(audit_log_for))
}

async fn list_users(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Query(query): Query<LimitQuery>,
) -> AdminResult<Json<Vec<User>>> {
    Ok(Json(ctx.users.list_users(query.limit()).await?))
}

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    id: String,
    display_name: String,
    role: Role,
}

async fn create_user(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Json(req): Json<CreateUserRequest>,
) -> AdminResult<(StatusCode, Json<User>)> {
    let user = ctx
        .users
        .create_user(&req.id, &req.display_name, req.role)
        .await?;

    tracing::info!("Admin {} created user {}", auth.actor.user_id, user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Path(id): Path<String>,
) -> AdminResult<Json<User>> {
    Ok(Json(ctx.users.require_user(&id).await?))
}

#[derive(Debug, Deserialize)]
struct UpdateRoleRequest {
    role: Role,
}

async fn update_user_role(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<String>,
    Json(req): Json<UpdateRoleRequest>,
) -> AdminResult<Json<User>> {
    Ok(Json(ctx.admin.update_user_role(&auth.actor, &id, req.role).await?))
}

async fn toggle_user_activation(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<String>,
) -> AdminResult<Json<User>> {
    Ok(Json(ctx.admin.toggle_user_activation(&auth.actor, &id).await?))
}

#[derive(Debug, Deserialize)]
struct CreditOverrideRequest {
    amount: i64,
    reason: String,
}

async fn grant_credits(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<String>,
    Json(req): Json<CreditOverrideRequest>,
) -> AdminResult<Json<CreditTransaction>> {
    let transaction = ctx
        .admin
        .grant_credits(&auth.actor, &id, req.amount, &req.reason)
        .await?;

    Ok(Json(transaction))
}

async fn deduct_credits(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<String>,
    Json(req): Json<CreditOverrideRequest>,
) -> AdminResult<Json<CreditTransaction>> {
    let transaction = ctx
        .admin
        .deduct_credits(&auth.actor, &id, req.amount, &req.reason)
        .await?;

    Ok(Json(transaction))
}

#[derive(Debug, Deserialize)]
struct TrustScoreRequest {
    score: i64,
    reason: String,
}

async fn set_trust_score(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<String>,
    Json(req): Json<TrustScoreRequest>,
) -> AdminResult<Json<User>> {
    let user = ctx
        .admin
        .set_trust_score(&auth.actor, &id, req.score, &req.reason)
        .await?;

    Ok(Json(user))
}

/// Accounts whose balance disagrees with their ledger
async fn audit_ledger(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
) -> AdminResult<Json<Vec<LedgerAudit>>> {
    Ok(Json(ctx.ledger.audit_all().await?))
}

/// Called when the referred rep finishes registration
async fn mark_referral_signed_up(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Path(id): Path<String>,
) -> AdminResult<Json<Referral>> {
    Ok(Json(ctx.referrals.mark_signed_up(&id).await?))
}

async fn audit_log(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Query(query): Query<LimitQuery>,
) -> AdminResult<Json<Vec<AuditLogEntry>>> {
    Ok(Json(ctx.admin.audit_log(&auth.actor, query.limit()).await?))
}

async fn audit_log_for(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(subject_id): Path<String>,
) -> AdminResult<Json<Vec<AuditLogEntry>>> {
    Ok(Json(ctx.admin.audit_log_for(&auth.actor, &subject_id).await?))
}
