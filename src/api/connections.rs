/// Connection request endpoints
use crate::{
    auth::AuthContext,
    error::MarketResult,
    network::ConnectionRequestView,
    AppContext,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

/// Build connection routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/", post(send_request))
        .route("/incoming", get(list_incoming))
        .route("/outgoing", get(list_outgoing))
        .route("/:id", get(get_request))
        .route("/:id/cancel", post(cancel_request))
        .route("/:id/respond", post(respond_request))
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    recipient_id: String,
    personal_message: Option<String>,
}

async fn send_request(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<SendRequest>,
) -> MarketResult<(StatusCode, Json<ConnectionRequestView>)> {
    let request = ctx
        .connections
        .send(&auth.actor, &req.recipient_id, req.personal_message)
        .await?;

    Ok((StatusCode::CREATED, Json(request.view(Utc::now()))))
}

#[derive(Debug, Default, Deserialize)]
struct IncomingQuery {
    /// Only requests that can still be answered
    #[serde(default)]
    pending_only: bool,
}

async fn list_incoming(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(query): Query<IncomingQuery>,
) -> MarketResult<Json<Vec<ConnectionRequestView>>> {
    let now = Utc::now();
    let requests = if query.pending_only {
        ctx.connections.live_incoming(&auth.actor.user_id, now).await?
    } else {
        ctx.connections.list_incoming(&auth.actor.user_id).await?
    };
    Ok(Json(requests.iter().map(|r| r.view(now)).collect()))
}

async fn list_outgoing(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> MarketResult<Json<Vec<ConnectionRequestView>>> {
    let now = Utc::now();
    let requests = ctx.connections.list_outgoing(&auth.actor.user_id).await?;
    Ok(Json(requests.iter().map(|r| r.view(now)).collect()))
}

/// Visible to the sender and the recipient only
async fn get_request(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> MarketResult<Json<ConnectionRequestView>> {
    let request = ctx.connections.get_for(&auth.actor, &id).await?;
    Ok(Json(request.view(Utc::now())))
}

async fn cancel_request(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> MarketResult<Json<ConnectionRequestView>> {
    let request = ctx.connections.cancel(&auth.actor, &id).await?;
    Ok(Json(request.view(Utc::now())))
}

#[derive(Debug, Deserialize)]
struct RespondRequest {
    accept: bool,
}

async fn respond_request(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<RespondRequest>,
) -> MarketResult<Json<ConnectionRequestView>> {
    let request = ctx.connections.respond(&auth.actor, &id, req.accept).await?;
    Ok(Json(request.view(Utc::now())))
}
