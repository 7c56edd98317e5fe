/// API routes and handlers
pub mod admin;
pub mod connections;
pub mod credits;
pub mod health;
pub mod middleware;
pub mod referrals;
pub mod reviews;

use crate::context::AppContext;
use axum::Router;
use serde::Deserialize;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .nest("/api/credits", credits::routes())
        .nest("/api/reviews", reviews::routes())
        .nest("/api/connections", connections::routes())
        .nest("/api/referrals", referrals::routes())
        .nest("/api/admin", admin::routes())
}

/// `?limit=` query shared by list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

impl LimitQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}
