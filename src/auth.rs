/// Authentication extractors and utilities
use crate::{
    api::middleware::extract_bearer_token,
    context::AppContext,
    error::{AdminError, MarketError, MarketResult},
    users::ActorContext,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Access token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated caller, loaded from the bearer token's subject
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub actor: ActorContext,
}

async fn authenticate(parts: &Parts, state: &AppContext) -> MarketResult<ActorContext> {
    let token = extract_bearer_token(&parts.headers)
        .ok_or_else(|| MarketError::Authentication("Missing authorization header".to_string()))?;

    let claims = verify_jwt_token(&token, &state.config.authentication.jwt_secret)?;

    // Role and activation come from the users table, never from the token
    let user = state
        .users
        .require_active_user(&claims.sub)
        .await
        .map_err(|e| match e {
            MarketError::NotFound(_) => {
                MarketError::Authentication("Token subject is not a known user".to_string())
            }
            other => other,
        })?;

    tracing::debug!("Authenticated {} as {}", user.id, user.role.as_str());
    Ok(ActorContext::from(&user))
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = MarketError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        Ok(AuthContext {
            actor: authenticate(parts, state).await?,
        })
    }
}

/// Admin authentication context - requires admin role
#[derive(Debug, Clone)]
pub struct AdminAuthContext {
    pub actor: ActorContext,
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminAuthContext {
    type Rejection = AdminError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let actor = authenticate(parts, state).await?;

        if let Err(e) = actor.require_admin() {
            tracing::warn!("AdminAuthContext: User {} is not an admin", actor.user_id);
            return Err(e.into());
        }

        Ok(AdminAuthContext { actor })
    }
}

/// Verify an HS256 access token and return its claims
pub fn verify_jwt_token(token: &str, jwt_secret: &str) -> MarketResult<Claims> {
    let decoding_key = DecodingKey::from_secret(jwt_secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    // Allow some clock skew (5 minutes)
    validation.leeway = 300;

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::warn!("JWT verification failed: {}", e);
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    MarketError::Authentication("Token has expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    MarketError::Authentication("Invalid token signature".to_string())
                }
                _ => MarketError::Authentication(format!("Invalid token: {}", e)),
            }
        })
}

/// Sign an access token for a user
pub fn issue_jwt_token(user_id: &str, jwt_secret: &str, ttl: Duration) -> MarketResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .map_err(|e| MarketError::Internal(format!("Failed to sign token: {}", e)))
}
