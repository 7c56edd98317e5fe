/// Request throttling
use crate::{
    config::RateLimitConfig,
    context::AppContext,
    error::{MarketError, MarketResult},
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Request tier, chosen from the path and presence of credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Unauthenticated,
    Authenticated,
    Admin,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Unauthenticated => "unauthenticated",
            Tier::Authenticated => "authenticated",
            Tier::Admin => "admin",
        }
    }

    pub fn classify(path: &str, has_credentials: bool) -> Self {
        match (has_credentials, path.starts_with("/api/admin")) {
            (true, true) => Tier::Admin,
            (true, false) => Tier::Authenticated,
            (false, _) => Tier::Unauthenticated,
        }
    }
}

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    authenticated: Arc<DirectLimiter>,
    unauthenticated: Arc<DirectLimiter>,
    admin: Arc<DirectLimiter>,
    limits: [u32; 3],
}

fn quota(rps: u32, burst: u32) -> Quota {
    let rps = NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
    Quota::per_second(rps).allow_burst(burst)
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let burst = config.burst_size;

        Self {
            enabled: config.enabled,
            authenticated: Arc::new(GovernorLimiter::direct(quota(config.authenticated_rps, burst))),
            unauthenticated: Arc::new(GovernorLimiter::direct(quota(
                config.unauthenticated_rps,
                burst / 5,
            ))),
            admin: Arc::new(GovernorLimiter::direct(quota(
                config.admin_rps,
                burst.saturating_mul(2),
            ))),
            limits: [
                config.unauthenticated_rps,
                config.authenticated_rps,
                config.admin_rps,
            ],
        }
    }

    /// Take one cell from the tier's bucket
    pub fn check(&self, tier: Tier) -> MarketResult<()> {
        if !self.enabled {
            return Ok(());
        }

        let limiter = match tier {
            Tier::Unauthenticated => &self.unauthenticated,
            Tier::Authenticated => &self.authenticated,
            Tier::Admin => &self.admin,
        };

        limiter.check().map_err(|_| {
            MarketError::RateLimited(format!("Too many {} requests", tier.as_str()))
        })
    }

    pub fn limit(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Unauthenticated => self.limits[0],
            Tier::Authenticated => self.limits[1],
            Tier::Admin => self.limits[2],
        }
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, MarketError> {
    let has_credentials = request.headers().contains_key(header::AUTHORIZATION);
    let tier = Tier::classify(request.uri().path(), has_credentials);

    if let Err(e) = ctx.rate_limiter.check(tier) {
        tracing::warn!("Rate limit exceeded for {} tier", tier.as_str());
        return Err(e);
    }

    let mut response = next.run(request).await;
    response.headers_mut().insert(
        "X-RateLimit-Limit",
        HeaderValue::from(ctx.rate_limiter.limit(tier)),
    );

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(burst_size: u32) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            authenticated_rps: 10,
            unauthenticated_rps: 5,
            admin_rps: 100,
            burst_size,
        }
    }

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = RateLimiter::new(&RateLimitConfig::default());

        assert!(limiter.check(Tier::Authenticated).is_ok());
        assert!(limiter.check(Tier::Unauthenticated).is_ok());
        assert!(limiter.check(Tier::Admin).is_ok());
    }

    #[test]
    fn test_burst_limit() {
        let limiter = RateLimiter::new(&config(5));

        for _ in 0..5 {
            assert!(limiter.check(Tier::Authenticated).is_ok());
        }

        assert!(matches!(
            limiter.check(Tier::Authenticated),
            Err(MarketError::RateLimited(_))
        ));
    }

    #[test]
    fn test_disabled_never_limits() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            enabled: false,
            ..config(1)
        });

        for _ in 0..20 {
            assert!(limiter.check(Tier::Unauthenticated).is_ok());
        }
    }

    #[test]
    fn test_tier_classification() {
        assert_eq!(Tier::classify("/api/admin/audit-log", true), Tier::Admin);
        assert_eq!(Tier::classify("/api/credits", true), Tier::Authenticated);
        assert_eq!(Tier::classify("/api/admin/audit-log", false), Tier::Unauthenticated);
    }
}
