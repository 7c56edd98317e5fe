/// Application context and dependency injection
use crate::{
    admin::AdminOverrides,
    config::MarketConfig,
    db,
    error::{MarketError, MarketResult},
    ledger::CreditLedger,
    network::{ConnectionRequests, Referrals},
    rate_limit::RateLimiter,
    trust::TrustScoreAggregator,
    users::UserDirectory,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<MarketConfig>,
    pub db: SqlitePool,
    pub users: Arc<UserDirectory>,
    pub ledger: Arc<CreditLedger>,
    pub trust: Arc<TrustScoreAggregator>,
    pub connections: Arc<ConnectionRequests>,
    pub referrals: Arc<Referrals>,
    pub admin: Arc<AdminOverrides>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: MarketConfig) -> MarketResult<Self> {
        config.validate()?;

        if !config.storage.data_directory.exists() {
            tokio::fs::create_dir_all(&config.storage.data_directory)
                .await
                .map_err(|e| {
                    MarketError::Internal(format!(
                        "Failed to create directory {:?}: {}",
                        config.storage.data_directory, e
                    ))
                })?;
        }

        let options = db::DatabaseOptions {
            max_connections: config.storage.max_connections,
            ..db::DatabaseOptions::default()
        };
        let pool = db::create_pool(&config.storage.market_db, options).await?;
        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        Ok(Self::with_pool(config, pool))
    }

    /// Wire every manager over an already migrated pool
    pub fn with_pool(config: MarketConfig, pool: SqlitePool) -> Self {
        let rewards = config.rewards.clone();

        Self {
            users: Arc::new(UserDirectory::new(pool.clone(), rewards.initial_trust_score)),
            ledger: Arc::new(CreditLedger::new(pool.clone())),
            trust: Arc::new(TrustScoreAggregator::new(pool.clone(), rewards.clone())),
            connections: Arc::new(ConnectionRequests::new(
                pool.clone(),
                config.network.connection_expiry(),
            )),
            referrals: Arc::new(Referrals::new(pool.clone(), rewards.referral_reward_credits)),
            admin: Arc::new(AdminOverrides::new(pool.clone(), rewards.min_override_reason_len)),
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            db: pool,
            config: Arc::new(config),
        }
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
