/// Configuration management for the ClearMarket rewards service
use crate::error::{MarketError, MarketResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub rewards: RewardConfig,
    pub network: NetworkConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
    pub jobs: JobConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub market_db: PathBuf,
    pub max_connections: u32,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// A trust score threshold that pays a one-time bonus when first reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustMilestone {
    pub threshold: i64,
    pub bonus_credits: i64,
}

/// Credit amounts and trust score rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardConfig {
    /// Credits granted to a reviewer per accepted review
    pub review_reward_credits: i64,
    /// Credits granted to a vendor per confirmed referral
    pub referral_reward_credits: i64,
    /// Trust score assigned to newly created users
    pub initial_trust_score: i64,
    /// Minimum non-blank length of an admin override justification
    pub min_override_reason_len: usize,
    pub milestones: Vec<TrustMilestone>,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            review_reward_credits: 1,
            referral_reward_credits: 1,
            initial_trust_score: 50,
            min_override_reason_len: 3,
            milestones: vec![TrustMilestone {
                threshold: 80,
                bonus_credits: 5,
            }],
        }
    }
}

/// Connection request settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub connection_expiry_days: i64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connection_expiry_days: 14,
        }
    }
}

impl NetworkConfig {
    pub fn connection_expiry(&self) -> chrono::Duration {
        chrono::Duration::days(self.connection_expiry_days)
    }
}

/// HTTP rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub authenticated_rps: u32,
    pub unauthenticated_rps: u32,
    pub admin_rps: u32,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            authenticated_rps: 50,
            unauthenticated_rps: 5,
            admin_rps: 200,
            burst_size: 20,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// Background job intervals, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub ledger_audit_interval: u64,
    pub health_check_interval: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            ledger_audit_interval: 3600,
            health_check_interval: 300,
        }
    }
}

/// Parse `threshold:bonus` pairs separated by commas
pub fn parse_milestones(raw: &str) -> MarketResult<Vec<TrustMilestone>> {
    let mut milestones = Vec::new();

    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (threshold, bonus) = entry.split_once(':').ok_or_else(|| {
            MarketError::Validation(format!("Invalid milestone '{}', expected threshold:bonus", entry))
        })?;

        let threshold: i64 = threshold
            .trim()
            .parse()
            .map_err(|_| MarketError::Validation(format!("Invalid milestone threshold: {}", threshold)))?;
        let bonus_credits: i64 = bonus
            .trim()
            .parse()
            .map_err(|_| MarketError::Validation(format!("Invalid milestone bonus: {}", bonus)))?;

        milestones.push(TrustMilestone {
            threshold,
            bonus_credits,
        });
    }

    milestones.sort_by_key(|m| m.threshold);
    Ok(milestones)
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl MarketConfig {
    /// Default configuration rooted at `data_directory`
    pub fn new(data_directory: PathBuf, jwt_secret: impl Into<String>) -> Self {
        MarketConfig {
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 8080,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            storage: StorageConfig {
                market_db: data_directory.join("market.sqlite"),
                data_directory,
                max_connections: 10,
            },
            authentication: AuthConfig {
                jwt_secret: jwt_secret.into(),
            },
            rewards: RewardConfig::default(),
            network: NetworkConfig::default(),
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
            },
            jobs: JobConfig::default(),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> MarketResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("CLEARMARKET_HOSTNAME").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("CLEARMARKET_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| MarketError::Validation("Invalid port number".to_string()))?;
        let version = env::var("CLEARMARKET_VERSION")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        let data_directory: PathBuf = env::var("CLEARMARKET_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let market_db = env::var("CLEARMARKET_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("market.sqlite"));
        let max_connections = env_or("CLEARMARKET_DB_MAX_CONNECTIONS", 10);

        let jwt_secret = env::var("CLEARMARKET_JWT_SECRET")
            .map_err(|_| MarketError::Validation("JWT secret required".to_string()))?;

        let reward_defaults = RewardConfig::default();
        let milestones = match env::var("CLEARMARKET_TRUST_MILESTONES") {
            Ok(raw) => parse_milestones(&raw)?,
            Err(_) => reward_defaults.milestones.clone(),
        };
        let rewards = RewardConfig {
            review_reward_credits: env_or(
                "CLEARMARKET_REVIEW_REWARD_CREDITS",
                reward_defaults.review_reward_credits,
            ),
            referral_reward_credits: env_or(
                "CLEARMARKET_REFERRAL_REWARD_CREDITS",
                reward_defaults.referral_reward_credits,
            ),
            initial_trust_score: env_or(
                "CLEARMARKET_INITIAL_TRUST_SCORE",
                reward_defaults.initial_trust_score,
            ),
            min_override_reason_len: env_or(
                "CLEARMARKET_MIN_OVERRIDE_REASON_LEN",
                reward_defaults.min_override_reason_len,
            ),
            milestones,
        };

        let network = NetworkConfig {
            connection_expiry_days: env_or(
                "CLEARMARKET_CONNECTION_EXPIRY_DAYS",
                NetworkConfig::default().connection_expiry_days,
            ),
        };

        let limits = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            enabled: env_or("CLEARMARKET_RATE_LIMITS_ENABLED", limits.enabled),
            authenticated_rps: env_or("CLEARMARKET_RATE_LIMIT_AUTHENTICATED_RPS", limits.authenticated_rps),
            unauthenticated_rps: env_or(
                "CLEARMARKET_RATE_LIMIT_UNAUTHENTICATED_RPS",
                limits.unauthenticated_rps,
            ),
            admin_rps: env_or("CLEARMARKET_RATE_LIMIT_ADMIN_RPS", limits.admin_rps),
            burst_size: env_or("CLEARMARKET_RATE_LIMIT_BURST", limits.burst_size),
        };

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let job_defaults = JobConfig::default();
        let jobs = JobConfig {
            ledger_audit_interval: env_or(
                "CLEARMARKET_LEDGER_AUDIT_INTERVAL",
                job_defaults.ledger_audit_interval,
            ),
            health_check_interval: env_or(
                "CLEARMARKET_HEALTH_CHECK_INTERVAL",
                job_defaults.health_check_interval,
            ),
        };

        Ok(MarketConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                market_db,
                max_connections,
            },
            authentication: AuthConfig { jwt_secret },
            rewards,
            network,
            rate_limit,
            logging: LoggingConfig { level: log_level },
            jobs,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> MarketResult<()> {
        if self.service.hostname.is_empty() {
            return Err(MarketError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(MarketError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        self.rewards.validate()?;

        if self.network.connection_expiry_days <= 0 {
            return Err(MarketError::Validation(
                "Connection expiry must be at least one day".to_string(),
            ));
        }

        Ok(())
    }
}

impl RewardConfig {
    pub fn validate(&self) -> MarketResult<()> {
        if self.review_reward_credits < 0 || self.referral_reward_credits < 0 {
            return Err(MarketError::Validation(
                "Reward amounts cannot be negative".to_string(),
            ));
        }

        if !(0..=100).contains(&self.initial_trust_score) {
            return Err(MarketError::Validation(
                "Initial trust score must be between 0 and 100".to_string(),
            ));
        }

        for milestone in &self.milestones {
            if !(1..=100).contains(&milestone.threshold) || milestone.bonus_credits <= 0 {
                return Err(MarketError::Validation(format!(
                    "Invalid trust milestone {}:{}",
                    milestone.threshold, milestone.bonus_credits
                )));
            }
        }

        Ok(())
    }
}
