use std::sync::Arc;
use std::time::Instant;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

use crate::metrics;

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::ledger_audit_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Compare every balance against its ledger
    async fn ledger_audit_job(scheduler: Arc<Self>) {
        let period = scheduler.context.config.jobs.ledger_audit_interval.max(1);
        let mut interval = interval(Duration::from_secs(period));

        loop {
            interval.tick().await;
            info!("Running ledger conservation audit");
            let start = Instant::now();

            match tasks::audit_ledger(&scheduler.context).await {
                Ok(0) => {
                    info!("Ledger audit: all balances match their ledgers");
                    metrics::record_background_job("ledger_audit", "success", start.elapsed().as_secs_f64());
                }
                Ok(drifted) => {
                    warn!("Ledger audit: {} account(s) drifted from their ledger", drifted);
                    metrics::record_background_job("ledger_audit", "drift", start.elapsed().as_secs_f64());
                }
                Err(e) => {
                    error!("Ledger audit failed: {}", e);
                    metrics::record_background_job("ledger_audit", "error", start.elapsed().as_secs_f64());
                }
            }
        }
    }

    /// Health check job
    async fn health_check_job(scheduler: Arc<Self>) {
        let period = scheduler.context.config.jobs.health_check_interval.max(1);
        let mut interval = interval(Duration::from_secs(period));

        loop {
            interval.tick().await;
            let start = Instant::now();

            match tasks::health_check(&scheduler.context).await {
                Ok(_) => {
                    metrics::record_background_job("health_check", "success", start.elapsed().as_secs_f64());
                }
                Err(e) => {
                    error!("Health check failed: {}", e);
                    metrics::record_background_job("health_check", "error", start.elapsed().as_secs_f64());
                }
            }
        }
    }
}
