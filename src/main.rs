/// ClearMarket rewards and trust service
use anyhow::Context;
use clearmarket::{jobs::JobScheduler, server, AppContext, MarketConfig};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = MarketConfig::from_env().context("failed to load configuration")?;

    let json_logs = std::env::var("CLEARMARKET_LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("clearmarket={},tower_http=info", config.logging.level).into()
    });

    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("ClearMarket rewards service v{}", config.service.version);

    let ctx = Arc::new(
        AppContext::new(config)
            .await
            .context("failed to initialise application context")?,
    );

    let scheduler = Arc::new(JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    server::serve((*ctx).clone()).await?;

    Ok(())
}
