use std::sync::Arc;

use anyhow::Context;

use opspilot_api::app::{AppServices, build_app};
use opspilot_api::config::AppConfig;
use opspilot_infra::Scheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    opspilot_observability::init();

    let config = AppConfig::from_env();
    let mut services = AppServices::from_config(&config).await?;

    let scheduler = if config.scheduler_enabled {
        let handle = Scheduler::new(config.schedule_interval).spawn(Arc::clone(services.orchestrator()));
        services = services.with_scheduler_trigger(handle.trigger_handle());
        Some(handle)
    } else {
        tracing::warn!("OPSPILOT_SCHEDULER_ENABLED=false; agents run on demand only");
        None
    };

    let app = build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
