use anyhow::{Context, Result};
use std::sync::Arc;

use oncall_rota::config::Config;
use oncall_rota::notifications::{NotificationDispatcher, TracingSink};
use oncall_rota::scheduler::{JobEvent, JobTrigger};
use oncall_rota::utils::retry::RetryConfig;

use super::open_engine;

/// Run the periodic jobs until Ctrl-C
pub async fn run(config: Config, print_metrics: bool) -> Result<()> {
    let engine = Arc::new(open_engine(&config)?);
    let dispatcher = Arc::new(NotificationDispatcher::new(
        engine.outbox(),
        Arc::new(TracingSink),
        RetryConfig::from(&config.notifications),
    ));
    let trigger = Arc::new(JobTrigger::new(engine, dispatcher));

    let mut events = trigger.subscribe();
    let reporter = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                JobEvent::GenerationCompleted(report) => tracing::info!(
                    teams = report.runs.len(),
                    failed = report.failed_teams(),
                    slots = report.total_slots_created,
                    "Generation run finished"
                ),
                JobEvent::CoverageScanned(outcome) => tracing::debug!(
                    success = outcome.success,
                    open_alerts = outcome.result.open_alerts,
                    "Coverage scan finished"
                ),
                JobEvent::RevalidationCompleted(outcome) => tracing::info!(
                    success = outcome.success,
                    found = outcome.result.violations_found,
                    fixed = outcome.result.violations_fixed,
                    "Revalidation finished"
                ),
                JobEvent::NotificationsDispatched(report) => tracing::debug!(
                    delivered = report.delivered,
                    dropped = report.dropped,
                    "Dispatch finished"
                ),
            }
        }
    });

    let running = Arc::clone(&trigger);
    let jobs = tokio::spawn(async move { running.start().await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested");
    trigger.stop().await;

    jobs.await.context("Job loop panicked")??;
    reporter.abort();

    if print_metrics {
        match oncall_rota::metrics::encode_metrics() {
            Ok(text) => println!("{text}"),
            Err(e) => tracing::warn!(error = %e, "Failed to encode metrics"),
        }
    }
    Ok(())
}
