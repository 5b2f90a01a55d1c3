//! Periodic job triggers
//!
//! Runs the engine's periodic entry points on independent timers:
//! - slot generation once a day at the configured local time
//! - coverage-gap scan every interval
//! - notification dispatch every interval, on its own timer
//! - revalidation every interval
//!
//! Each job has its own loop, so a slow job never delays another. The daily
//! generation tracks its next due time; a due time missed while a run was in
//! progress fires immediately instead of waiting a day.
//!
//! Engine calls are synchronous and run on the blocking pool.

use chrono::{Duration, NaiveDateTime, NaiveTime};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::MissedTickBehavior;

use super::engine::{BatchReport, JobOutcome, RotaEngine};
use super::revalidate::RevalidationReport;
use crate::notifications::{CoverageReport, DispatchReport, NotificationDispatcher};
use crate::utils::{local_now, local_today};

// ============================================================================
// Trigger Events
// ============================================================================

/// Events emitted after each job run
#[derive(Debug, Clone)]
pub enum JobEvent {
    GenerationCompleted(BatchReport),
    CoverageScanned(JobOutcome<CoverageReport>),
    RevalidationCompleted(JobOutcome<RevalidationReport>),
    NotificationsDispatched(DispatchReport),
}

/// Time from `now` until the next occurrence of `at`
///
/// If `now` is exactly at or past today's occurrence, the next one is
/// tomorrow.
pub fn duration_until(at: NaiveTime, now: NaiveDateTime) -> Duration {
    let today = now.date().and_time(at);
    if now < today {
        today - now
    } else {
        (today + Duration::days(1)) - now
    }
}

/// The due time after `due`, skipping occurrences already at or before `now`
pub fn advance_due(due: NaiveDateTime, now: NaiveDateTime) -> NaiveDateTime {
    let mut next = due + Duration::days(1);
    while next <= now {
        next += Duration::days(1);
    }
    next
}

/// Sleep needed before `due`; zero once it has passed
pub fn time_until_due(due: NaiveDateTime, now: NaiveDateTime) -> std::time::Duration {
    (due - now).to_std().unwrap_or(std::time::Duration::ZERO)
}

// ============================================================================
// Job Trigger
// ============================================================================

pub struct JobTrigger {
    engine: Arc<RotaEngine>,
    dispatcher: Arc<NotificationDispatcher>,
    event_sender: broadcast::Sender<JobEvent>,
    is_running: Arc<RwLock<bool>>,
}

impl JobTrigger {
    pub fn new(engine: Arc<RotaEngine>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        let (event_sender, _) = broadcast::channel(100);
        Self {
            engine,
            dispatcher,
            event_sender,
            is_running: Arc::new(RwLock::new(false)),
        }
    }

    /// Subscribe to job events
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_sender.subscribe()
    }

    /// Run the daily generation job now
    pub async fn generation_job(&self) -> Option<BatchReport> {
        let engine = Arc::clone(&self.engine);
        match tokio::task::spawn_blocking(move || engine.run_generation(local_now())).await {
            Ok(report) => {
                let _ = self
                    .event_sender
                    .send(JobEvent::GenerationCompleted(report.clone()));
                Some(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "Generation job panicked");
                None
            }
        }
    }

    /// Run the coverage scan now
    pub async fn coverage_job(&self) -> Option<JobOutcome<CoverageReport>> {
        let engine = Arc::clone(&self.engine);
        let outcome =
            match tokio::task::spawn_blocking(move || engine.run_coverage_scan(local_now())).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, "Coverage scan panicked");
                    return None;
                }
            };
        let _ = self
            .event_sender
            .send(JobEvent::CoverageScanned(outcome.clone()));
        Some(outcome)
    }

    /// Deliver pending notifications now, then purge expired ones
    pub async fn dispatch_job(&self) -> DispatchReport {
        let dispatched = self.dispatcher.dispatch_pending(local_now()).await;
        let purged = self.engine.outbox().purge_expired(local_now());
        if purged > 0 {
            tracing::debug!(purged, "Expired notifications purged");
        }
        let _ = self
            .event_sender
            .send(JobEvent::NotificationsDispatched(dispatched.clone()));
        dispatched
    }

    /// Run revalidation now
    pub async fn revalidation_job(&self) -> Option<JobOutcome<RevalidationReport>> {
        let engine = Arc::clone(&self.engine);
        match tokio::task::spawn_blocking(move || engine.run_revalidation(local_today())).await {
            Ok(outcome) => {
                let _ = self
                    .event_sender
                    .send(JobEvent::RevalidationCompleted(outcome.clone()));
                Some(outcome)
            }
            Err(e) => {
                tracing::error!(error = %e, "Revalidation job panicked");
                None
            }
        }
    }

    /// Start the job loops (runs until stopped)
    pub async fn start(&self) -> anyhow::Result<()> {
        let config = self.engine.config().clone();
        let generation_time = config.generation_time()?;
        *self.is_running.write().await = true;

        tracing::info!(
            generation_time = %generation_time,
            coverage_secs = config.jobs.coverage_scan_interval_secs,
            revalidation_secs = config.jobs.revalidation_interval_secs,
            "Job trigger started"
        );

        tokio::join!(
            self.generation_loop(generation_time, config.jobs.run_on_startup),
            self.every("coverage_scan", config.coverage_scan_interval(), || {
                self.coverage_job()
            }),
            self.every("dispatch", config.coverage_scan_interval(), || {
                self.dispatch_job()
            }),
            self.every("revalidation", config.revalidation_interval(), || {
                self.revalidation_job()
            }),
        );

        tracing::info!("Job trigger stopped");
        Ok(())
    }

    async fn generation_loop(&self, at: NaiveTime, run_on_startup: bool) {
        if run_on_startup {
            tracing::info!("Running generation on startup");
            self.generation_job().await;
        }

        let now = local_now();
        let mut due = now + duration_until(at, now);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(time_until_due(due, local_now())) => {}
                _ = self.wait_for_stop() => break,
            }
            self.generation_job().await;
            due = advance_due(due, local_now());
            tracing::debug!(next = %due, "Next generation scheduled");
        }
    }

    async fn every<F, Fut, T>(&self, job: &'static str, period: std::time::Duration, run: F)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut ticks = tokio::time::interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    run().await;
                }
                _ = self.wait_for_stop() => break,
            }
        }
        tracing::debug!(job, "Job loop stopped");
    }

    /// Stop the trigger loop
    pub async fn stop(&self) {
        *self.is_running.write().await = false;
    }

    /// Check if trigger is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    async fn wait_for_stop(&self) {
        loop {
            if !*self.is_running.read().await {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }
}
