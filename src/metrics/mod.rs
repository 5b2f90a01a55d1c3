//! Prometheus metrics for the rota engine
//!
//! This module provides metrics tracking for:
//! - Slot generation and fair assignment outcomes per team
//! - Revalidation violations found and fixed
//! - Coverage alerts, swaps and notification delivery
//! - Duration of the periodic jobs
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

use crate::models::TeamId;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all engine metrics
struct RotaMetrics {
    slots_created: CounterVec,
    assignments_made: CounterVec,
    assignment_violations: CounterVec,
    revalidation_found: CounterVec,
    revalidation_fixed: CounterVec,
    team_runs: CounterVec,
    alerts: CounterVec,
    open_alerts: Gauge,
    swaps: CounterVec,
    notifications: CounterVec,
    job_duration: HistogramVec,
}

/// Global storage for engine metrics
static ROTA_METRICS: OnceLock<RotaMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, errors are logged and subsequent
/// metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = oncall_rota::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
///     // Application can continue without metrics
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    // Prevent double initialization
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = RotaMetrics {
        slots_created: register_counter_vec!(
            "oncall_slots_created_total",
            "Total slots created by the generator",
            &["team"]
        )?,
        assignments_made: register_counter_vec!(
            "oncall_assignments_made_total",
            "Total slots assigned by the fair assignment engine",
            &["team"]
        )?,
        assignment_violations: register_counter_vec!(
            "oncall_assignment_violations_total",
            "Total slots left unassigned because no member qualified",
            &["team"]
        )?,
        revalidation_found: register_counter_vec!(
            "oncall_revalidation_violations_found_total",
            "Total existing assignments found violating a hard constraint",
            &["team"]
        )?,
        revalidation_fixed: register_counter_vec!(
            "oncall_revalidation_violations_fixed_total",
            "Total violating assignments moved to another member",
            &["team"]
        )?,
        team_runs: register_counter_vec!(
            "oncall_team_runs_total",
            "Per-team generation runs by outcome",
            &["outcome"]
        )?,
        alerts: register_counter_vec!(
            "oncall_alerts_total",
            "Coverage alerts by action",
            &["action"]
        )?,
        open_alerts: register_gauge!(
            "oncall_open_alerts",
            "Number of currently open coverage alerts"
        )?,
        swaps: register_counter_vec!(
            "oncall_swaps_total",
            "Swap requests by outcome",
            &["outcome"]
        )?,
        notifications: register_counter_vec!(
            "oncall_notifications_total",
            "Empty-slot notifications by delivery outcome",
            &["outcome"]
        )?,
        job_duration: register_histogram_vec!(
            "oncall_job_duration_seconds",
            "Time spent in a periodic job in seconds",
            &["job"],
            vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
        )?,
    };

    ROTA_METRICS
        .set(metrics)
        .map_err(|_| "Rota metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    ROTA_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record the result of one generation pass for a team
pub fn record_generation(team_id: TeamId, slots_created: usize) {
    let Some(m) = ROTA_METRICS.get() else {
        return;
    };
    if slots_created > 0 {
        m.slots_created
            .with_label_values(&[&team_id.to_string()])
            .inc_by(slots_created as f64);
    }
}

/// Record the result of one assignment batch
pub fn record_assignment(team_id: TeamId, made: usize, violations: usize) {
    let Some(m) = ROTA_METRICS.get() else {
        return;
    };

    let team = team_id.to_string();
    if made > 0 {
        m.assignments_made
            .with_label_values(&[&team])
            .inc_by(made as f64);
    }
    if violations > 0 {
        m.assignment_violations
            .with_label_values(&[&team])
            .inc_by(violations as f64);
    }
}

/// Record revalidation results
pub fn record_revalidation(team_id: TeamId, found: usize, fixed: usize) {
    let Some(m) = ROTA_METRICS.get() else {
        return;
    };

    let team = team_id.to_string();
    if found > 0 {
        m.revalidation_found
            .with_label_values(&[&team])
            .inc_by(found as f64);
    }
    if fixed > 0 {
        m.revalidation_fixed
            .with_label_values(&[&team])
            .inc_by(fixed as f64);
    }
}

/// Record a per-team batch outcome (completed, skipped, failed)
pub fn record_team_run(outcome: &str) {
    if let Some(m) = ROTA_METRICS.get() {
        m.team_runs.with_label_values(&[outcome]).inc();
    }
}

/// Record alerts raised and resolved in one scan
pub fn record_alerts(raised: usize, resolved: usize, open: usize) {
    let Some(m) = ROTA_METRICS.get() else {
        return;
    };

    if raised > 0 {
        m.alerts
            .with_label_values(&["raised"])
            .inc_by(raised as f64);
    }
    if resolved > 0 {
        m.alerts
            .with_label_values(&["resolved"])
            .inc_by(resolved as f64);
    }
    m.open_alerts.set(open as f64);
}

/// Record a swap response (approved, rejected, refused)
pub fn record_swap(outcome: &str) {
    if let Some(m) = ROTA_METRICS.get() {
        m.swaps.with_label_values(&[outcome]).inc();
    }
}

/// Record a notification delivery outcome (delivered, retried, dropped)
pub fn record_notification(outcome: &str) {
    if let Some(m) = ROTA_METRICS.get() {
        m.notifications.with_label_values(&[outcome]).inc();
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a job timer (returns a timer handle)
pub fn start_job_timer(job: &str) -> MetricsTimer {
    match ROTA_METRICS.get() {
        Some(m) => MetricsTimer::new(m.job_duration.with_label_values(&[job]).start_timer()),
        None => MetricsTimer::noop(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ensure_metrics_initialized() {
        let _ = init_metrics();
    }

    #[test]
    fn test_init_metrics() {
        let result = init_metrics();
        assert!(result.is_ok());

        // Second call should also be Ok (idempotent)
        let result2 = init_metrics();
        assert!(result2.is_ok());
    }

    #[test]
    fn test_encode_metrics() {
        ensure_metrics_initialized();
        record_generation(1, 3);
        let text = encode_metrics().unwrap();
        assert!(text.contains("oncall_") || text.is_empty());
    }

    #[test]
    fn test_engine_metrics() {
        ensure_metrics_initialized();
        assert!(metrics_initialized());
        record_assignment(1, 3, 1);
        record_revalidation(1, 2, 1);
        record_team_run("completed");
        record_alerts(2, 1, 4);
        record_swap("approved");
        record_notification("delivered");
        let _timer = start_job_timer("coverage_scan");
    }
}
