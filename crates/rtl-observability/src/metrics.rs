//! Run metrics for the real-time loss tools.
//!
//! Counters, gauges and histograms are emitted through the `metrics` facade. The
//! collector additionally keeps a [`RunSummary`] that the command line tool prints
//! at the end of a run.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

/// Totals of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Earthquakes run through the damage engine.
    pub events_processed: u64,
    /// Earthquakes screened out by magnitude or distance.
    pub events_skipped: u64,
    /// Earthquakes for which the engine reported no ground motion or no damage.
    pub engine_fallbacks: u64,
    /// Engine rows whose negative values were clipped.
    pub rows_clipped: u64,
    /// Economic loss summed over the reported results.
    pub economic_loss: f64,
    /// Injuries per severity summed over the reported results.
    pub injuries: Vec<f64>,
}

/// Records run metrics and keeps the running summary.
pub struct MetricsCollector {
    summary: Mutex<RunSummary>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Creates a new collector and registers metric descriptions.
    pub fn new() -> Self {
        Self::register_metrics();
        Self {
            summary: Mutex::new(RunSummary::default()),
        }
    }

    fn register_metrics() {
        describe_counter!(
            "rtl_events_processed_total",
            "Total number of earthquakes run through the damage engine"
        );
        describe_counter!(
            "rtl_events_skipped_total",
            "Total number of earthquakes screened out before assessment"
        );
        describe_counter!(
            "rtl_engine_fallbacks_total",
            "Total number of earthquakes that produced no ground motion or no damage"
        );
        describe_counter!(
            "rtl_negative_values_clipped_total",
            "Total number of engine rows with clipped negative values"
        );
        describe_histogram!(
            "rtl_event_duration_seconds",
            "Time to process one earthquake"
        );
        describe_gauge!(
            "rtl_inventory_rows",
            "Rows of the most recent inventory snapshot"
        );
    }

    /// Records one processed earthquake.
    pub fn record_event(
        &self,
        mode: &'static str,
        fallback: bool,
        clipped_rows: usize,
        inventory_rows: usize,
        elapsed: Duration,
    ) {
        counter!("rtl_events_processed_total", "mode" => mode).increment(1);
        if fallback {
            counter!("rtl_engine_fallbacks_total", "mode" => mode).increment(1);
        }
        if clipped_rows > 0 {
            counter!("rtl_negative_values_clipped_total", "mode" => mode)
                .increment(clipped_rows as u64);
        }
        histogram!("rtl_event_duration_seconds", "mode" => mode).record(elapsed.as_secs_f64());
        gauge!("rtl_inventory_rows", "mode" => mode).set(inventory_rows as f64);

        if let Ok(mut summary) = self.summary.lock() {
            summary.events_processed += 1;
            if fallback {
                summary.engine_fallbacks += 1;
            }
            summary.rows_clipped += clipped_rows as u64;
        }
    }

    /// Records earthquakes screened out before assessment.
    pub fn record_skipped(&self, mode: &'static str, count: usize) {
        if count == 0 {
            return;
        }
        counter!("rtl_events_skipped_total", "mode" => mode).increment(count as u64);
        if let Ok(mut summary) = self.summary.lock() {
            summary.events_skipped += count as u64;
        }
    }

    /// Adds reported losses to the summary.
    pub fn record_losses(&self, economic_loss: f64, injuries: &[f64]) {
        if let Ok(mut summary) = self.summary.lock() {
            summary.economic_loss += economic_loss;
            if summary.injuries.len() < injuries.len() {
                summary.injuries.resize(injuries.len(), 0.0);
            }
            for (total, value) in summary.injuries.iter_mut().zip(injuries) {
                *total += value;
            }
        }
    }

    /// Current summary.
    pub fn summary(&self) -> RunSummary {
        self.summary
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}
