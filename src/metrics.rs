use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use sysinfo::System;

pub const DEFAULT_METRICS_EVERY: u32 = 30;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One diagnostics line, emitted as JSON on the `metrics` log target.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricsRecord {
    pub timestamp: u64,
    pub fps: f64,
    pub latency_ms: f64,
    pub cpu_usage: f64,
    pub ram_mb: f64,
}

/// Counts streaming iterations and produces a [`MetricsRecord`] every
/// `every` of them. Purely observational.
pub struct MetricsRecorder {
    every: u64,
    iterations: u64,
    started: Option<Instant>,
    system: Option<System>,
}

impl MetricsRecorder {
    pub fn new(every: u32, probe_system: bool) -> Self {
        let system = probe_system.then(|| {
            let mut system = System::new();
            // First CPU sample only establishes a baseline.
            system.refresh_cpu();
            system
        });
        Self {
            every: u64::from(every.max(1)),
            iterations: 0,
            started: None,
            system,
        }
    }

    /// Registers one finished iteration that began at `iteration_start`.
    pub fn record(&mut self, iteration_start: Instant) -> Option<MetricsRecord> {
        let started = *self.started.get_or_insert(iteration_start);
        self.iterations += 1;
        if self.iterations % self.every != 0 {
            return None;
        }

        let now = Instant::now();
        let elapsed = now.duration_since(started).as_secs_f64();
        let fps = if elapsed > 0.0 {
            self.iterations as f64 / elapsed
        } else {
            0.0
        };
        let latency_ms = now.duration_since(iteration_start).as_secs_f64() * 1000.0;
        let (cpu_usage, ram_mb) = self.sample_system();
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Some(MetricsRecord {
            timestamp,
            fps: round2(fps),
            latency_ms: round2(latency_ms),
            cpu_usage: round2(cpu_usage),
            ram_mb: round2(ram_mb),
        })
    }

    /// Resets the frame-rate window, e.g. after a reconnect.
    pub fn restart(&mut self) {
        self.iterations = 0;
        self.started = None;
    }

    fn sample_system(&mut self) -> (f64, f64) {
        let Some(system) = self.system.as_mut() else {
            return (0.0, 0.0);
        };
        system.refresh_cpu();
        system.refresh_memory();
        (
            f64::from(system.global_cpu_info().cpu_usage()),
            system.used_memory() as f64 / BYTES_PER_MB,
        )
    }
}

pub fn log_record(record: &MetricsRecord) {
    match serde_json::to_string(record) {
        Ok(line) => log::info!(target: "metrics", "{line}"),
        Err(err) => log::warn!("failed to serialize metrics: {err}"),
    }
}

fn round2(value: f64) -> f64 {
    if value.is_finite() {
        (value * 100.0).round() / 100.0
    } else {
        0.0
    }
}
