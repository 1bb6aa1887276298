use std::time::Instant;

use serde::Serialize;

/// Running counters for the sweep loop.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepMetrics {
    pub sweeps_run: u64,
    pub symbols_analysed: u64,
    pub degraded_analyses: u64,
    pub signals_generated: u64,
    pub risk_rejections: u64,
    pub instructions_sent: u64,
    pub fills: u64,
    pub execution_failures: u64,
    pub positions_closed: u64,
    pub last_sweep_duration_ms: u64,

    #[serde(skip)]
    log_interval_sweeps: u64,
}

impl SweepMetrics {
    pub fn new(log_interval_sweeps: u64) -> Self {
        Self {
            log_interval_sweeps,
            ..Self::default()
        }
    }

    pub fn finish_sweep(&mut self, sweep_start: Instant) {
        self.last_sweep_duration_ms = sweep_start.elapsed().as_millis() as u64;
        self.sweeps_run += 1;

        if self.log_interval_sweeps > 0 && self.sweeps_run % self.log_interval_sweeps == 0 {
            self.log_metrics();
        }
    }

    /// Share of analyses that came back degraded (0-100%)
    pub fn degraded_rate(&self) -> f64 {
        if self.symbols_analysed == 0 {
            return 0.0;
        }
        self.degraded_analyses as f64 / self.symbols_analysed as f64 * 100.0
    }

    pub fn log_metrics(&self) {
        tracing::info!(
            sweeps = self.sweeps_run,
            symbols_analysed = self.symbols_analysed,
            degraded_analyses = self.degraded_analyses,
            degraded_rate = format!("{:.1}%", self.degraded_rate()),
            signals_generated = self.signals_generated,
            risk_rejections = self.risk_rejections,
            instructions_sent = self.instructions_sent,
            fills = self.fills,
            execution_failures = self.execution_failures,
            positions_closed = self.positions_closed,
            last_sweep_ms = self.last_sweep_duration_ms,
            "Sweep metrics summary"
        );
    }
}
