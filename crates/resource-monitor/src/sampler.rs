use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Host load at one instant, both values in percent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LoadSample {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

pub trait LoadSampler: Send {
    fn sample(&mut self) -> LoadSample;
}

/// Samples whole-host CPU and memory usage through `sysinfo`.
///
/// CPU usage is a delta between refreshes, so the first sample after
/// construction reads close to zero.
pub struct SystemSampler {
    system: System,
}

impl SystemSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        Self { system }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadSampler for SystemSampler {
    fn sample(&mut self) -> LoadSample {
        self.system.refresh_cpu();
        self.system.refresh_memory();

        let total = self.system.total_memory();
        let memory_percent = if total > 0 {
            self.system.used_memory() as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        LoadSample {
            cpu_percent: self.system.global_cpu_info().cpu_usage() as f64,
            memory_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_sample_is_in_percent_range() {
        let mut sampler = SystemSampler::new();
        let sample = sampler.sample();

        assert!(sample.cpu_percent >= 0.0);
        assert!((0.0..=100.0).contains(&sample.memory_percent));
    }
}
