use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::sampler::{LoadSample, LoadSampler, SystemSampler};

const WARNING_LOG_EVERY: u64 = 5;
const CRITICAL_SLEEP_MULTIPLIER: f64 = 3.0;
const CRITICAL_SLEEP_CAP_SECS: f64 = 30.0;
const WARNING_SLEEP_MULTIPLIER: f64 = 1.5;
const WARNING_SLEEP_CAP_SECS: f64 = 15.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub cpu_warning_threshold: f64,
    pub cpu_critical_threshold: f64,
    pub memory_warning_threshold: f64,
    pub memory_critical_threshold: f64,
    /// Minimum seconds between two real samples
    pub check_interval_secs: u64,
    /// Sleep between sweeps under normal load
    pub base_sleep_secs: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            cpu_warning_threshold: 70.0,
            cpu_critical_threshold: 85.0,
            memory_warning_threshold: 80.0,
            memory_critical_threshold: 90.0,
            check_interval_secs: 30,
            base_sleep_secs: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceLevel {
    Normal,
    Warning,
    Critical,
}

impl fmt::Display for ResourceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceLevel::Normal => write!(f, "NORMAL"),
            ResourceLevel::Warning => write!(f, "WARNING"),
            ResourceLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Transitions worth a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceEvent {
    EnteredCritical,
    ElevatedWarning,
    Recovered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub is_critical: bool,
    pub level: ResourceLevel,
    /// Seconds
    pub sleep_interval: f64,
    pub warning_count: u64,
}

/// Tracks host load and derives how long the sweep loop should rest.
///
/// Sampling is memoized: `check_resources` only asks the sampler for a new
/// reading once `check_interval_secs` has passed, and otherwise hands back
/// the cached status unchanged.
pub struct ResourceMonitor {
    config: MonitorConfig,
    sampler: Box<dyn LoadSampler>,
    last_check: Option<Instant>,
    last_sample: LoadSample,
    level: ResourceLevel,
    warning_count: u64,
    current_sleep: f64,
}

impl ResourceMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_sampler(config, Box::new(SystemSampler::new()))
    }

    pub fn with_sampler(config: MonitorConfig, sampler: Box<dyn LoadSampler>) -> Self {
        let current_sleep = config.base_sleep_secs;
        Self {
            config,
            sampler,
            last_check: None,
            last_sample: LoadSample::default(),
            level: ResourceLevel::Normal,
            warning_count: 0,
            current_sleep,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn check_resources(&mut self) -> ResourceStatus {
        self.check_resources_at(Instant::now())
    }

    /// `check_resources` against an explicit clock reading.
    pub fn check_resources_at(&mut self, now: Instant) -> ResourceStatus {
        let interval = Duration::from_secs(self.config.check_interval_secs);
        let fresh = self
            .last_check
            .is_some_and(|last| now.saturating_duration_since(last) < interval);

        if !fresh {
            self.last_check = Some(now);
            let sample = self.sampler.sample();
            self.observe(sample);
        }

        self.status()
    }

    /// Apply one load sample to the state machine.
    ///
    /// Returns the event that was logged for this sample, if any. Entering
    /// critical logs once per episode; staying elevated logs on every fifth
    /// elevated sample; leaving critical for normal logs once.
    pub fn observe(&mut self, sample: LoadSample) -> Option<ResourceEvent> {
        let cfg = &self.config;
        let was_critical = self.level == ResourceLevel::Critical;
        self.last_sample = sample;

        let critical = sample.cpu_percent >= cfg.cpu_critical_threshold
            || sample.memory_percent >= cfg.memory_critical_threshold;
        let warning = sample.cpu_percent >= cfg.cpu_warning_threshold
            || sample.memory_percent >= cfg.memory_warning_threshold;

        if critical {
            self.level = ResourceLevel::Critical;
            self.warning_count += 1;
            self.current_sleep =
                (cfg.base_sleep_secs * CRITICAL_SLEEP_MULTIPLIER).min(CRITICAL_SLEEP_CAP_SECS);

            if !was_critical {
                tracing::warn!(
                    "CRITICAL: System resources high - CPU: {:.1}%, Memory: {:.1}%",
                    sample.cpu_percent,
                    sample.memory_percent
                );
                return Some(ResourceEvent::EnteredCritical);
            }
            None
        } else if warning {
            self.level = ResourceLevel::Warning;
            self.warning_count += 1;
            self.current_sleep =
                (cfg.base_sleep_secs * WARNING_SLEEP_MULTIPLIER).min(WARNING_SLEEP_CAP_SECS);

            if self.warning_count % WARNING_LOG_EVERY == 0 {
                tracing::warn!(
                    "Warning: System resources elevated - CPU: {:.1}%, Memory: {:.1}%",
                    sample.cpu_percent,
                    sample.memory_percent
                );
                return Some(ResourceEvent::ElevatedWarning);
            }
            None
        } else {
            self.level = ResourceLevel::Normal;
            self.current_sleep = cfg.base_sleep_secs;

            if was_critical {
                tracing::info!("System resources returned to normal levels");
                return Some(ResourceEvent::Recovered);
            }
            None
        }
    }

    pub fn status(&self) -> ResourceStatus {
        ResourceStatus {
            cpu_percent: self.last_sample.cpu_percent,
            memory_percent: self.last_sample.memory_percent,
            is_critical: self.level == ResourceLevel::Critical,
            level: self.level,
            sleep_interval: self.current_sleep,
            warning_count: self.warning_count,
        }
    }

    /// Current inter-sweep sleep, truncated to whole seconds.
    pub fn get_adaptive_sleep(&self) -> Duration {
        Duration::from_secs(self.current_sleep.max(0.0) as u64)
    }

    pub fn log_summary(&self) {
        let status = if self.level == ResourceLevel::Critical { "CRITICAL" } else { "NORMAL" };
        tracing::info!(
            "Resource Summary - CPU: {:.1}%, Memory: {:.1}%, Adaptive Sleep: {}s, Status: {}",
            self.last_sample.cpu_percent,
            self.last_sample.memory_percent,
            self.current_sleep,
            status
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ScriptedSampler {
        samples: VecDeque<LoadSample>,
        calls: Arc<AtomicUsize>,
    }

    impl LoadSampler for ScriptedSampler {
        fn sample(&mut self) -> LoadSample {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.samples.pop_front().unwrap_or_default()
        }
    }

    fn load(cpu: f64, memory: f64) -> LoadSample {
        LoadSample {
            cpu_percent: cpu,
            memory_percent: memory,
        }
    }

    fn monitor() -> ResourceMonitor {
        ResourceMonitor::with_sampler(
            MonitorConfig::default(),
            Box::new(ScriptedSampler {
                samples: VecDeque::new(),
                calls: Arc::new(AtomicUsize::new(0)),
            }),
        )
    }

    #[test]
    fn critical_is_reported_once_per_episode() {
        let mut m = monitor();

        assert_eq!(m.observe(load(90.0, 40.0)), Some(ResourceEvent::EnteredCritical));
        assert_eq!(m.observe(load(90.0, 40.0)), None);

        let status = m.status();
        assert!(status.is_critical);
        assert_eq!(status.level, ResourceLevel::Critical);
        assert_eq!(status.warning_count, 2);
        assert_eq!(m.get_adaptive_sleep(), Duration::from_secs(30));
    }

    #[test]
    fn memory_alone_can_be_critical() {
        let mut m = monitor();
        assert_eq!(m.observe(load(10.0, 95.0)), Some(ResourceEvent::EnteredCritical));
    }

    #[test]
    fn warning_logs_every_fifth_elevated_sample() {
        let mut m = monitor();
        let events: Vec<_> = (0..10).map(|_| m.observe(load(75.0, 50.0))).collect();

        assert_eq!(events.iter().filter(|e| e.is_some()).count(), 2);
        assert_eq!(events[4], Some(ResourceEvent::ElevatedWarning));
        assert_eq!(events[9], Some(ResourceEvent::ElevatedWarning));
        assert!(!m.status().is_critical);
        // 10 * 1.5 truncated
        assert_eq!(m.get_adaptive_sleep(), Duration::from_secs(15));
    }

    #[test]
    fn critical_samples_count_towards_warning_cadence() {
        let mut m = monitor();
        for _ in 0..4 {
            m.observe(load(90.0, 40.0));
        }
        assert_eq!(m.observe(load(75.0, 40.0)), Some(ResourceEvent::ElevatedWarning));
    }

    #[test]
    fn recovery_from_critical_is_reported() {
        let mut m = monitor();
        m.observe(load(95.0, 50.0));

        assert_eq!(m.observe(load(20.0, 30.0)), Some(ResourceEvent::Recovered));
        assert_eq!(m.observe(load(20.0, 30.0)), None);
        assert_eq!(m.get_adaptive_sleep(), Duration::from_secs(10));
        // Warning count never resets
        assert_eq!(m.status().warning_count, 1);
    }

    #[test]
    fn warning_after_critical_is_not_a_recovery() {
        let mut m = monitor();
        m.observe(load(95.0, 50.0));

        assert_eq!(m.observe(load(72.0, 50.0)), None);
        assert!(!m.status().is_critical);
        assert_eq!(m.observe(load(95.0, 50.0)), Some(ResourceEvent::EnteredCritical));
    }

    #[test]
    fn sleep_is_capped_and_truncated() {
        let config = MonitorConfig {
            base_sleep_secs: 7.0,
            ..MonitorConfig::default()
        };
        let mut m = ResourceMonitor::with_sampler(
            config,
            Box::new(ScriptedSampler {
                samples: VecDeque::new(),
                calls: Arc::new(AtomicUsize::new(0)),
            }),
        );

        m.observe(load(75.0, 50.0));
        assert_relative_eq!(m.status().sleep_interval, 10.5);
        assert_eq!(m.get_adaptive_sleep(), Duration::from_secs(10));

        m.observe(load(90.0, 50.0));
        assert_eq!(m.get_adaptive_sleep(), Duration::from_secs(21));
    }

    #[test]
    fn sampling_is_memoized_within_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut m = ResourceMonitor::with_sampler(
            MonitorConfig::default(),
            Box::new(ScriptedSampler {
                samples: VecDeque::from(vec![load(90.0, 40.0), load(20.0, 30.0)]),
                calls: Arc::clone(&calls),
            }),
        );

        let start = Instant::now();
        let first = m.check_resources_at(start);
        let cached = m.check_resources_at(start + Duration::from_secs(10));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, cached);
        assert!(cached.is_critical);

        let refreshed = m.check_resources_at(start + Duration::from_secs(30));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!refreshed.is_critical);
        assert_relative_eq!(refreshed.cpu_percent, 20.0);
    }

    #[test]
    fn starts_normal_at_base_sleep() {
        let m = monitor();
        let status = m.status();

        assert_eq!(status.level, ResourceLevel::Normal);
        assert_eq!(status.warning_count, 0);
        assert_eq!(m.get_adaptive_sleep(), Duration::from_secs(10));
        m.log_summary();
    }
}
