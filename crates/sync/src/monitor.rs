//! Adaptive memory-pressure monitor.
//!
//! Samples memory usage, classifies it into discrete pressure levels, and
//! recommends a concurrency width. Purely advisory: sampling failures degrade
//! to an all-clear estimate instead of propagating errors. An optional
//! background loop polls at a fixed interval and fires a callback once per
//! level transition.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use photosieve_core::SieveError;

/// Coarse classification of current memory headroom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PressureLevel {
    /// Full configured width.
    Normal,
    /// Width halved.
    Warning,
    /// Serialized: one unit of work at a time.
    Critical,
}

impl PressureLevel {
    /// Monotone non-increasing width recommendation for a given base width.
    pub fn recommended_parallelism(self, base: usize) -> usize {
        match self {
            PressureLevel::Normal => base,
            PressureLevel::Warning => (base / 2).max(1),
            PressureLevel::Critical => 1,
        }
    }
}

/// A point-in-time memory reading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MemorySample {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    /// Resident size of the calling process.
    pub app_bytes: u64,
}

impl MemorySample {
    pub fn used_ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            self.used_bytes as f64 / self.total_bytes as f64
        }
    }
}

/// Source of memory samples. Implementations must not fail; return a
/// best-effort estimate instead.
pub trait MemoryProbe: Send + Sync {
    fn sample(&self) -> MemorySample;
}

/// Default probe reading `/proc/meminfo` and `/proc/self/statm`.
pub struct ProcfsProbe;

impl MemoryProbe for ProcfsProbe {
    fn sample(&self) -> MemorySample {
        read_procfs().unwrap_or(MemorySample {
            total_bytes: 0,
            used_bytes: 0,
            free_bytes: 0,
            app_bytes: 0,
        })
    }
}

fn read_procfs() -> Option<MemorySample> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let mut total = None;
    let mut available = None;
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total = parse_meminfo_bytes(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available = parse_meminfo_bytes(rest);
        }
        if total.is_some() && available.is_some() {
            break;
        }
    }
    let total_bytes = total?;
    let free_bytes = available?;

    // Resident set size: second field of statm, in pages.
    let app_bytes = std::fs::read_to_string("/proc/self/statm")
        .ok()
        .and_then(|s| s.split_whitespace().nth(1)?.parse::<u64>().ok())
        .map(|pages| pages * 4096)
        .unwrap_or(0);

    Some(MemorySample {
        total_bytes,
        used_bytes: total_bytes.saturating_sub(free_bytes),
        free_bytes,
        app_bytes,
    })
}

/// Parse a meminfo value like `   16265304 kB`.
fn parse_meminfo_bytes(rest: &str) -> Option<u64> {
    rest.split_whitespace()
        .next()?
        .parse::<u64>()
        .ok()
        .map(|kib| kib * 1024)
}

/// Monitor configuration. Thresholds are used-memory ratios.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_warning")]
    pub warning_threshold: f64,
    #[serde(default = "default_critical")]
    pub critical_threshold: f64,
    #[serde(default = "default_polling_interval")]
    pub polling_interval_ms: u64,
}

fn default_warning() -> f64 {
    0.70
}
fn default_critical() -> f64 {
    0.85
}
fn default_polling_interval() -> u64 {
    2_000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            warning_threshold: default_warning(),
            critical_threshold: default_critical(),
            polling_interval_ms: default_polling_interval(),
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), SieveError> {
        if !(self.warning_threshold > 0.0
            && self.warning_threshold < self.critical_threshold
            && self.critical_threshold < 1.0)
        {
            return Err(SieveError::InvalidConfig(format!(
                "pressure thresholds must satisfy 0 < warning < critical < 1, \
                 got warning={} critical={}",
                self.warning_threshold, self.critical_threshold
            )));
        }
        if self.polling_interval_ms == 0 {
            return Err(SieveError::InvalidConfig(
                "polling_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Deterministic step function of the used ratio.
    pub fn level_for(&self, used_ratio: f64) -> PressureLevel {
        if used_ratio >= self.critical_threshold {
            PressureLevel::Critical
        } else if used_ratio >= self.warning_threshold {
            PressureLevel::Warning
        } else {
            PressureLevel::Normal
        }
    }
}

/// Samples memory pressure on demand and, optionally, in the background.
pub struct LoadMonitor {
    config: MonitorConfig,
    probe: Arc<dyn MemoryProbe>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl LoadMonitor {
    /// Create a monitor using the procfs probe.
    pub fn new(config: MonitorConfig) -> Result<Self, SieveError> {
        Self::with_probe(config, Arc::new(ProcfsProbe))
    }

    /// Create a monitor with an injected probe (tests use synthetic samples).
    pub fn with_probe(
        config: MonitorConfig,
        probe: Arc<dyn MemoryProbe>,
    ) -> Result<Self, SieveError> {
        config.validate()?;
        Ok(Self {
            config,
            probe,
            poll_task: Mutex::new(None),
        })
    }

    pub fn current_sample(&self) -> MemorySample {
        self.probe.sample()
    }

    pub fn current_level(&self) -> PressureLevel {
        self.config.level_for(self.probe.sample().used_ratio())
    }

    /// Width recommendation for a caller-supplied base width.
    pub fn recommended_parallelism(&self, base: usize) -> usize {
        self.current_level().recommended_parallelism(base)
    }

    /// False only under critical pressure.
    pub fn is_safe_to_process(&self) -> bool {
        self.current_level() != PressureLevel::Critical
    }

    /// Start the background polling loop. The callback fires exactly once per
    /// level transition (the first observed level counts as a transition from
    /// "unknown"); it does not re-fire while pressure stays constant. Calling
    /// again replaces a running loop.
    pub fn start_monitoring<F>(&self, on_transition: F)
    where
        F: Fn(PressureLevel) + Send + Sync + 'static,
    {
        let mut slot = self.poll_task.lock().unwrap();
        if let Some(previous) = slot.take() {
            previous.abort();
        }

        let probe = Arc::clone(&self.probe);
        let config = self.config.clone();
        *slot = Some(tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(config.polling_interval_ms));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last: Option<PressureLevel> = None;
            loop {
                ticker.tick().await;
                let level = config.level_for(probe.sample().used_ratio());
                if last != Some(level) {
                    debug!(?level, "memory pressure level changed");
                    on_transition(level);
                    last = Some(level);
                }
            }
        }));
    }

    /// Cancel the background loop. Idempotent when already stopped.
    pub fn stop_monitoring(&self) {
        if let Some(task) = self.poll_task.lock().unwrap().take() {
            task.abort();
        }
    }
}

impl Drop for LoadMonitor {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct FixedProbe {
        ratio: f64,
    }

    impl MemoryProbe for FixedProbe {
        fn sample(&self) -> MemorySample {
            MemorySample {
                total_bytes: 1_000,
                used_bytes: (self.ratio * 1_000.0) as u64,
                free_bytes: 1_000 - (self.ratio * 1_000.0) as u64,
                app_bytes: 0,
            }
        }
    }

    /// Replays a scripted ratio sequence, repeating the last entry.
    struct SequenceProbe {
        ratios: Mutex<VecDeque<f64>>,
        last: Mutex<f64>,
    }

    impl SequenceProbe {
        fn new(ratios: &[f64]) -> Self {
            Self {
                ratios: Mutex::new(ratios.iter().copied().collect()),
                last: Mutex::new(ratios[0]),
            }
        }
    }

    impl MemoryProbe for SequenceProbe {
        fn sample(&self) -> MemorySample {
            let ratio = match self.ratios.lock().unwrap().pop_front() {
                Some(r) => {
                    *self.last.lock().unwrap() = r;
                    r
                }
                None => *self.last.lock().unwrap(),
            };
            FixedProbe { ratio }.sample()
        }
    }

    fn monitor_at(ratio: f64) -> LoadMonitor {
        LoadMonitor::with_probe(MonitorConfig::default(), Arc::new(FixedProbe { ratio }))
            .unwrap()
    }

    #[test]
    fn pressure_is_a_step_function_of_used_ratio() {
        let m = monitor_at(0.50);
        assert_eq!(m.current_level(), PressureLevel::Normal);
        assert_eq!(m.recommended_parallelism(8), 8);
        assert!(m.is_safe_to_process());

        let m = monitor_at(0.72);
        assert_eq!(m.current_level(), PressureLevel::Warning);
        assert_eq!(m.recommended_parallelism(8), 4);
        assert!(m.is_safe_to_process());

        let m = monitor_at(0.90);
        assert_eq!(m.current_level(), PressureLevel::Critical);
        assert_eq!(m.recommended_parallelism(8), 1);
        assert!(!m.is_safe_to_process());
    }

    #[test]
    fn thresholds_are_inclusive() {
        let config = MonitorConfig::default();
        assert_eq!(config.level_for(0.70), PressureLevel::Warning);
        assert_eq!(config.level_for(0.85), PressureLevel::Critical);
        assert_eq!(config.level_for(0.699), PressureLevel::Normal);
    }

    #[test]
    fn recommendation_never_drops_below_one() {
        assert_eq!(PressureLevel::Warning.recommended_parallelism(1), 1);
        assert_eq!(PressureLevel::Critical.recommended_parallelism(64), 1);
        assert_eq!(PressureLevel::Normal.recommended_parallelism(3), 3);
    }

    #[test]
    fn config_validation() {
        assert!(MonitorConfig::default().validate().is_ok());

        let inverted = MonitorConfig {
            warning_threshold: 0.9,
            critical_threshold: 0.7,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());

        let saturated = MonitorConfig {
            critical_threshold: 1.0,
            ..Default::default()
        };
        assert!(saturated.validate().is_err());

        let zero_interval = MonitorConfig {
            polling_interval_ms: 0,
            ..Default::default()
        };
        assert!(zero_interval.validate().is_err());
    }

    #[test]
    fn procfs_probe_yields_sane_ratio() {
        // Works whether procfs is readable or the probe fell back to zeros.
        let ratio = ProcfsProbe.sample().used_ratio();
        assert!((0.0..=1.0).contains(&ratio));
    }

    #[tokio::test(start_paused = true)]
    async fn callback_fires_once_per_transition() {
        let probe = Arc::new(SequenceProbe::new(&[0.5, 0.5, 0.9, 0.9, 0.5]));
        let config = MonitorConfig {
            polling_interval_ms: 10,
            ..Default::default()
        };
        let monitor = LoadMonitor::with_probe(config, probe).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = Arc::clone(&seen);
        monitor.start_monitoring(move |level| seen_cb.lock().unwrap().push(level));

        tokio::time::sleep(Duration::from_millis(100)).await;
        monitor.stop_monitoring();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                PressureLevel::Normal,
                PressureLevel::Critical,
                PressureLevel::Normal,
            ]
        );
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let monitor = monitor_at(0.1);
        monitor.stop_monitoring();
        monitor.start_monitoring(|_| {});
        monitor.stop_monitoring();
        monitor.stop_monitoring();
    }
}
