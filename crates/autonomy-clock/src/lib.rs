//! Monotonic time, timezone-aware civil time, and the debounced idle-state
//! signal. Every other component receives time through the
//! `Clock` trait rather than calling `Utc::now()`/`Instant::now()` directly,
//! so tests can substitute a fixed or stepped clock instead of sleeping real
//! time.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use sysinfo::System;

use autonomy_error::{AutonomyError, AutonomyResult};

/// Source of wall-clock time. `SystemClock` is the only production
/// implementation; tests use `FixedClock` to pin `now` to a value they
/// control, which is what makes the DST and idle-debounce tests in this
/// crate (and in `autonomy-scheduler`) deterministic.
pub trait Clock: Send + Sync {
 fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
 fn now(&self) -> DateTime<Utc> {
 Utc::now()
 }
}

/// A clock a test can advance by calling `set`/`advance`. Not used in
/// production code paths.
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
 pub fn new(at: DateTime<Utc>) -> Self {
 Self(Mutex::new(at))
 }

 pub fn set(&self, at: DateTime<Utc>) {
 *self.0.lock().unwrap() = at;
 }

 pub fn advance(&self, by: Duration) {
 let mut guard = self.0.lock().unwrap();
 *guard += by;
 }
}

impl Clock for FixedClock {
 fn now(&self) -> DateTime<Utc> {
 *self.0.lock().unwrap()
 }
}

/// Lets a shared clock (`Arc<FixedClock>` in tests that need the same
/// clock visible to several components, e.g. a scheduler and the gate it
/// consults) satisfy `Clock` itself without an extra wrapper type.
impl<C: Clock + ?Sized> Clock for Arc<C> {
 fn now(&self) -> DateTime<Utc> {
 (**self).now()
 }
}

/// Resolve `instant` into the civil (local) datetime of the given IANA
/// timezone name, e.g. for the Scheduler's cron evaluation and the Resource
/// Gate's permitted-hour check.
pub fn local_now(tz_name: &str, instant: DateTime<Utc>) -> AutonomyResult<DateTime<Tz>> {
 let zone: Tz = tz_name
.parse()
.map_err(|_| AutonomyError::ConfigInvalid(format!("unknown timezone {tz_name:?}")))?;
 Ok(instant.with_timezone(&zone))
}

/// One CPU/memory sample taken for the idle debounce window.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSample {
 pub at: DateTime<Utc>,
 pub cpu_pct: f32,
 pub mem_pct: f32,
}

/// Configuration for `IdleSensor`, derived from `AutonomyConfig`'s
/// `CPU_IDLE_PCT` / `MEM_IDLE_PCT` / `IDLE_THRESHOLD_MINUTES`.
#[derive(Debug, Clone, Copy)]
pub struct IdleSensorConfig {
 pub cpu_idle_pct: u8,
 pub mem_idle_pct: u8,
 pub idle_threshold_minutes: u32,
 /// Minimum gap enforced between samples; requires "sampling
 /// interval is ≥5 s".
 pub sample_interval: StdDuration,
 /// Number of trailing samples that must *all* pass for `is_idle` to
 /// return true — the debounce window. Three samples at the default 5s
 /// interval gives a 15s debounce, short enough to react promptly but
 /// long enough to absorb a single noisy reading.
 pub debounce_window: usize,
}

impl Default for IdleSensorConfig {
 fn default() -> Self {
 Self {
 cpu_idle_pct: 20,
 mem_idle_pct: 70,
 idle_threshold_minutes: 120,
 sample_interval: StdDuration::from_secs(5),
 debounce_window: 3,
 }
 }
}

/// Samples CPU/memory utilization and tracks the most recent interactive
/// session, producing the boolean idle signal the Resource Gate consults.
pub struct IdleSensor<C: Clock = SystemClock> {
 clock: C,
 config: IdleSensorConfig,
 system: Mutex<System>,
 samples: Mutex<VecDeque<ResourceSample>>,
 last_interactive_at: Mutex<DateTime<Utc>>,
}

impl IdleSensor<SystemClock> {
 pub fn new(config: IdleSensorConfig) -> Self {
 Self::with_clock(config, SystemClock)
 }
}

impl<C: Clock> IdleSensor<C> {
 pub fn with_clock(config: IdleSensorConfig, clock: C) -> Self {
 let now = clock.now();
 Self {
 clock,
 config,
 system: Mutex::new(System::new()),
 samples: Mutex::new(VecDeque::with_capacity(config.debounce_window)),
 last_interactive_at: Mutex::new(now),
 }
 }

 /// Record that a user-interactive session (chat turn, CAD edit, UI
 /// click) was observed just now, resetting the idle-window clock.
 pub fn record_activity(&self) {
 *self.last_interactive_at.lock().unwrap() = self.clock.now();
 }

 /// Refresh system counters and push a new sample into the trailing
 /// debounce window, dropping the oldest once the window is full. A
 /// caller (the scheduler's background tick) is expected to invoke this
 /// no more often than `sample_interval`; the sensor itself does not
 /// self-schedule sampling.
 pub fn sample(&self) -> ResourceSample {
 let mut system = self.system.lock().unwrap();
 system.refresh_cpu_usage();
 system.refresh_memory();

 let cpu_pct = if system.cpus().is_empty() {
 0.0
 } else {
 system.cpus().iter().map(|c| c.cpu_usage()).sum::<f32>() / system.cpus().len() as f32
 };
 let total_mem = system.total_memory().max(1);
 let mem_pct = (system.used_memory() as f64 / total_mem as f64 * 100.0) as f32;

 let sample = ResourceSample {
 at: self.clock.now(),
 cpu_pct,
 mem_pct,
 };

 let mut samples = self.samples.lock().unwrap();
 if samples.len() == self.config.debounce_window {
 samples.pop_front();
 }
 samples.push_back(sample);
 sample
 }

 /// Current idle signal: all samples in the trailing window must pass
 /// both thresholds, and no recorded interactive session within
 /// `idle_threshold_minutes`.
 pub fn is_idle(&self) -> bool {
 let samples = self.samples.lock().unwrap();
 if samples.len() < self.config.debounce_window {
 return false;
 }
 let cpu_mem_ok = samples
.iter()
.all(|s| s.cpu_pct < self.config.cpu_idle_pct as f32 && s.mem_pct < self.config.mem_idle_pct as f32);
 drop(samples);

 let last_interactive = *self.last_interactive_at.lock().unwrap();
 let idle_gap = self.clock.now() - last_interactive;
 let interactive_ok = idle_gap >= Duration::minutes(self.config.idle_threshold_minutes as i64);

 cpu_mem_ok && interactive_ok
 }

 /// Latest snapshot used for `GET autonomy/status`.
 pub fn last_sample(&self) -> Option<ResourceSample> {
 self.samples.lock().unwrap().back().copied()
 }
}

#[cfg(test)]
mod tests {
 use super::*;

 fn idle_sample(at: DateTime<Utc>) -> ResourceSample {
 ResourceSample {
 at,
 cpu_pct: 5.0,
 mem_pct: 30.0,
 }
 }

 fn busy_sample(at: DateTime<Utc>) -> ResourceSample {
 ResourceSample {
 at,
 cpu_pct: 95.0,
 mem_pct: 30.0,
 }
 }

 struct TestSensor {
 clock: std::sync::Arc<FixedClock>,
 config: IdleSensorConfig,
 samples: VecDeque<ResourceSample>,
 last_interactive_at: DateTime<Utc>,
 }

 // Exercises the debounce/threshold/interactive-gap logic directly
 // against synthetic samples, since `IdleSensor::sample` reads real
 // system counters that a unit test cannot control.
 impl TestSensor {
 fn is_idle(&self) -> bool {
 if self.samples.len() < self.config.debounce_window {
 return false;
 }
 let cpu_mem_ok = self
.samples
.iter()
.all(|s| s.cpu_pct < self.config.cpu_idle_pct as f32 && s.mem_pct < self.config.mem_idle_pct as f32);
 let idle_gap = self.clock.now() - self.last_interactive_at;
 let interactive_ok =
 idle_gap >= Duration::minutes(self.config.idle_threshold_minutes as i64);
 cpu_mem_ok && interactive_ok
 }
 }

 #[test]
 fn requires_full_debounce_window() {
 let clock = std::sync::Arc::new(FixedClock::new(Utc::now()));
 let config = IdleSensorConfig::default();
 let mut sensor = TestSensor {
 clock: clock.clone(),
 config,
 samples: VecDeque::new(),
 last_interactive_at: clock.now() - Duration::hours(3),
 };
 sensor.samples.push_back(idle_sample(clock.now()));
 assert!(!sensor.is_idle(), "fewer than debounce_window samples is never idle");
 }

 #[test]
 fn one_busy_sample_blocks_idle() {
 let clock = std::sync::Arc::new(FixedClock::new(Utc::now()));
 let config = IdleSensorConfig::default();
 let mut sensor = TestSensor {
 clock: clock.clone(),
 config,
 samples: VecDeque::new(),
 last_interactive_at: clock.now() - Duration::hours(3),
 };
 sensor.samples.push_back(idle_sample(clock.now()));
 sensor.samples.push_back(busy_sample(clock.now()));
 sensor.samples.push_back(idle_sample(clock.now()));
 assert!(!sensor.is_idle());
 }

 #[test]
 fn recent_interactive_session_blocks_idle() {
 let clock = std::sync::Arc::new(FixedClock::new(Utc::now()));
 let config = IdleSensorConfig::default();
 let mut sensor = TestSensor {
 clock: clock.clone(),
 config,
 samples: VecDeque::new(),
 last_interactive_at: clock.now() - Duration::minutes(5),
 };
 for _ in 0..config.debounce_window {
 sensor.samples.push_back(idle_sample(clock.now()));
 }
 assert!(!sensor.is_idle());
 }

 #[test]
 fn all_conditions_met_is_idle() {
 let clock = std::sync::Arc::new(FixedClock::new(Utc::now()));
 let config = IdleSensorConfig::default();
 let mut sensor = TestSensor {
 clock: clock.clone(),
 config,
 samples: VecDeque::new(),
 last_interactive_at: clock.now() - Duration::minutes(130),
 };
 for _ in 0..config.debounce_window {
 sensor.samples.push_back(idle_sample(clock.now()));
 }
 assert!(sensor.is_idle());
 }

 #[test]
 fn local_now_converts_timezone() {
 let instant = DateTime::parse_from_rfc3339("2026-07-28T00:00:00Z")
.unwrap()
.with_timezone(&Utc);
 let local = local_now("America/Los_Angeles", instant).unwrap();
 assert_eq!(local.timezone(), chrono_tz::America::Los_Angeles);
 }

 #[test]
 fn local_now_rejects_unknown_timezone() {
 let instant = Utc::now();
 assert!(local_now("Mars/Olympus_Mons", instant).is_err());
 }
}
