//! The Resource Gate: a read-only admissibility check consulted by the
//! Scheduler before every job fire and by long-running Task Executor
//! handlers at every suspension point.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Timelike, Utc};
use rust_decimal::Decimal;

use autonomy_clock::{local_now, Clock, IdleSensor, SystemClock};
use autonomy_config::{AutonomyConfig, SchedulerMode};
use autonomy_error::AutonomyResult;
use autonomy_store::Store;
use autonomy_types::WorkloadClass;

/// A stricter CPU/memory ceiling than the idle thresholds, applied to
/// *every* workload class. Set high enough that it only trips under
/// genuine resource exhaustion rather than routine background load, since
/// `scheduled` work is meant to run even when the system is not idle.
pub const RESOURCE_PRESSURE_CPU_PCT: f32 = 90.0;
pub const RESOURCE_PRESSURE_MEM_PCT: f32 = 90.0;

/// Dev-mode nightly permitted window for exploration-class jobs: 22:00 up to (not including) 06:00 local.
pub const DEV_WINDOW_START_HOUR: u32 = 22;
pub const DEV_WINDOW_END_HOUR: u32 = 6;

#[derive(Debug, Clone)]
pub struct GateDecision {
 pub allowed: bool,
 /// One of the Resource Gate codes
 /// (`autonomy_disabled`/`budget_exhausted`/`not_idle`/
 /// `resource_pressure`/`window_closed`), or `None` when allowed.
 pub reason: Option<&'static str>,
}

impl GateDecision {
 fn allow() -> Self {
 Self {
 allowed: true,
 reason: None,
 }
 }

 fn deny(reason: &'static str) -> Self {
 Self {
 allowed: false,
 reason: Some(reason),
 }
 }
}

#[derive(Debug, Clone)]
pub struct GateDenial {
 pub at: DateTime<Utc>,
 pub workload_class: WorkloadClass,
 pub reason: &'static str,
}

const DENIAL_RING_SIZE: usize = 20;

pub struct ResourceGate<C: Clock = SystemClock> {
 store: Arc<Store>,
 idle_sensor: Arc<IdleSensor<C>>,
 config: AutonomyConfig,
 recent_denials: Mutex<VecDeque<GateDenial>>,
}

impl<C: Clock> ResourceGate<C> {
 pub fn new(store: Arc<Store>, idle_sensor: Arc<IdleSensor<C>>, config: AutonomyConfig) -> Self {
 Self {
 store,
 idle_sensor,
 config,
 recent_denials: Mutex::new(VecDeque::with_capacity(DENIAL_RING_SIZE)),
 }
 }

 /// Evaluate the gate rules in order, short-circuiting on the
 /// first denial. Read-only: never mutates the store.
 pub async fn allows(&self, workload_class: WorkloadClass) -> AutonomyResult<GateDecision> {
 let decision = self.evaluate(workload_class).await?;
 if let Some(reason) = decision.reason {
 self.record_denial(workload_class, reason);
 }
 Ok(decision)
 }

 async fn evaluate(&self, workload_class: WorkloadClass) -> AutonomyResult<GateDecision> {
 // Rule 1: master switch.
 if !self.config.autonomy_enabled {
 return Ok(GateDecision::deny("autonomy_disabled"));
 }

 // Rule 2: daily autonomous budget, including any recorded override.
 let today = Utc::now().date_naive();
 let summary = self.store.budget_summary_for(today).await?;
 let effective_budget = self.config.daily_budget_usd + summary.override_extra_usd;
 if summary.spent_today_usd >= effective_budget.max(Decimal::ZERO) {
 return Ok(GateDecision::deny("budget_exhausted"));
 }

 // Rule 3: exploration requires idleness.
 if workload_class == WorkloadClass::Exploration && !self.idle_sensor.is_idle() {
 return Ok(GateDecision::deny("not_idle"));
 }

 // Rule 4: per-class resource pressure ceiling, stricter than the
 // idle thresholds and applied regardless of workload class.
 if let Some(sample) = self.idle_sensor.last_sample() {
 if sample.cpu_pct > RESOURCE_PRESSURE_CPU_PCT || sample.mem_pct > RESOURCE_PRESSURE_MEM_PCT {
 return Ok(GateDecision::deny("resource_pressure"));
 }
 }

 // Rule 5: exploration additionally needs the permitted workload window.
 if workload_class == WorkloadClass::Exploration {
 let local = local_now(&self.config.scheduler_timezone, Utc::now())?;
 if !self.within_permitted_window(local.hour) {
 return Ok(GateDecision::deny("window_closed"));
 }
 }

 Ok(GateDecision::allow())
 }

 fn within_permitted_window(&self, local_hour: u32) -> bool {
 match self.config.scheduler_mode {
 SchedulerMode::Prod => true,
 SchedulerMode::Dev => {
 // Nightly window wraps midnight: [22, 24) union [0, 6).
 local_hour >= DEV_WINDOW_START_HOUR || local_hour < DEV_WINDOW_END_HOUR
 }
 }
 }

 fn record_denial(&self, workload_class: WorkloadClass, reason: &'static str) {
 let mut ring = self.recent_denials.lock().unwrap();
 if ring.len() == DENIAL_RING_SIZE {
 ring.pop_front();
 }
 ring.push_back(GateDenial {
 at: Utc::now(),
 workload_class,
 reason,
 });
 }

 /// Last 20 denials, newest last — backs `GET autonomy/status`'s
 /// `gate_last_denial` field.
 pub fn recent_denials(&self) -> Vec<GateDenial> {
 self.recent_denials.lock().unwrap().iter().cloned().collect()
 }
}

#[cfg(test)]
mod tests {
 use super::*;
 use autonomy_clock::IdleSensorConfig;
 use autonomy_config::SchedulerMode;
 use std::str::FromStr;

 fn base_config(enabled: bool, daily_budget: &str, mode: SchedulerMode) -> AutonomyConfig {
 AutonomyConfig {
 autonomy_enabled: enabled,
 daily_budget_usd: Decimal::from_str(daily_budget).unwrap(),
 per_query_budget_usd: Decimal::from_str("5.0").unwrap(),
 idle_threshold_minutes: 120,
 cpu_idle_pct: 20,
 mem_idle_pct: 70,
 outcome_window_days: 30,
 feedback_min_samples: 10,
 feedback_adjustment_max: 1.5,
 scheduler_timezone: "UTC".to_string(),
 scheduler_mode: mode,
 lock_kv_url: "sqlite://:memory:".to_string(),
 store_url: "sqlite://:memory:".to_string(),
 }
 }

 #[tokio::test]
 async fn disabled_autonomy_denies_everything() {
 let store = Arc::new(Store::open_in_memory().await.unwrap());
 let idle = Arc::new(IdleSensor::<SystemClock>::new(IdleSensorConfig::default()));
 let gate = ResourceGate::new(store, idle, base_config(false, "25.00", SchedulerMode::Prod));

 let decision = gate.allows(WorkloadClass::Scheduled).await.unwrap();
 assert!(!decision.allowed);
 assert_eq!(decision.reason, Some("autonomy_disabled"));
 }

 #[tokio::test]
 async fn budget_exhausted_denies() {
 let store = Arc::new(Store::open_in_memory().await.unwrap());
 store
.record_cost(
 autonomy_types::BudgetCategory::Autonomous,
 Decimal::from_str("5.00").unwrap(),
 None,
 None,
 None,
 None,
 )
.await
.unwrap();
 let idle = Arc::new(IdleSensor::<SystemClock>::new(IdleSensorConfig::default()));
 let gate = ResourceGate::new(store, idle, base_config(true, "5.00", SchedulerMode::Prod));

 let decision = gate.allows(WorkloadClass::Scheduled).await.unwrap();
 assert!(!decision.allowed);
 assert_eq!(decision.reason, Some("budget_exhausted"));
 }

 #[tokio::test]
 async fn exploration_denied_when_not_idle() {
 let store = Arc::new(Store::open_in_memory().await.unwrap());
 let idle = Arc::new(IdleSensor::<SystemClock>::new(IdleSensorConfig::default()));
 let gate = ResourceGate::new(store, idle, base_config(true, "25.00", SchedulerMode::Prod));

 // No samples recorded yet -> is_idle is false by construction.
 let decision = gate.allows(WorkloadClass::Exploration).await.unwrap();
 assert!(!decision.allowed);
 assert_eq!(decision.reason, Some("not_idle"));
 }

 #[tokio::test]
 async fn scheduled_workload_does_not_require_idle() {
 let store = Arc::new(Store::open_in_memory().await.unwrap());
 let idle = Arc::new(IdleSensor::<SystemClock>::new(IdleSensorConfig::default()));
 let gate = ResourceGate::new(store, idle, base_config(true, "25.00", SchedulerMode::Prod));

 let decision = gate.allows(WorkloadClass::Scheduled).await.unwrap();
 assert!(decision.allowed);
 }

 #[tokio::test]
 async fn dev_mode_window_wraps_midnight() {
 let store = Arc::new(Store::open_in_memory().await.unwrap());
 let idle = Arc::new(IdleSensor::<SystemClock>::new(IdleSensorConfig::default()));
 let gate = ResourceGate::new(store, idle, base_config(true, "25.00", SchedulerMode::Dev));

 assert!(gate.within_permitted_window(23));
 assert!(gate.within_permitted_window(2));
 assert!(!gate.within_permitted_window(12));
 }
}
