use std::fmt;

use clap::Parser;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerMode {
 /// Exploration-class jobs restricted to a narrow nightly window.
 Dev,
 /// Exploration-class jobs permitted 24/7 subject to idleness.
 Prod,
}

impl fmt::Display for SchedulerMode {
 fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
 f.write_str(match self {
 SchedulerMode::Dev => "dev",
 SchedulerMode::Prod => "prod",
 })
 }
}

/// The autonomy core's single, immutable startup configuration. Built once
/// in `autonomyd`'s `main` from the environment variables below and handed
/// to every component by reference thereafter — no component reads
/// `std::env` directly.
#[derive(Debug, Clone)]
pub struct AutonomyConfig {
 pub autonomy_enabled: bool,
 pub daily_budget_usd: Decimal,
 pub per_query_budget_usd: Decimal,
 pub idle_threshold_minutes: u32,
 pub cpu_idle_pct: u8,
 pub mem_idle_pct: u8,
 pub outcome_window_days: u32,
 pub feedback_min_samples: u32,
 pub feedback_adjustment_max: f64,
 pub scheduler_timezone: String,
 pub scheduler_mode: SchedulerMode,
 pub lock_kv_url: String,
 pub store_url: String,
}

/// Every field is read through `clap`'s `env` support so the same values
/// are also settable as CLI flags for local runs. Nothing here is
/// `required = true`:
/// required-ness is enforced once, by `AutonomyConfig::from_raw`, so that a
/// missing *or* invalid variable is reported alongside every other problem
/// in a single diagnostic rather than failing fast on the first one.
#[derive(Parser, Debug, Default)]
#[command(name = "autonomyd")]
struct RawConfig {
 #[arg(long, env = "AUTONOMY_ENABLED")]
 autonomy_enabled: Option<String>,
 #[arg(long, env = "DAILY_BUDGET_USD")]
 daily_budget_usd: Option<String>,
 #[arg(long, env = "PER_QUERY_BUDGET_USD")]
 per_query_budget_usd: Option<String>,
 #[arg(long, env = "IDLE_THRESHOLD_MINUTES")]
 idle_threshold_minutes: Option<String>,
 #[arg(long, env = "CPU_IDLE_PCT")]
 cpu_idle_pct: Option<String>,
 #[arg(long, env = "MEM_IDLE_PCT")]
 mem_idle_pct: Option<String>,
 #[arg(long, env = "OUTCOME_WINDOW_DAYS")]
 outcome_window_days: Option<String>,
 #[arg(long, env = "FEEDBACK_MIN_SAMPLES")]
 feedback_min_samples: Option<String>,
 #[arg(long, env = "FEEDBACK_ADJUSTMENT_MAX")]
 feedback_adjustment_max: Option<String>,
 #[arg(long, env = "SCHEDULER_TIMEZONE")]
 scheduler_timezone: Option<String>,
 #[arg(long, env = "SCHEDULER_MODE")]
 scheduler_mode: Option<String>,
 #[arg(long, env = "LOCK_KV_URL")]
 lock_kv_url: Option<String>,
 #[arg(long, env = "STORE_URL")]
 store_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid configuration:\n{}",.0.join("\n"))]
pub struct ConfigError(pub Vec<String>);

struct Problems(Vec<String>);

impl Problems {
 fn new() -> Self {
 Problems(Vec::new())
 }

 fn require(&mut self, name: &str, value: &Option<String>) -> Option<String> {
 match value {
 Some(v) if !v.trim().is_empty() => Some(v.clone()),
 _ => {
 self.0.push(format!("{name}: missing required variable"));
 None
 }
 }
 }

 fn parse_required<T: std::str::FromStr>(&mut self, name: &str, value: &Option<String>) -> Option<T> {
 let raw = self.require(name, value)?;
 match raw.parse::<T>() {
 Ok(v) => Some(v),
 Err(_) => {
 self.0.push(format!("{name}: invalid value {raw:?}"));
 None
 }
 }
 }

 fn parse_with_default<T: std::str::FromStr>(&mut self, name: &str, value: &Option<String>, default: T) -> T {
 match value {
 None => default,
 Some(raw) if raw.trim().is_empty() => default,
 Some(raw) => match raw.parse::<T>() {
 Ok(v) => v,
 Err(_) => {
 self.0.push(format!("{name}: invalid value {raw:?}"));
 default
 }
 },
 }
 }
}

impl AutonomyConfig {
 /// Parse from `std::env` (and, for local runs, matching CLI flags),
 /// collecting every missing or malformed variable before failing.
 pub fn from_env() -> Result<Self, ConfigError> {
 let raw = RawConfig::parse();
 Self::from_raw(raw)
 }

 fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
 let mut problems = Problems::new();

 let autonomy_enabled = match problems.require("AUTONOMY_ENABLED", &raw.autonomy_enabled) {
 Some(v) => match v.to_ascii_lowercase().as_str() {
 "1" | "true" | "yes" => true,
 "0" | "false" | "no" => false,
 _ => {
 problems.0.push(format!("AUTONOMY_ENABLED: invalid bool {v:?}"));
 false
 }
 },
 None => false,
 };

 let daily_budget_usd = problems
.parse_required::<Decimal>("DAILY_BUDGET_USD", &raw.daily_budget_usd)
.unwrap_or(Decimal::ZERO);
 let per_query_budget_usd = problems
.parse_required::<Decimal>("PER_QUERY_BUDGET_USD", &raw.per_query_budget_usd)
.unwrap_or(Decimal::ZERO);

 let idle_threshold_minutes =
 problems.parse_with_default("IDLE_THRESHOLD_MINUTES", &raw.idle_threshold_minutes, 120u32);
 let cpu_idle_pct = problems.parse_with_default("CPU_IDLE_PCT", &raw.cpu_idle_pct, 20u8);
 let mem_idle_pct = problems.parse_with_default("MEM_IDLE_PCT", &raw.mem_idle_pct, 70u8);
 if cpu_idle_pct > 100 {
 problems.0.push("CPU_IDLE_PCT: must be between 0 and 100".to_string());
 }
 if mem_idle_pct > 100 {
 problems.0.push("MEM_IDLE_PCT: must be between 0 and 100".to_string());
 }

 let outcome_window_days =
 problems.parse_with_default("OUTCOME_WINDOW_DAYS", &raw.outcome_window_days, 30u32);
 let feedback_min_samples =
 problems.parse_with_default("FEEDBACK_MIN_SAMPLES", &raw.feedback_min_samples, 10u32);
 let feedback_adjustment_max = problems.parse_with_default(
 "FEEDBACK_ADJUSTMENT_MAX",
 &raw.feedback_adjustment_max,
 1.5f64,
 );

 let scheduler_timezone = problems
.require("SCHEDULER_TIMEZONE", &raw.scheduler_timezone)
.unwrap_or_else(|| "UTC".to_string());

 let scheduler_mode = match problems.require("SCHEDULER_MODE", &raw.scheduler_mode) {
 Some(v) => match v.to_ascii_lowercase().as_str() {
 "dev" => SchedulerMode::Dev,
 "prod" => SchedulerMode::Prod,
 _ => {
 problems
.0
.push(format!("SCHEDULER_MODE: must be \"dev\" or \"prod\", got {v:?}"));
 SchedulerMode::Prod
 }
 },
 None => SchedulerMode::Prod,
 };

 let lock_kv_url = problems
.require("LOCK_KV_URL", &raw.lock_kv_url)
.unwrap_or_default();
 let store_url = problems
.require("STORE_URL", &raw.store_url)
.unwrap_or_default();

 if !problems.0.is_empty() {
 return Err(ConfigError(problems.0));
 }

 Ok(AutonomyConfig {
 autonomy_enabled,
 daily_budget_usd,
 per_query_budget_usd,
 idle_threshold_minutes,
 cpu_idle_pct,
 mem_idle_pct,
 outcome_window_days,
 feedback_min_samples,
 feedback_adjustment_max,
 scheduler_timezone,
 scheduler_mode,
 lock_kv_url,
 store_url,
 })
 }
}

#[cfg(test)]
mod tests {
 use super::*;

 fn base_raw() -> RawConfig {
 RawConfig {
 autonomy_enabled: Some("true".to_string()),
 daily_budget_usd: Some("25.0000".to_string()),
 per_query_budget_usd: Some("5.0000".to_string()),
 idle_threshold_minutes: None,
 cpu_idle_pct: None,
 mem_idle_pct: None,
 outcome_window_days: None,
 feedback_min_samples: None,
 feedback_adjustment_max: None,
 scheduler_timezone: Some("America/Los_Angeles".to_string()),
 scheduler_mode: Some("dev".to_string()),
 lock_kv_url: Some("redis://localhost:6379".to_string()),
 store_url: Some("sqlite:///var/lib/autonomy/core.db".to_string()),
 }
 }

 #[test]
 fn defaults_fill_in_when_omitted() {
 let cfg = AutonomyConfig::from_raw(base_raw()).expect("valid config");
 assert_eq!(cfg.idle_threshold_minutes, 120);
 assert_eq!(cfg.cpu_idle_pct, 20);
 assert_eq!(cfg.mem_idle_pct, 70);
 assert_eq!(cfg.outcome_window_days, 30);
 assert_eq!(cfg.feedback_min_samples, 10);
 assert_eq!(cfg.feedback_adjustment_max, 1.5);
 assert_eq!(cfg.scheduler_mode, SchedulerMode::Dev);
 }

 #[test]
 fn missing_required_variables_are_collected_together() {
 let mut raw = base_raw();
 raw.daily_budget_usd = None;
 raw.lock_kv_url = None;
 let err = AutonomyConfig::from_raw(raw).unwrap_err();
 assert!(err.0.iter().any(|p| p.contains("DAILY_BUDGET_USD")));
 assert!(err.0.iter().any(|p| p.contains("LOCK_KV_URL")));
 assert_eq!(err.0.len(), 2);
 }

 #[test]
 fn invalid_scheduler_mode_is_rejected() {
 let mut raw = base_raw();
 raw.scheduler_mode = Some("nightly".to_string());
 let err = AutonomyConfig::from_raw(raw).unwrap_err();
 assert!(err.0.iter().any(|p| p.contains("SCHEDULER_MODE")));
 }
}
