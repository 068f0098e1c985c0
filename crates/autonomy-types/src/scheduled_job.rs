use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadClass {
 Scheduled,
 Exploration,
}

impl WorkloadClass {
 pub fn as_str(self) -> &'static str {
 match self {
 WorkloadClass::Scheduled => "scheduled",
 WorkloadClass::Exploration => "exploration",
 }
 }
}

impl std::str::FromStr for WorkloadClass {
 type Err = String;
 fn from_str(s: &str) -> Result<Self, String> {
 Ok(match s {
 "scheduled" => WorkloadClass::Scheduled,
 "exploration" => WorkloadClass::Exploration,
 _ => return Err(format!("invalid workload class: {s}")),
 })
 }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
 Cron { expression: String },
 Interval { period_seconds: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRunStatus {
 Completed,
 Failed,
 Skipped,
}

impl JobRunStatus {
 pub fn as_str(self) -> &'static str {
 match self {
 JobRunStatus::Completed => "completed",
 JobRunStatus::Failed => "failed",
 JobRunStatus::Skipped => "skipped",
 }
 }
}

impl std::str::FromStr for JobRunStatus {
 type Err = String;
 fn from_str(s: &str) -> Result<Self, String> {
 Ok(match s {
 "completed" => JobRunStatus::Completed,
 "failed" => JobRunStatus::Failed,
 "skipped" => JobRunStatus::Skipped,
 _ => return Err(format!("invalid job run status: {s}")),
 })
 }
}

/// A durable scheduler entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
 pub id: String,
 pub handler_name: String,
 pub trigger: Trigger,
 pub timezone: String,
 pub enabled: bool,
 pub workload_class: WorkloadClass,

 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub next_run_at: Option<DateTime<Utc>>,
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub last_run_at: Option<DateTime<Utc>>,
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub last_status: Option<JobRunStatus>,
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub last_skip_reason: Option<String>,
}
