use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Usd;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
 Pending,
 Ready,
 Running,
 Completed,
 Failed,
 Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
 // Declaration order doubles as the strict total order required by
 // dispatch: Low < Medium < High < Critical.
 Low,
 Medium,
 High,
 Critical,
}

impl TaskStatus {
 pub fn as_str(self) -> &'static str {
 match self {
 TaskStatus::Pending => "pending",
 TaskStatus::Ready => "ready",
 TaskStatus::Running => "running",
 TaskStatus::Completed => "completed",
 TaskStatus::Failed => "failed",
 TaskStatus::Skipped => "skipped",
 }
 }
}

impl std::str::FromStr for TaskStatus {
 type Err = String;
 fn from_str(s: &str) -> Result<Self, String> {
 Ok(match s {
 "pending" => TaskStatus::Pending,
 "ready" => TaskStatus::Ready,
 "running" => TaskStatus::Running,
 "completed" => TaskStatus::Completed,
 "failed" => TaskStatus::Failed,
 "skipped" => TaskStatus::Skipped,
 _ => return Err(format!("invalid task status: {s}")),
 })
 }
}

impl TaskPriority {
 pub fn as_str(self) -> &'static str {
 match self {
 TaskPriority::Low => "low",
 TaskPriority::Medium => "medium",
 TaskPriority::High => "high",
 TaskPriority::Critical => "critical",
 }
 }
}

impl std::str::FromStr for TaskPriority {
 type Err = String;
 fn from_str(s: &str) -> Result<Self, String> {
 Ok(match s {
 "low" => TaskPriority::Low,
 "medium" => TaskPriority::Medium,
 "high" => TaskPriority::High,
 "critical" => TaskPriority::Critical,
 _ => return Err(format!("invalid task priority: {s}")),
 })
 }
}

/// A leaf unit of work inside a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
 pub id: String,
 pub project_id: String,
 pub task_type: String,
 pub status: TaskStatus,
 pub priority: TaskPriority,

 #[serde(default)]
 pub depends_on: BTreeSet<String>,
 /// Dependencies listed here are "strict": a `skipped`
 /// dependency only counts as satisfied when the dependent did *not*
 /// mark the edge strict.
 #[serde(default)]
 pub strict_depends_on: BTreeSet<String>,

 pub estimated_cost_usd: Usd,
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub actual_cost_usd: Option<Usd>,

 #[serde(default)]
 pub payload: Map<String, Value>,
 #[serde(default)]
 pub result: Map<String, Value>,

 #[serde(default)]
 pub attempt_count: u32,
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub last_error: Option<String>,

 /// Whether the template marks this task as critical to the project:
 /// a fatal failure here fails the whole project.
 #[serde(default)]
 pub project_critical: bool,

 pub created_at: DateTime<Utc>,
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub started_at: Option<DateTime<Utc>>,
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub completed_at: Option<DateTime<Utc>>,

 /// Set by the executor's retry backoff when a `failed_retryable`
 /// outcome sends the task back to `ready`; dispatch skips it until this
 /// instant passes.
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub retry_not_before: Option<DateTime<Utc>>,
}

impl Task {
 pub fn is_terminal(&self) -> bool {
 matches!(
 self.status,
 TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
 )
 }

 /// Whether this task satisfies a dependency edge:
 /// `completed` always satisfies it; `skipped` satisfies it unless the
 /// dependent marked the edge strict.
 pub fn satisfies_dependency(&self, strict: bool) -> bool {
 match self.status {
 TaskStatus::Completed => true,
 TaskStatus::Skipped => !strict,
 _ => false,
 }
 }
}

/// Outcome a task-type handler reports back to the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
 pub status: TaskOutcomeStatus,
 #[serde(default)]
 pub result: Map<String, Value>,
 pub cost_usd: Usd,
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcomeStatus {
 Completed,
 FailedRetryable,
 FailedFatal,
}

impl TaskOutcomeStatus {
 pub fn as_str(self) -> &'static str {
 match self {
 TaskOutcomeStatus::Completed => "completed",
 TaskOutcomeStatus::FailedRetryable => "failed_retryable",
 TaskOutcomeStatus::FailedFatal => "failed_fatal",
 }
 }
}

impl std::str::FromStr for TaskOutcomeStatus {
 type Err = String;
 fn from_str(s: &str) -> Result<Self, String> {
 Ok(match s {
 "completed" => TaskOutcomeStatus::Completed,
 "failed_retryable" => TaskOutcomeStatus::FailedRetryable,
 "failed_fatal" => TaskOutcomeStatus::FailedFatal,
 _ => return Err(format!("invalid task outcome status: {s}")),
 })
 }
}
