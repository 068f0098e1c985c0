use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Usd;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
 Proposed,
 Active,
 Completed,
 Cancelled,
 Failed,
}

impl ProjectStatus {
 pub fn as_str(self) -> &'static str {
 match self {
 ProjectStatus::Proposed => "proposed",
 ProjectStatus::Active => "active",
 ProjectStatus::Completed => "completed",
 ProjectStatus::Cancelled => "cancelled",
 ProjectStatus::Failed => "failed",
 }
 }
}

impl std::str::FromStr for ProjectStatus {
 type Err = String;
 fn from_str(s: &str) -> Result<Self, String> {
 Ok(match s {
 "proposed" => ProjectStatus::Proposed,
 "active" => ProjectStatus::Active,
 "completed" => ProjectStatus::Completed,
 "cancelled" => ProjectStatus::Cancelled,
 "failed" => ProjectStatus::Failed,
 _ => return Err(format!("invalid project status: {s}")),
 })
 }
}

/// An approved goal's execution plan. One-to-one with
/// approved goals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
 pub id: String,
 pub goal_id: String,
 pub status: ProjectStatus,

 pub allocated_budget_usd: Usd,
 pub spent_budget_usd: Usd,

 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub actual_cost_usd: Option<Usd>,
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub actual_duration_hours: Option<f64>,

 pub created_at: DateTime<Utc>,
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub started_at: Option<DateTime<Utc>>,
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub completed_at: Option<DateTime<Utc>>,
}

impl Project {
 /// Invariant: `spent_budget_usd` must never exceed
 /// `allocated_budget_usd`.
 pub fn would_exceed_budget(&self, additional: Usd) -> bool {
 self.spent_budget_usd + additional > self.allocated_budget_usd
 }
}
