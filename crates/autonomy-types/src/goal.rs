use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Usd;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
 Research,
 Improvement,
 Optimization,
 Learning,
 Exploration,
}

impl GoalType {
 pub fn as_str(self) -> &'static str {
 match self {
 GoalType::Research => "research",
 GoalType::Improvement => "improvement",
 GoalType::Optimization => "optimization",
 GoalType::Learning => "learning",
 GoalType::Exploration => "exploration",
 }
 }
}

impl std::str::FromStr for GoalType {
 type Err = String;
 fn from_str(s: &str) -> Result<Self, String> {
 Ok(match s {
 "research" => GoalType::Research,
 "improvement" => GoalType::Improvement,
 "optimization" => GoalType::Optimization,
 "learning" => GoalType::Learning,
 "exploration" => GoalType::Exploration,
 _ => return Err(format!("invalid goal type: {s}")),
 })
 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
 Identified,
 Approved,
 Rejected,
 Completed,
 Failed,
}

impl GoalStatus {
 pub fn as_str(self) -> &'static str {
 match self {
 GoalStatus::Identified => "identified",
 GoalStatus::Approved => "approved",
 GoalStatus::Rejected => "rejected",
 GoalStatus::Completed => "completed",
 GoalStatus::Failed => "failed",
 }
 }
}

impl std::str::FromStr for GoalStatus {
 type Err = String;
 fn from_str(s: &str) -> Result<Self, String> {
 Ok(match s {
 "identified" => GoalStatus::Identified,
 "approved" => GoalStatus::Approved,
 "rejected" => GoalStatus::Rejected,
 "completed" => GoalStatus::Completed,
 "failed" => GoalStatus::Failed,
 _ => return Err(format!("invalid goal status: {s}")),
 })
 }
}

/// A proposed unit of autonomous work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
 pub id: String,
 pub title: String,
 pub description: String,
 pub goal_type: GoalType,
 pub status: GoalStatus,

 pub base_impact_score: f64,
 pub adjustment_factor: f64,
 pub adjusted_impact_score: f64,

 pub estimated_cost_usd: Usd,
 pub budget_limit_usd: Usd,

 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub approved_by: Option<String>,
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub approved_at: Option<DateTime<Utc>>,
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub approval_notes: Option<String>,

 #[serde(default = "default_true")]
 pub learn_from: bool,

 #[serde(default)]
 pub baseline_captured: bool,
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub baseline_captured_at: Option<DateTime<Utc>>,

 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub outcome_measured_at: Option<DateTime<Utc>>,
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub effectiveness_score: Option<f64>,

 #[serde(default)]
 pub metadata: Map<String, Value>,

 pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
 true
}

/// Clamp a raw impact score into the `[0, 100]` range.
pub fn clamp_impact_score(value: f64) -> f64 {
 value.clamp(0.0, 100.0)
}

impl Goal {
 pub fn adjusted_score(base_impact_score: f64, adjustment_factor: f64) -> f64 {
 clamp_impact_score(base_impact_score * adjustment_factor)
 }
}
