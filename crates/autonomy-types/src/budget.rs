use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::Usd;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetCategory {
 Autonomous,
 PerQuery,
}

impl BudgetCategory {
 pub fn as_str(self) -> &'static str {
 match self {
 BudgetCategory::Autonomous => "autonomous",
 BudgetCategory::PerQuery => "per_query",
 }
 }
}

impl std::str::FromStr for BudgetCategory {
 type Err = String;
 fn from_str(s: &str) -> Result<Self, String> {
 Ok(match s {
 "autonomous" => BudgetCategory::Autonomous,
 "per_query" => BudgetCategory::PerQuery,
 _ => return Err(format!("invalid budget category: {s}")),
 })
 }
}

/// One row per recorded cost event. Append-only:
/// `project.spent_budget_usd` is a cached sum updated in the same
/// transaction as the insert, never any other way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetLedgerEntry {
 pub id: String,
 pub when: DateTime<Utc>,
 pub category: BudgetCategory,
 pub amount_usd: Usd,
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub goal_id: Option<String>,
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub project_id: Option<String>,
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub task_id: Option<String>,
 /// Idempotency key. Typically `task_id` plus
 /// attempt number.
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub idempotency_key: Option<String>,
}

/// A recorded operator override permitting autonomous spend on a given
/// local date to exceed `daily_budget_usd`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetOverride {
 pub id: String,
 pub date: NaiveDate,
 pub authorized_by: String,
 pub reason: String,
 pub extra_usd: Usd,
 pub created_at: DateTime<Utc>,
}
