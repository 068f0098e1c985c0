use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use autonomy_types::GoalType;

/// A proposal a strategy has found, prior to feedback adjustment or
/// persistence.
#[derive(Debug, Clone)]
pub struct GoalCandidate {
 pub title: String,
 pub description: String,
 pub goal_type: GoalType,
 pub base_impact_score: f64,
 /// Carried through to the tie-break rule ("strategic_value desc").
 pub strategic_value: f64,
 /// Oldest underlying evidence timestamp, for the "oldest underlying
 /// evidence first" tie-break.
 pub evidence_since: DateTime<Utc>,
 pub estimated_cost_usd: Decimal,
 pub budget_limit_usd: Decimal,
 pub metadata: Map<String, Value>,
}

/// The five weighted components of the goal-generator scoring formula, each
/// clamped to `[0, 1]` before combination.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImpactComponents {
 pub frequency: f64,
 pub severity: f64,
 pub cost_savings: f64,
 pub knowledge_gap: f64,
 pub strategic_value: f64,
}

pub const WEIGHT_FREQUENCY: f64 = 0.20;
pub const WEIGHT_SEVERITY: f64 = 0.25;
pub const WEIGHT_COST_SAVINGS: f64 = 0.20;
pub const WEIGHT_KNOWLEDGE_GAP: f64 = 0.20;
pub const WEIGHT_STRATEGIC_VALUE: f64 = 0.15;

/// `base_impact = 100 x (0.20*frequency + 0.25*severity + 0.20*cost_savings
/// + 0.20*knowledge_gap + 0.15*strategic_value)`, each component
/// clamped into `[0, 1]` first.
pub fn base_impact(components: ImpactComponents) -> f64 {
 let c = |v: f64| v.clamp(0.0, 1.0);
 100.0
 * (WEIGHT_FREQUENCY * c(components.frequency)
 + WEIGHT_SEVERITY * c(components.severity)
 + WEIGHT_COST_SAVINGS * c(components.cost_savings)
 + WEIGHT_KNOWLEDGE_GAP * c(components.knowledge_gap)
 + WEIGHT_STRATEGIC_VALUE * c(components.strategic_value))
}
