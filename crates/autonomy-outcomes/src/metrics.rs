//! Goal-type-specific baseline/outcome metric shapes and the four
//! effectiveness components they feed.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use autonomy_error::AutonomyResult;
use autonomy_types::{GoalType, MetricsProbe};

/// A goal's value-per-event constant for the saturating ROI curve. One
/// avoided query miss is worth this much in analyst time saved.
pub const RESEARCH_VALUE_PER_QUERY_HIT_USD: f64 = 2.0;

/// `value / (value + 1)` saturates any non-negative value into `[0, 1)`
/// without a hard ceiling, used to map the roi component onto a bounded
/// range.
pub fn saturating_curve(value: f64) -> f64 {
 if value <= 0.0 {
 0.0
 } else {
 value / (value + 1.0)
 }
}

pub async fn capture_metrics(
 probe: &dyn MetricsProbe,
 goal_type: GoalType,
 metadata: &Map<String, Value>,
 since: DateTime<Utc>,
 until: DateTime<Utc>,
) -> AutonomyResult<Map<String, Value>> {
 let mut metrics = Map::new();
 match goal_type {
 GoalType::Research => {
 let slug = metadata
.get("topic_slug")
.and_then(Value::as_str())
.unwrap_or_default();
 let existing = probe.existing_kb_slugs().await?;
 let article_count = if existing.iter().any(|s| s == slug) { 1 } else { 0 };
 let miss_rate = probe.recent_query_miss_rate_for_slug(slug).await?;
 metrics.insert("kb_article_count_for_slug".into(), json!(article_count));
 metrics.insert("recent_query_miss_rate_for_slug".into(), json!(miss_rate));
 }
 GoalType::Improvement => {
 let reason = metadata
.get("failure_reason")
.and_then(Value::as_str())
.unwrap_or("unknown");
 let by_reason = probe.failures_by_reason(since, until).await?;
 let failure_count = by_reason.get(reason).copied().unwrap_or(0);
 let failures = probe.recent_print_failures(since, until).await?;
 let matching: Vec<_> = failures.iter().filter(|f| f.reason == reason).collect();
 let mean_cost = if matching.is_empty() {
 0.0
 } else {
 let total: rust_decimal::Decimal = matching.iter().map(|f| f.cost_usd).sum();
 let total_f64: f64 = total.to_string().parse().unwrap_or(0.0);
 total_f64 / matching.len() as f64
 };
 metrics.insert("failure_count_30d_for_reason".into(), json!(failure_count));
 metrics.insert("mean_cost_per_failure_30d".into(), json!(mean_cost));
 }
 GoalType::Optimization => {
 let fraction = probe.tier_spend_fraction(since, until).await?;
 let total = probe.total_spend(since, until).await?;
 let total_f64: f64 = total.to_string().parse().unwrap_or(0.0);
 metrics.insert("tier_spend_fraction_30d".into(), json!(fraction));
 metrics.insert("total_spend_30d".into(), json!(total_f64));
 }
 GoalType::Learning | GoalType::Exploration => {
 // Learning and exploration goals carry no comparable baseline
 // metric and fall back to a neutral scoring below.
 }
 }
 Ok(metrics)
}

fn num(metrics: &Map<String, Value>, key: &str) -> f64 {
 metrics.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

/// The four weighted effectiveness components, computed from
/// a goal's baseline and post-window outcome metrics.
pub struct EffectivenessComponents {
 pub impact: f64,
 pub roi: f64,
 pub adoption: f64,
 pub quality: f64,
}

#[allow(clippy::too_many_arguments)]
pub fn score_components(
 goal_type: GoalType,
 baseline: &Map<String, Value>,
 outcome: &Map<String, Value>,
 actual_cost_usd: f64,
 query_hits_since: u64,
 quality: Option<f64>,
) -> EffectivenessComponents {
 let (impact, roi, adoption) = match goal_type {
 GoalType::Research => {
 let baseline_miss = num(baseline, "recent_query_miss_rate_for_slug");
 let outcome_miss = num(outcome, "recent_query_miss_rate_for_slug");
 let impact = (baseline_miss - outcome_miss).clamp(0.0, 1.0);
 let value_created = query_hits_since as f64 * RESEARCH_VALUE_PER_QUERY_HIT_USD;
 let roi = saturating_curve(value_created / actual_cost_usd.max(0.01));
 let adoption = saturating_curve(query_hits_since as f64 / 3.0);
 (impact, roi, adoption)
 }
 GoalType::Improvement => {
 let baseline_count = num(baseline, "failure_count_30d_for_reason");
 let outcome_count = num(outcome, "failure_count_30d_for_reason");
 let mean_cost = num(baseline, "mean_cost_per_failure_30d");
 let impact = if baseline_count <= 0.0 {
 0.0
 } else {
 ((baseline_count - outcome_count) / baseline_count).clamp(0.0, 1.0)
 };
 let value_created = (baseline_count - outcome_count).max(0.0) * mean_cost;
 let roi = saturating_curve(value_created / actual_cost_usd.max(0.01));
 let adoption = if outcome_count < baseline_count { 1.0 } else { 0.0 };
 (impact, roi, adoption)
 }
 GoalType::Optimization => {
 let baseline_fraction = num(baseline, "tier_spend_fraction_30d");
 let outcome_fraction = num(outcome, "tier_spend_fraction_30d");
 let total_spend = num(baseline, "total_spend_30d");
 let impact = if baseline_fraction <= 0.0 {
 0.0
 } else {
 ((baseline_fraction - outcome_fraction) / baseline_fraction).clamp(0.0, 1.0)
 };
 let value_created = (baseline_fraction - outcome_fraction).max(0.0) * total_spend;
 let roi = saturating_curve(value_created / actual_cost_usd.max(0.01));
 let adoption = if outcome_fraction < baseline_fraction { 1.0 } else { 0.0 };
 (impact, roi, adoption)
 }
 GoalType::Learning | GoalType::Exploration => (0.5, 0.5, 0.5),
 };

 EffectivenessComponents {
 impact,
 roi,
 adoption,
 quality: quality.unwrap_or(0.5),
 }
}

#[cfg(test)]
mod tests {
 use super::*;

 #[test]
 fn saturating_curve_is_zero_at_zero_and_bounded_below_one() {
 assert_eq!(saturating_curve(0.0), 0.0);
 assert!(saturating_curve(1_000_000.0) < 1.0);
 assert!(saturating_curve(1.0) > 0.0);
 }

 #[test]
 fn improvement_impact_reflects_failure_count_reduction() {
 let mut baseline = Map::new();
 baseline.insert("failure_count_30d_for_reason".into(), json!(10));
 baseline.insert("mean_cost_per_failure_30d".into(), json!(20.0));
 let mut outcome = Map::new();
 outcome.insert("failure_count_30d_for_reason".into(), json!(2));

 let components = score_components(GoalType::Improvement, &baseline, &outcome, 50.0, 0, None);
 assert!((components.impact - 0.8).abs() < 1e-9);
 assert_eq!(components.adoption, 1.0);
 assert_eq!(components.quality, 0.5);
 }

 #[test]
 fn no_improvement_yields_zero_impact_and_adoption() {
 let mut baseline = Map::new();
 baseline.insert("failure_count_30d_for_reason".into(), json!(10));
 baseline.insert("mean_cost_per_failure_30d".into(), json!(20.0));
 let mut outcome = Map::new();
 outcome.insert("failure_count_30d_for_reason".into(), json!(10));

 let components = score_components(GoalType::Improvement, &baseline, &outcome, 50.0, 0, None);
 assert_eq!(components.impact, 0.0);
 assert_eq!(components.adoption, 0.0);
 }
}
