//! Opportunity-detection strategies: each inspects recent
//! history through a `MetricsProbe` and proposes zero or more
//! [`GoalCandidate`]s with their raw impact components already computed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Map};

use autonomy_error::AutonomyResult;
use autonomy_types::{GoalType, MetricsProbe};

use crate::scoring::{base_impact, GoalCandidate, ImpactComponents};

/// Below this many same-reason failures in the lookback window, a failure
/// mode is noise rather than an opportunity.
pub const MIN_CLUSTER_SIZE: u64 = 3;

/// Reference cost used to normalize a cluster's mean cost into the
/// `severity` component: a cluster whose average failure cost is at or
/// above this is treated as maximally severe.
const SEVERITY_REFERENCE_COST_USD: f64 = 50.0;

/// A cluster of same-reason print failures is worth a goal once it recurs
/// at least [`MIN_CLUSTER_SIZE`] times in the lookback window. `frequency`
/// is the cluster's share of all prints; `severity` is its mean cost
/// normalized against [`SEVERITY_REFERENCE_COST_USD`]; `cost_savings`
/// assumes eliminating the failure mode recovers its total wasted spend.
pub async fn print_failure_clusters(
 probe: &dyn MetricsProbe,
 since: DateTime<Utc>,
 until: DateTime<Utc>,
 budget_limit_usd: Decimal,
) -> AutonomyResult<Vec<GoalCandidate>> {
 let failures = probe.recent_print_failures(since, until).await?;
 let total_prints = probe.total_prints(since, until).await?.max(1);

 let mut by_reason: std::collections::HashMap<String, Vec<Decimal>> = std::collections::HashMap::new();
 for f in &failures {
 by_reason.entry(f.reason.clone()).or_default().push(f.cost_usd);
 }

 let mut candidates = Vec::new();
 for (reason, costs) in by_reason {
 let cluster_size = costs.len() as u64;
 if cluster_size < MIN_CLUSTER_SIZE {
 continue;
 }
 let total_cost: Decimal = costs.iter().copied().sum();
 let mean_cost = total_cost / Decimal::from(cluster_size);
 let mean_cost_f64: f64 = mean_cost.to_string().parse().unwrap_or(0.0);

 let frequency = cluster_size as f64 / total_prints as f64;
 let severity = (mean_cost_f64 / SEVERITY_REFERENCE_COST_USD).clamp(0.0, 1.0);
 let cost_savings = severity;

 let components = ImpactComponents {
 frequency,
 severity,
 cost_savings,
 knowledge_gap: 0.0,
 strategic_value: 0.3,
 };

 let mut metadata = Map::new();
 metadata.insert("strategy".into(), json!("print_failure_clustering"));
 metadata.insert("failure_reason".into(), json!(reason));
 metadata.insert("cluster_size".into(), json!(cluster_size));
 metadata.insert("total_prints".into(), json!(total_prints));

 candidates.push(GoalCandidate {
 title: format!("Reduce print failures: {reason}"),
 description: format!(
 "{cluster_size} prints failed for reason \"{reason}\" in the lookback window, \
 averaging {mean_cost} in wasted material and machine time per occurrence."
 ),
 goal_type: GoalType::Improvement,
 base_impact_score: base_impact(components),
 strategic_value: components.strategic_value,
 evidence_since: since,
 estimated_cost_usd: total_cost,
 budget_limit_usd,
 metadata,
 });
 }
 Ok(candidates)
}

/// A topic is a knowledge gap once the knowledge base has no article for
/// its slug. `knowledge_gap` is binary (1.0 when absent) since the probe
/// reports existence, not partial coverage.
pub async fn knowledge_gaps(
 probe: &dyn MetricsProbe,
 tracked_topic_slugs: &[String],
 budget_limit_usd: Decimal,
 estimated_cost_usd: Decimal,
 evidence_since: DateTime<Utc>,
) -> AutonomyResult<Vec<GoalCandidate>> {
 let existing = probe.existing_kb_slugs().await?;
 let existing: std::collections::HashSet<&str> = existing.iter().map(String::as_str()).collect();

 let mut candidates = Vec::new();
 for slug in tracked_topic_slugs {
 if existing.contains(slug.as_str()) {
 continue;
 }
 let components = ImpactComponents {
 frequency: 0.0,
 severity: 0.0,
 cost_savings: 0.0,
 knowledge_gap: 1.0,
 strategic_value: 0.8,
 };
 let mut metadata = Map::new();
 metadata.insert("strategy".into(), json!("knowledge_gap"));
 metadata.insert("topic_slug".into(), json!(slug));

 candidates.push(GoalCandidate {
 title: format!("Research: {slug}"),
 description: format!("No knowledge-base article exists yet for \"{slug}\"."),
 goal_type: GoalType::Research,
 base_impact_score: base_impact(components),
 strategic_value: components.strategic_value,
 evidence_since,
 estimated_cost_usd,
 budget_limit_usd,
 metadata,
 });
 }
 Ok(candidates)
}

/// A spend tier is anomalous once it accounts for more than 30% of total
/// spend in the window and total spend clears a $5 floor (below that, the
/// fraction is too noisy to act on).
pub const SPEND_MIX_FRACTION_THRESHOLD: f64 = 0.30;
pub const SPEND_MIX_FLOOR_USD: f64 = 5.0;

pub async fn spend_mix_anomalies(
 probe: &dyn MetricsProbe,
 since: DateTime<Utc>,
 until: DateTime<Utc>,
 budget_limit_usd: Decimal,
) -> AutonomyResult<Vec<GoalCandidate>> {
 let total_spend = probe.total_spend(since, until).await?;
 let total_spend_f64: f64 = total_spend.to_string().parse().unwrap_or(0.0);
 if total_spend_f64 < SPEND_MIX_FLOOR_USD {
 return Ok(Vec::new());
 }

 let fraction = probe.tier_spend_fraction(since, until).await?;
 if fraction <= SPEND_MIX_FRACTION_THRESHOLD {
 return Ok(Vec::new());
 }

 let components = ImpactComponents {
 frequency: 0.0,
 severity: 0.0,
 cost_savings: fraction,
 knowledge_gap: 0.0,
 strategic_value: 0.4,
 };
 let mut metadata = Map::new();
 metadata.insert("strategy".into(), json!("spend_mix_anomaly"));
 metadata.insert("tier_spend_fraction".into(), json!(fraction));
 metadata.insert("total_spend_usd".into(), json!(total_spend_f64));

 Ok(vec![GoalCandidate {
 title: "Investigate concentrated spend tier".to_string(),
 description: format!(
 "A single cost tier accounts for {:.0}% of ${total_spend_f64:.2} spent in the lookback window.",
 fraction * 100.0
 ),
 goal_type: GoalType::Optimization,
 base_impact_score: base_impact(components),
 strategic_value: components.strategic_value,
 evidence_since: since,
 estimated_cost_usd: Decimal::ZERO,
 budget_limit_usd,
 metadata,
 }])
}
