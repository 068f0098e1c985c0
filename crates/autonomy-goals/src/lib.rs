//! The Goal Generator: runs the opportunity-detection
//! strategies, adjusts each candidate's impact by the Feedback Loop's
//! historical bias for its goal type, discards anything below the impact
//! floor, and persists the survivors as `identified` goals up to a weekly
//! cap.

mod scoring;
mod strategies;

pub use scoring::{base_impact, GoalCandidate, ImpactComponents};
pub use strategies::{
 knowledge_gaps, print_failure_clusters, spend_mix_anomalies, MIN_CLUSTER_SIZE,
 SPEND_MIX_FLOOR_USD, SPEND_MIX_FRACTION_THRESHOLD,
};

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use autonomy_error::AutonomyResult;
use autonomy_feedback::FeedbackLoop;
use autonomy_store::Store;
use autonomy_types::{clamp_impact_score, Goal, GoalStatus, MetricsProbe};

/// A candidate's `adjusted_impact_score` must reach this floor to survive;
/// below it, the opportunity isn't worth the operator's approval attention.
pub const IMPACT_DISCARD_THRESHOLD: f64 = 50.0;

/// Upper bound on how many goals a single generation run will persist,
/// regardless of how many candidates clear the discard threshold.
pub const DEFAULT_WEEKLY_CAP: usize = 10;

/// Topic slugs the knowledge-gap strategy checks for existing coverage.
/// In a full deployment this would come from operator configuration; kept
/// as a fixed seed list here since no configuration surface for it exists
/// yet in the workspace's config crate.
pub const DEFAULT_TRACKED_TOPIC_SLUGS: &[&str] = &[
 "pla-warping-mitigation",
 "nozzle-clog-root-causes",
 "bed-adhesion-techniques",
];

pub struct GoalGenerator {
 store: Arc<Store>,
 feedback: FeedbackLoop,
 weekly_cap: usize,
}

impl GoalGenerator {
 pub fn new(store: Arc<Store>, feedback_min_samples: u32) -> Self {
 let feedback = FeedbackLoop::new(store.clone(), feedback_min_samples);
 Self {
 store,
 feedback,
 weekly_cap: DEFAULT_WEEKLY_CAP,
 }
 }

 pub fn with_weekly_cap(mut self, weekly_cap: usize) -> Self {
 self.weekly_cap = weekly_cap;
 self
 }

 /// Run every detection strategy against `probe`, adjust for historical
 /// feedback, discard low-impact candidates, and persist the top
 /// `weekly_cap` survivors as `identified` goals. Returns the persisted
 /// goals in the order they were inserted (highest-priority first).
 pub async fn generate(
 &self,
 probe: &dyn MetricsProbe,
 lookback_days: i64,
 default_budget_limit_usd: Decimal,
 ) -> AutonomyResult<Vec<Goal>> {
 let until = Utc::now();
 let since = until - chrono::Duration::days(lookback_days);

 let mut candidates = Vec::new();
 candidates.extend(print_failure_clusters(probe, since, until, default_budget_limit_usd).await?);
 candidates.extend(
 knowledge_gaps(
 probe,
 &DEFAULT_TRACKED_TOPIC_SLUGS
.iter()
.map(|s| s.to_string())
.collect::<Vec<_>>(),
 default_budget_limit_usd,
 Decimal::ZERO,
 since,
 )
.await?,
 );
 candidates.extend(spend_mix_anomalies(probe, since, until, default_budget_limit_usd).await?);

 let mut scored: Vec<(GoalCandidate, f64, f64)> = Vec::new();
 for candidate in candidates {
 let adjustment_factor = self.feedback.adjust(candidate.goal_type).await?;
 let adjusted = Goal::adjusted_score(candidate.base_impact_score, adjustment_factor);
 scored.push((candidate, adjustment_factor, adjusted));
 }

 scored.retain(|(_, _, adjusted)| *adjusted >= IMPACT_DISCARD_THRESHOLD);

 // Tie-break: adjusted_impact desc, then strategic_value desc, then
 // oldest evidence first.
 scored.sort_by(|a, b| {
 b.2.partial_cmp(&a.2)
.unwrap_or(std::cmp::Ordering::Equal)
.then_with(|| {
 b.0.strategic_value
.partial_cmp(&a.0.strategic_value)
.unwrap_or(std::cmp::Ordering::Equal)
 })
.then_with(|| a.0.evidence_since.cmp(&b.0.evidence_since))
 });
 scored.truncate(self.weekly_cap);

 let mut persisted = Vec::new();
 for (candidate, adjustment_factor, adjusted_impact_score) in scored {
 let goal = Goal {
 id: uuid::Uuid::new_v4().to_string(),
 title: candidate.title,
 description: candidate.description,
 goal_type: candidate.goal_type,
 status: GoalStatus::Identified,
 base_impact_score: clamp_impact_score(candidate.base_impact_score),
 adjustment_factor,
 adjusted_impact_score,
 estimated_cost_usd: candidate.estimated_cost_usd,
 budget_limit_usd: candidate.budget_limit_usd,
 approved_by: None,
 approved_at: None,
 approval_notes: None,
 learn_from: true,
 baseline_captured: false,
 baseline_captured_at: None,
 outcome_measured_at: None,
 effectiveness_score: None,
 metadata: candidate.metadata,
 created_at: Utc::now(),
 };
 self.store.insert_goal(&goal).await?;
 persisted.push(goal);
 }

 Ok(persisted)
 }
}

#[cfg(test)]
mod tests {
 use super::*;
 use std::collections::HashMap;

 use async_trait::async_trait;
 use autonomy_types::PrintFailureRecord;

 struct StubProbe {
 failures: Vec<PrintFailureRecord>,
 total_prints: u64,
 kb_slugs: Vec<String>,
 tier_spend_fraction: f64,
 total_spend: Decimal,
 }

 #[async_trait]
 impl MetricsProbe for StubProbe {
 async fn materials_count_for_slug(&self, _slug: &str) -> AutonomyResult<u64> {
 Ok(0)
 }
 async fn failures_by_reason(
 &self,
 _since: chrono::DateTime<Utc>,
 _until: chrono::DateTime<Utc>,
 ) -> AutonomyResult<HashMap<String, u64>> {
 Ok(HashMap::new())
 }
 async fn tier_spend_fraction(
 &self,
 _since: chrono::DateTime<Utc>,
 _until: chrono::DateTime<Utc>,
 ) -> AutonomyResult<f64> {
 Ok(self.tier_spend_fraction)
 }
 async fn total_spend(
 &self,
 _since: chrono::DateTime<Utc>,
 _until: chrono::DateTime<Utc>,
 ) -> AutonomyResult<Decimal> {
 Ok(self.total_spend)
 }
 async fn recent_print_failures(
 &self,
 _since: chrono::DateTime<Utc>,
 _until: chrono::DateTime<Utc>,
 ) -> AutonomyResult<Vec<PrintFailureRecord>> {
 Ok(self.failures.clone())
 }
 async fn total_prints(
 &self,
 _since: chrono::DateTime<Utc>,
 _until: chrono::DateTime<Utc>,
 ) -> AutonomyResult<u64> {
 Ok(self.total_prints)
 }
 async fn existing_kb_slugs(&self) -> AutonomyResult<Vec<String>> {
 Ok(self.kb_slugs.clone())
 }
 async fn recent_query_miss_rate_for_slug(&self, _slug: &str) -> AutonomyResult<f64> {
 Ok(0.0)
 }
 async fn query_hits_since(&self, _slug: &str, _since: chrono::DateTime<Utc>) -> AutonomyResult<u64> {
 Ok(0)
 }
 }

 fn stub_probe() -> StubProbe {
 StubProbe {
 failures: vec![
 PrintFailureRecord {
 reason: "nozzle_clog".into(),
 cost_usd: Decimal::new(6000, 2),
 };
 5
 ],
 total_prints: 20,
 kb_slugs: vec!["bed-adhesion-techniques".into()],
 tier_spend_fraction: 0.5,
 total_spend: Decimal::new(100000, 2),
 }
 }

 #[tokio::test]
 async fn generates_and_persists_candidates_above_threshold() {
 let store = Arc::new(Store::open_in_memory().await.unwrap());
 let generator = GoalGenerator::new(store.clone(), 5);
 let probe = stub_probe();

 let goals = generator
.generate(&probe, 7, Decimal::new(5000, 2))
.await
.unwrap();

 assert!(!goals.is_empty());
 for goal in &goals {
 assert!(goal.adjusted_impact_score >= IMPACT_DISCARD_THRESHOLD);
 assert_eq!(goal.status, GoalStatus::Identified);
 }

 let persisted = store.list_goals().await.unwrap();
 assert_eq!(persisted.len(), goals.len());
 }

 #[tokio::test]
 async fn weekly_cap_limits_persisted_goals() {
 let store = Arc::new(Store::open_in_memory().await.unwrap());
 let generator = GoalGenerator::new(store.clone(), 5).with_weekly_cap(1);
 let probe = stub_probe();

 let goals = generator
.generate(&probe, 7, Decimal::new(5000, 2))
.await
.unwrap();

 assert!(goals.len() <= 1);
 }

 #[tokio::test]
 async fn no_signal_yields_no_candidates() {
 let store = Arc::new(Store::open_in_memory().await.unwrap());
 let generator = GoalGenerator::new(store.clone(), 5);
 let probe = StubProbe {
 failures: Vec::new(),
 total_prints: 20,
 kb_slugs: DEFAULT_TRACKED_TOPIC_SLUGS
.iter()
.map(|s| s.to_string())
.collect(),
 tier_spend_fraction: 0.1,
 total_spend: Decimal::new(100000, 2),
 };

 let goals = generator
.generate(&probe, 7, Decimal::new(5000, 2))
.await
.unwrap();
 assert!(goals.is_empty());
 }
}
