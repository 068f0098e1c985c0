//! The Feedback Loop: turns a goal type's historical effectiveness into a
//! multiplicative bias applied to newly generated goals of that type. The
//! bias is capped at 1.5x and withheld below a minimum sample size, so a
//! single lucky or unlucky outcome cannot runaway-reinforce itself.

use std::sync::Arc;

use autonomy_error::AutonomyResult;
use autonomy_store::Store;
use autonomy_types::GoalType;

pub const NEUTRAL_FACTOR: f64 = 1.0;
pub const MIN_FACTOR: f64 = 0.5;
pub const MAX_FACTOR: f64 = 1.5;

/// Mean effectiveness at which the adjustment factor saturates low/high.
const LOW_ANCHOR_MEAN: f64 = 50.0;
const HIGH_ANCHOR_MEAN: f64 = 75.0;

pub struct FeedbackLoop {
 store: Arc<Store>,
 min_samples: u32,
}

impl FeedbackLoop {
 pub fn new(store: Arc<Store>, min_samples: u32) -> Self {
 Self { store, min_samples }
 }

 /// `adjust(goal_type) -> factor`: loads every learn-eligible, measured
 /// `GoalOutcome` for `goal_type`; below `min_samples`, returns the
 /// neutral factor to avoid overfitting on thin data; otherwise maps the
 /// mean effectiveness score onto `[0.5, 1.5]` with linear interpolation
 /// between the `50`/`75` anchors.
 pub async fn adjust(&self, goal_type: GoalType) -> AutonomyResult<f64> {
 let scores = self.store.effectiveness_scores_for_goal_type(goal_type).await?;
 if (scores.len() as u32) < self.min_samples {
 return Ok(NEUTRAL_FACTOR);
 }

 let mean = scores.iter().sum::<f64>() / scores.len() as f64;
 Ok(factor_from_mean(mean))
 }
}

/// Pure scoring function split out from `adjust` so the piecewise mapping
/// (and its boundary cases) can be tested without a store.
pub fn factor_from_mean(mean: f64) -> f64 {
 if mean >= HIGH_ANCHOR_MEAN {
 return MAX_FACTOR;
 }
 if mean <= LOW_ANCHOR_MEAN {
 return MIN_FACTOR;
 }
 let t = (mean - LOW_ANCHOR_MEAN) / (HIGH_ANCHOR_MEAN - LOW_ANCHOR_MEAN);
 (MIN_FACTOR + t * (MAX_FACTOR - MIN_FACTOR)).clamp(MIN_FACTOR, MAX_FACTOR)
}

#[cfg(test)]
mod tests {
 use super::*;
 use autonomy_types::{Goal, GoalStatus};
 use chrono::Utc;
 use rust_decimal::Decimal;
 use serde_json::Map;

 #[test]
 fn boundary_means_map_to_exact_factors() {
 assert_eq!(factor_from_mean(75.0), 1.5);
 assert_eq!(factor_from_mean(50.0), 0.5);
 assert_eq!(factor_from_mean(62.5), 1.0);
 assert_eq!(factor_from_mean(80.0), 1.5);
 assert_eq!(factor_from_mean(40.0), 0.5);
 }

 #[test]
 fn interpolates_linearly_between_anchors() {
 // mean 70% of the way from 50 to 75 should land 70% of the way
 // from 0.5 to 1.5.
 let mean = 50.0 + 0.7 * (75.0 - 50.0);
 assert!((factor_from_mean(mean) - 1.2).abs() < 1e-9);
 }

 async fn seeded_store(goal_type: GoalType, scores: &[f64], learn_from: bool) -> Store {
 let store = Store::open_in_memory().await.unwrap();
 for (i, score) in scores.iter().enumerate() {
 let goal_id = format!("g{i}");
 let goal = Goal {
 id: goal_id.clone(),
 title: "t".into(),
 description: "d".into(),
 goal_type,
 status: GoalStatus::Completed,
 base_impact_score: 60.0,
 adjustment_factor: 1.0,
 adjusted_impact_score: 60.0,
 estimated_cost_usd: Decimal::ZERO,
 budget_limit_usd: Decimal::ZERO,
 approved_by: None,
 approved_at: None,
 approval_notes: None,
 learn_from,
 baseline_captured: true,
 baseline_captured_at: Some(Utc::now()),
 outcome_measured_at: Some(Utc::now()),
 effectiveness_score: Some(*score),
 metadata: Map::new(),
 created_at: Utc::now(),
 };
 store.insert_goal(&goal).await.unwrap();
 store
.insert_baseline(&goal_id, Utc::now(), &Map::new())
.await
.unwrap();
 store
.write_outcome_metrics(&goal_id, Utc::now(), &Map::new(), *score, 0.5, 0.5, 0.5, 0.5)
.await
.unwrap();
 }
 store
 }

 #[tokio::test]
 async fn below_min_samples_returns_neutral() {
 let scores = vec![90.0; 9];
 let store = Arc::new(seeded_store(GoalType::Research, &scores, true).await);
 let feedback = FeedbackLoop::new(store, 10);
 let factor = feedback.adjust(GoalType::Research).await.unwrap();
 assert_eq!(factor, NEUTRAL_FACTOR);
 }

 #[tokio::test]
 async fn at_min_samples_with_high_mean_returns_max_factor() {
 let scores = vec![75.0; 10];
 let store = Arc::new(seeded_store(GoalType::Research, &scores, true).await);
 let feedback = FeedbackLoop::new(store, 10);
 let factor = feedback.adjust(GoalType::Research).await.unwrap();
 assert_eq!(factor, MAX_FACTOR);
 }

 #[tokio::test]
 async fn non_learn_from_outcomes_are_excluded() {
 let scores = vec![90.0; 12];
 let store = Arc::new(seeded_store(GoalType::Research, &scores, false).await);
 let feedback = FeedbackLoop::new(store, 10);
 let factor = feedback.adjust(GoalType::Research).await.unwrap();
 assert_eq!(factor, NEUTRAL_FACTOR);
 }
}
