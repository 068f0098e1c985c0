//! The Outcome Tracker: captures a goal-type-specific metrics
//! baseline at approval time, and — once a project has been complete for
//! the configured measurement window — re-samples the same metrics and
//! scores the goal's effectiveness.

mod metrics;

pub use metrics::{capture_metrics, saturating_curve, score_components, EffectivenessComponents};

use std::sync::Arc;

use chrono::{Duration, Utc};

use autonomy_error::AutonomyResult;
use autonomy_store::Store;
use autonomy_types::{effectiveness_score, Goal, MetricsProbe};

pub struct OutcomeTracker {
 store: Arc<Store>,
 measurement_window_days: i64,
}

impl OutcomeTracker {
 pub fn new(store: Arc<Store>, measurement_window_days: i64) -> Self {
 Self {
 store,
 measurement_window_days,
 }
 }

 /// Snapshot the goal-type-specific baseline and mark it captured.
 /// Called synchronously as part of approval.
 pub async fn capture_baseline(&self, goal: &Goal, probe: &dyn MetricsProbe) -> AutonomyResult<()> {
 let until = Utc::now();
 let since = until - Duration::days(self.measurement_window_days);
 let baseline_metrics = capture_metrics(probe, goal.goal_type, &goal.metadata, since, until).await?;
 self.store.insert_baseline(&goal.id, until, &baseline_metrics).await?;
 self.store.set_goal_baseline_captured(&goal.id).await?;
 Ok(())
 }

 /// Re-sample metrics for every goal whose measurement window has
 /// elapsed, score effectiveness, and persist. Returns the goal ids
 /// measured this run. Individual failures are logged and skipped so one
 /// bad goal does not block the rest of the run (mirrors the
 /// Scheduler's own "absorb handler errors" policy).
 pub async fn run_due_measurements(&self, probe: &dyn MetricsProbe) -> AutonomyResult<Vec<String>> {
 let cutoff = Utc::now() - Duration::days(self.measurement_window_days);
 let due = self.store.goals_due_for_measurement(cutoff).await?;

 let mut measured = Vec::new();
 for goal_id in due {
 match self.measure_one(&goal_id, probe).await {
 Ok(()) => measured.push(goal_id),
 Err(err) => {
 tracing::warn!(goal_id = %goal_id, error = %err, "outcome measurement failed");
 }
 }
 }
 Ok(measured)
 }

 async fn measure_one(&self, goal_id: &str, probe: &dyn MetricsProbe) -> AutonomyResult<()> {
 let goal = self.store.get_goal(goal_id).await?;
 let outcome = self
.store
.get_outcome(goal_id)
.await?
.ok_or(autonomy_error::AutonomyError::BaselineMissing)?;

 let until = Utc::now();
 let since = until - Duration::days(self.measurement_window_days);
 let outcome_metrics = capture_metrics(probe, goal.goal_type, &goal.metadata, since, until).await?;

 let project = self.store.get_project_by_goal(goal_id).await?;
 let actual_cost_usd: f64 = project
.and_then(|p| p.actual_cost_usd)
.map(|d| d.to_string().parse().unwrap_or(0.0))
.unwrap_or(0.0);

 let slug = goal
.metadata
.get("topic_slug")
.and_then(serde_json::Value::as_str())
.unwrap_or_default();
 let query_hits_since = probe.query_hits_since(slug, outcome.baseline_date).await?;

 let components = score_components(
 goal.goal_type,
 &outcome.baseline_metrics,
 &outcome_metrics,
 actual_cost_usd,
 query_hits_since,
 None,
 );
 let score = effectiveness_score(
 components.impact,
 components.roi,
 components.adoption,
 components.quality,
 );

 self.store
.write_outcome_metrics(
 goal_id,
 until,
 &outcome_metrics,
 score,
 components.impact,
 components.roi,
 components.adoption,
 components.quality,
 )
.await?;
 self.store.set_goal_outcome(goal_id, until, score).await?;
 Ok(())
 }
}
