//! [`JobHandler`] implementations registered with the Scheduler at
//! startup: the Goal Generator's weekly cycle, a dispatch pass over every
//! active project's ready tasks, and the Outcome Tracker's daily
//! measurement sweep.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use autonomy_error::AutonomyError;
use autonomy_executor::TaskExecutor;
use autonomy_goals::GoalGenerator;
use autonomy_lock::{DistributedLock, GOAL_GEN_WEEKLY_LOCK};
use autonomy_outcomes::OutcomeTracker;
use autonomy_scheduler::JobHandler;
use autonomy_store::Store;
use autonomy_types::{MetricsProbe, ProjectStatus, WorkloadClass};

/// Runs the three detection strategies and persists survivors as
/// `identified` goals. Wrapped in the dedicated `goal_gen:weekly` lock
/// in addition to the Scheduler's own `job:<handler_name>` lock, since a
/// cycle that runs long enough to miss its own slot must not overlap with
/// the next one.
pub struct GoalGenerationJob {
 pub generator: GoalGenerator,
 pub probe: Arc<dyn MetricsProbe>,
 pub lock: DistributedLock,
 pub lookback_days: i64,
 pub default_budget_limit_usd: Decimal,
}

#[async_trait]
impl JobHandler for GoalGenerationJob {
 async fn run(&self) -> anyhow::Result<()> {
 let Some(handle) = self
.lock
.acquire(GOAL_GEN_WEEKLY_LOCK, StdDuration::from_secs(900))
.await?
 else {
 tracing::info!("goal_gen:weekly lock held elsewhere, skipping this cycle");
 return Ok(());
 };

 let generated = self
.generator
.generate(self.probe.as_ref(), self.lookback_days, self.default_budget_limit_usd)
.await?;
 tracing::info!(count = generated.len(), "goal generation cycle produced candidates");

 self.lock.release(&handle).await?;
 Ok(())
 }
}

/// Evaluates readiness and dispatches ready tasks for every project still
/// in flight.
pub struct TaskDispatchJob<C: autonomy_clock::Clock = autonomy_clock::SystemClock> {
 pub store: Arc<Store>,
 pub executor: Arc<TaskExecutor<C>>,
}

#[async_trait]
impl<C: autonomy_clock::Clock + Send + Sync + 'static> JobHandler for TaskDispatchJob<C> {
 async fn run(&self) -> anyhow::Result<()> {
 let mut projects = self.store.list_projects_by_status(ProjectStatus::Active).await?;
 projects.extend(self.store.list_projects_by_status(ProjectStatus::Proposed).await?);

 for project in projects {
 match self.executor.run_project(&project.id, WorkloadClass::Scheduled).await {
 Ok(applied) if !applied.is_empty() => {
 tracing::debug!(project_id = %project.id, dispatched = applied.len(), "tasks dispatched");
 }
 Ok(_) => {}
 Err(AutonomyError::Internal(err)) => return Err(err),
 Err(err) => {
 tracing::warn!(project_id = %project.id, error = %err, "task dispatch pass failed");
 }
 }
 }
 Ok(())
 }
}

/// Re-samples metrics for every goal whose measurement window has elapsed
/// and scores effectiveness.
pub struct OutcomeMeasurementJob {
 pub tracker: OutcomeTracker,
 pub probe: Arc<dyn MetricsProbe>,
}

#[async_trait]
impl JobHandler for OutcomeMeasurementJob {
 async fn run(&self) -> anyhow::Result<()> {
 let measured = self.tracker.run_due_measurements(self.probe.as_ref()).await?;
 if !measured.is_empty() {
 tracing::info!(count = measured.len(), "outcome measurements recorded");
 }
 Ok(())
 }
}
