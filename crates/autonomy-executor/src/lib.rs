//! The Task Executor: per-task-type handlers invoked under a
//! `task:<id>` lock, idempotent in the presence of retries, with a single
//! `RetryPolicy` object centralizing backoff and attempt limits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use rust_decimal::Decimal;

use autonomy_clock::{Clock, SystemClock};
use autonomy_engine::{ProjectEngine, TaskOutcomeApplied};
use autonomy_error::AutonomyResult;
use autonomy_gate::ResourceGate;
use autonomy_lock::{task_lock_name, DistributedLock};
use autonomy_observability::{emit_event, ObservabilityEvent, ProcessKind};
use autonomy_store::Store;
use autonomy_types::{Task, TaskOutcome, TaskOutcomeStatus, TaskStatus, WorkloadClass};

/// Per-task-type handler invoked by the executor. Handlers must be
/// idempotent under retry or use the task id as an external-system
/// idempotency key — the executor itself guarantees
/// only that no two replicas run the same task concurrently, not that a
/// handler never runs twice.
#[async_trait]
pub trait TaskHandler: Send + Sync {
 async fn handle(&self, task: &Task) -> TaskOutcome;
}

/// Centralizes retry limits and exponential backoff so no handler or
/// call site re-derives its own schedule.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
 pub max_retries: u32,
 pub base: StdDuration,
 pub ceiling: StdDuration,
}

impl Default for RetryPolicy {
 fn default() -> Self {
 Self {
 max_retries: 3,
 base: StdDuration::from_secs(30),
 ceiling: StdDuration::from_secs(3600),
 }
 }
}

impl RetryPolicy {
 /// Exponential backoff from `base`, doubling per attempt, capped at
 /// `ceiling`. `attempt_count` is the task's count *before* this attempt.
 pub fn delay_for(&self, attempt_count: u32) -> ChronoDuration {
 let factor = 2u64.saturating_pow(attempt_count.min(32));
 let secs = self.base.as_secs().saturating_mul(factor).min(self.ceiling.as_secs());
 ChronoDuration::seconds(secs as i64)
 }
}

pub struct TaskExecutor<C: Clock = SystemClock> {
 store: Arc<Store>,
 lock: DistributedLock,
 gate: Arc<ResourceGate<C>>,
 engine: ProjectEngine,
 handlers: HashMap<String, Arc<dyn TaskHandler>>,
 retry_policy: RetryPolicy,
 task_lock_ttl: StdDuration,
 external_call_timeout: StdDuration,
}

impl<C: Clock> TaskExecutor<C> {
 pub fn new(
 store: Arc<Store>,
 gate: Arc<ResourceGate<C>>,
 retry_policy: RetryPolicy,
 task_lock_ttl: StdDuration,
 external_call_timeout: StdDuration,
 ) -> Self {
 Self {
 lock: DistributedLock::new(store.clone()),
 engine: ProjectEngine::new(store.clone()),
 store,
 gate,
 handlers: HashMap::new(),
 retry_policy,
 task_lock_ttl,
 external_call_timeout,
 }
 }

 pub fn register_handler(&mut self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
 self.handlers.insert(task_type.into(), handler);
 }

 /// Drive one dispatch pass over a project's ready tasks. Consults the Resource Gate once for the whole
 /// pass — an individual handler re-consults it at its own suspension
 /// points, which this executor does not second-guess.
 pub async fn run_project(
 &self,
 project_id: &str,
 workload_class: WorkloadClass,
 ) -> AutonomyResult<Vec<TaskOutcomeApplied>> {
 let decision = self.gate.allows(workload_class).await?;
 if !decision.allowed {
 tracing::info!(
 project_id = %project_id,
 reason = decision.reason.unwrap_or("unknown"),
 "task dispatch denied by resource gate"
 );
 return Ok(Vec::new());
 }

 self.engine.evaluate_readiness(project_id).await?;
 let candidates = self.store.list_dispatchable_tasks(project_id).await?;

 let mut applied = Vec::new();
 for task in candidates {
 if task.status != TaskStatus::Ready {
 continue;
 }
 if let Some(result) = self.dispatch_one(task).await? {
 applied.push(result);
 }
 }
 Ok(applied)
 }

 /// Locks, re-reads, and dispatches a single task to its handler. Returns
 /// `None` when another replica holds the lock or won the race to
 /// `running` — both routine, not errors.
 async fn dispatch_one(&self, task: Task) -> AutonomyResult<Option<TaskOutcomeApplied>> {
 let lock_name = task_lock_name(&task.id);
 let handle = match self.lock.acquire(&lock_name, self.task_lock_ttl).await? {
 Some(handle) => handle,
 None => return Ok(None),
 };

 let current = self.store.get_task(&task.id).await?;
 if current.status != TaskStatus::Ready {
 let _ = self.lock.release(&handle).await;
 return Ok(None);
 }

 self.store.mark_task_status(&current.id, TaskStatus::Running).await?;

 let outcome = match self.handlers.get(&current.task_type).cloned() {
 Some(handler) => self.run_with_lock_renewal(handler, &current, handle.clone()).await,
 None => TaskOutcome {
 status: TaskOutcomeStatus::FailedFatal,
 result: Default::default(),
 cost_usd: Decimal::ZERO,
 error: Some(format!("no handler registered for task_type '{}'", current.task_type)),
 },
 };

 if outcome.status == TaskOutcomeStatus::FailedRetryable {
 emit_event(
 tracing::Level::WARN,
 ProcessKind::Server,
 ObservabilityEvent {
 status: Some("failed_retryable"),
 task_id: Some(&current.id),
 detail: outcome.error.as_deref(),
..ObservabilityEvent::new("task_retried", "task_executor")
 },
 );
 }

 let applied = self
.engine
.apply_task_outcome(
 &current,
 outcome,
 self.retry_policy.max_retries,
 self.retry_policy.delay_for(current.attempt_count),
 )
.await?;

 if let Err(err) = self.lock.release(&handle).await {
 tracing::warn!(task_id = %current.id, error = %err, "releasing task lock after completion failed");
 }

 Ok(Some(applied))
 }

 /// Runs a handler under a bounded timeout, renewing the task lock on a
 /// half-TTL cadence while it is in flight. A handler that never returns
 /// within the timeout is reported as `failed_retryable` rather than left
 /// to hang indefinitely.
 async fn run_with_lock_renewal(
 &self,
 handler: Arc<dyn TaskHandler>,
 task: &Task,
 mut handle: autonomy_types::LockHandle,
 ) -> TaskOutcome {
 let renewal_period = self.task_lock_ttl / 2;
 let call = tokio::time::timeout(self.external_call_timeout, handler.handle(task));
 tokio::pin!(call);

 let mut ticker = tokio::time::interval(renewal_period.max(StdDuration::from_millis(1)));
 ticker.tick().await;

 loop {
 tokio::select! {
 result = &mut call => {
 return match result {
 Ok(outcome) => outcome,
 Err(_elapsed) => TaskOutcome {
 status: TaskOutcomeStatus::FailedRetryable,
 result: Default::default(),
 cost_usd: Decimal::ZERO,
 error: Some("external_timeout".to_string()),
 },
 };
 }
 _ = ticker.tick() => {
 match self.lock.renew(&handle, self.task_lock_ttl).await {
 Ok(renewed) => handle = renewed,
 Err(err) => {
 tracing::warn!(task_id = %task.id, error = %err, "task lock renewal failed mid-handler");
 }
 }
 }
 }
 }
 }
}

#[cfg(test)]
mod tests {
 use super::*;

 use autonomy_config::{AutonomyConfig, SchedulerMode};
 use autonomy_engine::ProjectEngine;
 use autonomy_types::{Goal, GoalStatus, GoalType};
 use std::str::FromStr;
 use std::sync::atomic::{AtomicU32, Ordering};

 struct AlwaysCompletes;

 #[async_trait]
 impl TaskHandler for AlwaysCompletes {
 async fn handle(&self, _task: &Task) -> TaskOutcome {
 TaskOutcome {
 status: TaskOutcomeStatus::Completed,
 result: Default::default(),
 cost_usd: Decimal::ZERO,
 error: None,
 }
 }
 }

 struct AlwaysRetryable {
 calls: AtomicU32,
 }

 #[async_trait]
 impl TaskHandler for AlwaysRetryable {
 async fn handle(&self, _task: &Task) -> TaskOutcome {
 self.calls.fetch_add(1, Ordering::SeqCst);
 TaskOutcome {
 status: TaskOutcomeStatus::FailedRetryable,
 result: Default::default(),
 cost_usd: Decimal::ZERO,
 error: Some("collaborator unavailable".to_string()),
 }
 }
 }

 fn config() -> AutonomyConfig {
 AutonomyConfig {
 autonomy_enabled: true,
 daily_budget_usd: Decimal::from_str("25.00").unwrap(),
 per_query_budget_usd: Decimal::from_str("5.00").unwrap(),
 idle_threshold_minutes: 120,
 cpu_idle_pct: 20,
 mem_idle_pct: 70,
 outcome_window_days: 30,
 feedback_min_samples: 10,
 feedback_adjustment_max: 1.5,
 scheduler_timezone: "UTC".to_string(),
 scheduler_mode: SchedulerMode::Prod,
 lock_kv_url: "sqlite://:memory:".to_string(),
 store_url: "sqlite://:memory:".to_string(),
 }
 }

 fn sample_goal() -> Goal {
 Goal {
 id: "goal-1".to_string(),
 title: "t".to_string(),
 description: "d".to_string(),
 goal_type: GoalType::Exploration,
 status: GoalStatus::Identified,
 base_impact_score: 40.0,
 adjustment_factor: 1.0,
 adjusted_impact_score: 40.0,
 estimated_cost_usd: Decimal::new(500, 2),
 budget_limit_usd: Decimal::new(2000, 2),
 approved_by: None,
 approved_at: None,
 approval_notes: None,
 learn_from: true,
 baseline_captured: false,
 baseline_captured_at: None,
 outcome_measured_at: None,
 effectiveness_score: None,
 metadata: Default::default(),
 created_at: chrono::Utc::now(),
 }
 }

 async fn setup() -> (Arc<Store>, String) {
 let store = Arc::new(Store::open_in_memory().await.unwrap());
 store.insert_goal(&sample_goal()).await.unwrap();
 let engine = ProjectEngine::new(store.clone());
 let project = engine.approve_goal("goal-1", "ops", None).await.unwrap();
 (store, project.id)
 }

 fn executor_with(store: Arc<Store>, retry_policy: RetryPolicy) -> TaskExecutor<SystemClock> {
 let idle = Arc::new(autonomy_clock::IdleSensor::<SystemClock>::new(
 autonomy_clock::IdleSensorConfig::default(),
 ));
 let gate = Arc::new(ResourceGate::new(store.clone(), idle, config()));
 TaskExecutor::new(
 store,
 gate,
 retry_policy,
 StdDuration::from_secs(60),
 StdDuration::from_secs(5),
 )
 }

 #[tokio::test]
 async fn completing_handler_marks_task_completed() {
 let (store, project_id) = setup().await;
 let mut executor = executor_with(store.clone(), RetryPolicy::default());
 executor.register_handler("explore_candidate", Arc::new(AlwaysCompletes));

 let applied = executor.run_project(&project_id, WorkloadClass::Exploration).await.unwrap();
 assert_eq!(applied.len(), 1);
 assert_eq!(applied[0].new_task_status, TaskStatus::Completed);

 let tasks = store.list_tasks_for_project(&project_id).await.unwrap();
 let explore = tasks.iter().find(|t| t.task_type == "explore_candidate").unwrap();
 assert_eq!(explore.status, TaskStatus::Completed);
 }

 #[tokio::test]
 async fn missing_handler_fails_the_task_fatally() {
 let (store, project_id) = setup().await;
 let executor = executor_with(store.clone(), RetryPolicy::default());

 let applied = executor.run_project(&project_id, WorkloadClass::Exploration).await.unwrap();
 assert_eq!(applied.len(), 1);
 assert_eq!(applied[0].new_task_status, TaskStatus::Failed);
 }

 #[tokio::test]
 async fn retryable_failure_schedules_backoff_and_is_skipped_until_due() {
 let (store, project_id) = setup().await;
 let mut executor = executor_with(
 store.clone(),
 RetryPolicy {
 max_retries: 5,
 base: StdDuration::from_secs(3600),
 ceiling: StdDuration::from_secs(3600),
 },
 );
 let handler = Arc::new(AlwaysRetryable { calls: AtomicU32::new(0) });
 executor.register_handler("explore_candidate", handler.clone());

 let applied = executor.run_project(&project_id, WorkloadClass::Exploration).await.unwrap();
 assert_eq!(applied.len(), 1);
 assert_eq!(applied[0].new_task_status, TaskStatus::Ready);
 assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

 // Backoff not yet elapsed: a second pass does not re-invoke the handler.
 let applied_again = executor.run_project(&project_id, WorkloadClass::Exploration).await.unwrap();
 assert!(applied_again.is_empty());
 assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
 }

 #[tokio::test]
 async fn gate_denial_skips_dispatch_entirely() {
 let (store, project_id) = setup().await;
 let mut cfg = config();
 cfg.autonomy_enabled = false;
 let idle = Arc::new(autonomy_clock::IdleSensor::<SystemClock>::new(
 autonomy_clock::IdleSensorConfig::default(),
 ));
 let gate = Arc::new(ResourceGate::new(store.clone(), idle, cfg));
 let mut executor = TaskExecutor::new(
 store.clone(),
 gate,
 RetryPolicy::default(),
 StdDuration::from_secs(60),
 StdDuration::from_secs(5),
 );
 executor.register_handler("explore_candidate", Arc::new(AlwaysCompletes));

 let applied = executor.run_project(&project_id, WorkloadClass::Exploration).await.unwrap();
 assert!(applied.is_empty());

 let tasks = store.list_tasks_for_project(&project_id).await.unwrap();
 let explore = tasks.iter().find(|t| t.task_type == "explore_candidate").unwrap();
 assert_eq!(explore.status, TaskStatus::Ready);
 }
}
