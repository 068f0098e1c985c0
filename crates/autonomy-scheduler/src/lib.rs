//! The Scheduler: a registry of recurring jobs whose
//! definitions live in the store, reconciled against code-declared
//! handlers at startup. A single-threaded cooperative tick drives `fire`;
//! mutual exclusion across replicas comes entirely from `job:<handler>`
//! locks, not from anything the scheduler itself coordinates.

mod trigger;

pub use trigger::{next_fire, next_interval_fire};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use autonomy_clock::{Clock, SystemClock};
use autonomy_error::AutonomyResult;
use autonomy_gate::ResourceGate;
use autonomy_lock::{job_lock_name, DistributedLock};
use autonomy_observability::{emit_event, ObservabilityEvent, ProcessKind};
use autonomy_store::Store;
use autonomy_types::{JobRunStatus, ScheduledJob, Trigger, WorkloadClass};

/// A job's code-side behavior, invoked once its trigger fires and the
/// Resource Gate admits its workload class. Handlers own their own retry
/// policy — the scheduler only
/// records whatever `Ok`/`Err` they return.
#[async_trait]
pub trait JobHandler: Send + Sync {
 async fn run(&self) -> anyhow::Result<()>;
}

/// A code-declared job the scheduler should reconcile into the store at
/// startup.
pub struct JobRegistration {
 pub handler_name: String,
 pub trigger: Trigger,
 pub timezone: String,
 pub workload_class: WorkloadClass,
 pub handler: Arc<dyn JobHandler>,
}

impl JobRegistration {
 pub fn new(
 handler_name: impl Into<String>,
 trigger: Trigger,
 timezone: impl Into<String>,
 workload_class: WorkloadClass,
 handler: Arc<dyn JobHandler>,
 ) -> Self {
 Self {
 handler_name: handler_name.into(),
 trigger,
 timezone: timezone.into(),
 workload_class,
 handler,
 }
 }
}

/// Outcome of one `fire_one` attempt, returned to callers (mainly tests)
/// that want to assert on dispatch behavior without re-reading the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
 Ran(JobRunStatus),
 Skipped(String),
}

pub struct Scheduler<C: Clock = SystemClock> {
 store: Arc<Store>,
 lock: DistributedLock,
 gate: Arc<ResourceGate<C>>,
 clock: C,
 handlers: HashMap<String, Arc<dyn JobHandler>>,
 /// TTL granted to a job's `job:<handler>` lock: expected runtime plus a
 /// safety margin. A single workspace-wide value is adequate since
 /// handlers themselves enforce their own suspension-point renewals for
 /// anything longer.
 job_lock_ttl: StdDuration,
}

impl<C: Clock + Clone> Scheduler<C> {
 pub fn new(store: Arc<Store>, gate: Arc<ResourceGate<C>>, clock: C, job_lock_ttl: StdDuration) -> Self {
 Self {
 lock: DistributedLock::new(store.clone()),
 store,
 gate,
 clock,
 handlers: HashMap::new(),
 job_lock_ttl,
 }
 }

 /// Reconcile `registrations` against the store: upsert every
 /// code-declared job (seeding `next_run_at` only the first time a
 /// handler is ever seen), disable any stored job whose handler no
 /// longer exists in code, and load the handler map used by `fire_one`.
 pub async fn reconcile(&mut self, registrations: Vec<JobRegistration>) -> AutonomyResult<()> {
 let now = self.clock.now();
 let existing = self.store.list_jobs().await?;
 let existing_names: HashSet<String> = existing.iter().map(|j| j.handler_name.clone()).collect();
 let mut registered_names = HashSet::new();

 for reg in registrations {
 self.store
.upsert_job_definition(&reg.handler_name, &reg.trigger, &reg.timezone, reg.workload_class, true)
.await?;
 if !existing_names.contains(&reg.handler_name) {
 let next = next_fire(&reg.trigger, &reg.timezone, now)?;
 self.store.seed_next_run_at(&reg.handler_name, next).await?;
 }
 registered_names.insert(reg.handler_name.clone());
 self.handlers.insert(reg.handler_name, reg.handler);
 }

 for job in existing {
 if !registered_names.contains(&job.handler_name) {
 self.store.disable_job(&job.handler_name).await?;
 }
 }

 Ok(())
 }

 /// One cooperative tick: fire every enabled job whose `next_run_at` has
 /// passed. Dispatch for each job runs to completion before moving to
 /// the next — callers that want concurrent handler execution should
 /// spawn `fire_one` themselves; this loop only decides *which* jobs are
 /// due.
 pub async fn run_due(&self) -> AutonomyResult<Vec<(String, FireOutcome)>> {
 let now = self.clock.now();
 let jobs = self.store.list_jobs().await?;
 let mut fired = Vec::new();

 for job in jobs {
 if !job.enabled {
 continue;
 }
 let due = match job.next_run_at {
 Some(next) => next <= now,
 None => true,
 };
 if !due {
 continue;
 }
 let outcome = self.fire_one(&job, now).await?;
 fired.push((job.handler_name.clone(), outcome));
 }

 Ok(fired)
 }

 /// Locks, gates, and fires a single job. The scheduler advances
 /// `next_run_at` unconditionally at the end of every attempt — a
 /// denied lock or gate means *this* replica skips, not that the job's
 /// schedule itself pauses.
 async fn fire_one(&self, job: &ScheduledJob, now: DateTime<Utc>) -> AutonomyResult<FireOutcome> {
 let lock_name = job_lock_name(&job.handler_name);

 let handle = match self.lock.acquire(&lock_name, self.job_lock_ttl).await? {
 Some(handle) => handle,
 None => {
 emit_event(
 tracing::Level::INFO,
 ProcessKind::Server,
 ObservabilityEvent {
 job_handler: Some(&job.handler_name),
 lock_name: Some(&lock_name),
 status: Some("skipped"),
 detail: Some("lock_unavailable"),
..ObservabilityEvent::new("job_skipped", "scheduler")
 },
 );
 self.advance(job, now, JobRunStatus::Skipped, Some("lock_unavailable")).await?;
 return Ok(FireOutcome::Skipped("lock_unavailable".to_string()));
 }
 };

 let decision = self.gate.allows(job.workload_class).await?;
 if !decision.allowed {
 let reason = decision.reason.unwrap_or("unknown");
 let _ = self.lock.release(&handle).await;
 emit_event(
 tracing::Level::INFO,
 ProcessKind::Server,
 ObservabilityEvent {
 job_handler: Some(&job.handler_name),
 lock_name: Some(&lock_name),
 status: Some("skipped"),
 detail: Some(reason),
..ObservabilityEvent::new("job_skipped", "scheduler")
 },
 );
 self.advance(job, now, JobRunStatus::Skipped, Some(reason)).await?;
 return Ok(FireOutcome::Skipped(reason.to_string()));
 }

 let status = match self.handlers.get(&job.handler_name).cloned() {
 Some(handler) => match handler.run().await {
 Ok(()) => JobRunStatus::Completed,
 Err(err) => {
 tracing::error!(handler = %job.handler_name, error = %err, "scheduled job handler failed");
 JobRunStatus::Failed
 }
 },
 None => {
 tracing::error!(handler = %job.handler_name, "no handler registered for scheduled job");
 JobRunStatus::Failed
 }
 };

 if let Err(err) = self.lock.release(&handle).await {
 tracing::warn!(handler = %job.handler_name, error = %err, "releasing job lock after run failed");
 }

 emit_event(
 if status == JobRunStatus::Failed { tracing::Level::WARN } else { tracing::Level::INFO },
 ProcessKind::Server,
 ObservabilityEvent {
 job_handler: Some(&job.handler_name),
 lock_name: Some(&lock_name),
 status: Some(status.as_str()),
..ObservabilityEvent::new("job_ran", "scheduler")
 },
 );

 self.advance(job, now, status, None).await?;
 Ok(FireOutcome::Ran(status))
 }

 async fn advance(
 &self,
 job: &ScheduledJob,
 now: DateTime<Utc>,
 status: JobRunStatus,
 skip_reason: Option<&str>,
 ) -> AutonomyResult<()> {
 let next = next_fire(&job.trigger, &job.timezone, now)?;
 self.store
.update_job_run(&job.handler_name, Some(next), now, status, skip_reason)
.await
 }
}

/// Handle returned by `Scheduler::start`, giving callers the explicit
/// `start`/`stop(wait)` lifecycle asks for instead of an
/// implicit background task (the only allowed process-wide mutable state —
/// every other component is built explicitly at startup and handed down,
/// with no process-wide mutable globals besides the Scheduler loop itself).
pub struct SchedulerHandle {
 shutdown: CancellationToken,
 join: tokio::task::JoinHandle<()>,
}

impl SchedulerHandle {
 pub async fn stop(self, wait: bool) {
 self.shutdown.cancel();
 if wait {
 let _ = self.join.await;
 }
 }
}

impl<C: Clock + Clone + Send + Sync + 'static> Scheduler<C> {
 /// Start the cooperative tick loop on its own task, ticking every
 /// `tick_interval`. Handler work runs inline within `run_due` (per job,
 /// sequentially) rather than on a separate pool here — `autonomyd`
 /// wires each registered handler to its own bounded-concurrency work,
 /// matching the executor's own "handlers run on a separate worker pool"
 /// split rather than duplicating a pool inside this loop.
 pub fn start(self: Arc<Self>, tick_interval: StdDuration) -> SchedulerHandle {
 let shutdown = CancellationToken::new();
 let child_token = shutdown.clone();
 let scheduler = self.clone();

 let join = tokio::spawn(async move {
 let mut ticker = tokio::time::interval(tick_interval);
 loop {
 tokio::select! {
 _ = child_token.cancelled() => break,
 _ = ticker.tick() => {
 if let Err(err) = scheduler.run_due().await {
 tracing::error!(error = %err, "scheduler tick failed");
 }
 }
 }
 }
 });

 SchedulerHandle { shutdown, join }
 }
}

#[cfg(test)]
mod tests {
 use super::*;

 use std::sync::atomic::{AtomicU32, Ordering};

 use autonomy_clock::{FixedClock, IdleSensor, IdleSensorConfig};
 use autonomy_config::{AutonomyConfig, SchedulerMode};
 use rust_decimal::Decimal;
 use std::str::FromStr;

 struct CountingHandler {
 calls: Arc<AtomicU32>,
 }

 #[async_trait]
 impl JobHandler for CountingHandler {
 async fn run(&self) -> anyhow::Result<()> {
 self.calls.fetch_add(1, Ordering::SeqCst);
 Ok(())
 }
 }

 struct FailingHandler;

 #[async_trait]
 impl JobHandler for FailingHandler {
 async fn run(&self) -> anyhow::Result<()> {
 Err(anyhow::anyhow!("boom"))
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

 async fn scheduler_with(store: Arc<Store>, clock: Arc<FixedClock>) -> Scheduler<Arc<FixedClock>> {
 let idle = Arc::new(IdleSensor::with_clock(IdleSensorConfig::default(), clock.clone()));
 let gate = Arc::new(ResourceGate::new(store.clone(), idle, config));
 Scheduler::new(store, gate, clock, StdDuration::from_secs(900))
 }

 #[tokio::test]
 async fn reconcile_seeds_next_run_at_once() {
 let store = Arc::new(Store::open_in_memory().await.unwrap());
 let now = Utc::now();
 let clock = Arc::new(FixedClock::new(now));
 let mut scheduler = scheduler_with(store.clone(), clock.clone()).await;

 let calls = Arc::new(AtomicU32::new(0));
 let registration = JobRegistration::new(
 "goal_generation_weekly",
 Trigger::Interval { period_seconds: 604_800 },
 "UTC",
 WorkloadClass::Scheduled,
 Arc::new(CountingHandler { calls: calls.clone() }),
 );
 scheduler.reconcile(vec![registration]).await.unwrap();

 let job = store.get_job_by_handler("goal_generation_weekly").await.unwrap().unwrap();
 assert!(job.next_run_at.is_some());
 assert!(job.enabled);
 }

 #[tokio::test]
 async fn reconcile_disables_handlers_dropped_from_code() {
 let store = Arc::new(Store::open_in_memory().await.unwrap());
 let clock = Arc::new(FixedClock::new(Utc::now()));
 let mut scheduler = scheduler_with(store.clone(), clock.clone()).await;

 let registration = JobRegistration::new(
 "stale_handler",
 Trigger::Interval { period_seconds: 60 },
 "UTC",
 WorkloadClass::Scheduled,
 Arc::new(CountingHandler { calls: Arc::new(AtomicU32::new(0)) }),
 );
 scheduler.reconcile(vec![registration]).await.unwrap();
 scheduler.reconcile(vec![]).await.unwrap();

 let job = store.get_job_by_handler("stale_handler").await.unwrap().unwrap();
 assert!(!job.enabled);
 }

 #[tokio::test]
 async fn due_job_fires_and_advances_next_run_at() {
 let store = Arc::new(Store::open_in_memory().await.unwrap());
 let now = Utc::now();
 let clock = Arc::new(FixedClock::new(now));
 let mut scheduler = scheduler_with(store.clone(), clock.clone()).await;

 let calls = Arc::new(AtomicU32::new(0));
 let registration = JobRegistration::new(
 "interval_job",
 Trigger::Interval { period_seconds: 60 },
 "UTC",
 WorkloadClass::Scheduled,
 Arc::new(CountingHandler { calls: calls.clone() }),
 );
 scheduler.reconcile(vec![registration]).await.unwrap();

 clock.advance(chrono::Duration::seconds(61));
 let fired = scheduler.run_due().await.unwrap();
 assert_eq!(fired.len(), 1);
 assert_eq!(fired[0].1, FireOutcome::Ran(JobRunStatus::Completed));
 assert_eq!(calls.load(Ordering::SeqCst), 1);

 let job = store.get_job_by_handler("interval_job").await.unwrap().unwrap();
 assert!(job.next_run_at.unwrap() > clock.now());
 }

 #[tokio::test]
 async fn not_yet_due_job_does_not_fire() {
 let store = Arc::new(Store::open_in_memory().await.unwrap());
 let now = Utc::now();
 let clock = Arc::new(FixedClock::new(now));
 let mut scheduler = scheduler_with(store.clone(), clock.clone()).await;

 let calls = Arc::new(AtomicU32::new(0));
 let registration = JobRegistration::new(
 "interval_job",
 Trigger::Interval { period_seconds: 3600 },
 "UTC",
 WorkloadClass::Scheduled,
 Arc::new(CountingHandler { calls: calls.clone() }),
 );
 scheduler.reconcile(vec![registration]).await.unwrap();

 let fired = scheduler.run_due().await.unwrap();
 assert!(fired.is_empty());
 assert_eq!(calls.load(Ordering::SeqCst), 0);
 }

 #[tokio::test]
 async fn failing_handler_is_absorbed_and_marked_failed() {
 let store = Arc::new(Store::open_in_memory().await.unwrap());
 let now = Utc::now();
 let clock = Arc::new(FixedClock::new(now));
 let mut scheduler = scheduler_with(store.clone(), clock.clone()).await;

 let registration = JobRegistration::new(
 "flaky_job",
 Trigger::Interval { period_seconds: 60 },
 "UTC",
 WorkloadClass::Scheduled,
 Arc::new(FailingHandler),
 );
 scheduler.reconcile(vec![registration]).await.unwrap();
 clock.advance(chrono::Duration::seconds(61));

 let fired = scheduler.run_due().await.unwrap();
 assert_eq!(fired[0].1, FireOutcome::Ran(JobRunStatus::Failed));

 let job = store.get_job_by_handler("flaky_job").await.unwrap().unwrap();
 assert_eq!(job.last_status, Some(JobRunStatus::Failed));
 }

 #[tokio::test]
 async fn second_replica_is_skipped_by_the_job_lock() {
 let store = Arc::new(Store::open_in_memory().await.unwrap());
 let now = Utc::now();
 let clock = Arc::new(FixedClock::new(now));

 let mut scheduler_a = scheduler_with(store.clone(), clock.clone()).await;
 let scheduler_b = scheduler_with(store.clone(), clock.clone()).await;

 let calls = Arc::new(AtomicU32::new(0));
 let registration = JobRegistration::new(
 "weekly_research_cycle",
 Trigger::Interval { period_seconds: 60 },
 "UTC",
 WorkloadClass::Scheduled,
 Arc::new(CountingHandler { calls: calls.clone() }),
 );
 scheduler_a.reconcile(vec![registration]).await.unwrap();
 clock.advance(chrono::Duration::seconds(61));

 let job = store.get_job_by_handler("weekly_research_cycle").await.unwrap().unwrap();
 let lock = DistributedLock::new(store.clone());
 let held = lock.acquire(&job_lock_name("weekly_research_cycle"), StdDuration::from_secs(30)).await.unwrap().unwrap();

 let outcome = scheduler_b.fire_one(&job, clock.now()).await.unwrap();
 assert_eq!(outcome, FireOutcome::Skipped("lock_unavailable".to_string()));

 lock.release(&held).await.unwrap();
 let outcome = scheduler_a.fire_one(&job, clock.now()).await.unwrap();
 assert_eq!(outcome, FireOutcome::Ran(JobRunStatus::Completed));
 assert_eq!(calls.load(Ordering::SeqCst), 1);
 }
}
