//! `autonomyd`: the long-lived process that hosts every component of the
//! autonomy core. `main` builds the explicit `AutonomyConfig` and a
//! `Services`-style bundle of `Arc`s once at startup and
//! wires them together: Scheduler drives the Goal Generator, the Task
//! Dispatch pass, and the Outcome Tracker's measurement sweep; the HTTP
//! API serves approvals and status reads concurrently.

mod collaborators;
mod handlers;
mod jobs;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use clap::Parser;

use autonomy_approval::ApprovalWorkflow;
use autonomy_clock::{IdleSensor, IdleSensorConfig, SystemClock};
use autonomy_config::AutonomyConfig;
use autonomy_executor::{RetryPolicy, TaskExecutor};
use autonomy_feedback::FeedbackLoop;
use autonomy_gate::ResourceGate;
use autonomy_goals::GoalGenerator;
use autonomy_lock::DistributedLock;
use autonomy_observability::{init_process_logging, ProcessKind};
use autonomy_outcomes::OutcomeTracker;
use autonomy_scheduler::{JobRegistration, Scheduler};
use autonomy_server::AppState;
use autonomy_store::Store;
use autonomy_types::{MetricsProbe, Trigger, WorkloadClass};

#[derive(Parser, Debug)]
#[command(name = "autonomyd", about = "Autonomy core daemon for the fabrication lab")]
struct Cli {
 #[arg(long, default_value = "127.0.0.1")]
 hostname: String,
 #[arg(long, default_value_t = 8090)]
 port: u16,
 #[arg(long, default_value = "./autonomy-state")]
 state_dir: PathBuf,
 #[arg(long, default_value_t = 900)]
 scheduler_tick_seconds: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
 let cli = Cli::parse();
 let logs_dir = autonomy_observability::canonical_logs_dir_from_root(&cli.state_dir);
 let (_guard, info) = init_process_logging(ProcessKind::Server, &logs_dir, 14)?;
 tracing::info!(?info, "autonomy-core logging initialized");

 let config = match AutonomyConfig::from_env() {
 Ok(config) => config,
 Err(err) => {
 eprintln!("{err}");
 std::process::exit(1);
 }
 };

 let store = Arc::new(Store::open(&config.store_url).await?);
 let idle_sensor = Arc::new(IdleSensor::<SystemClock>::new(IdleSensorConfig {
 cpu_idle_pct: config.cpu_idle_pct,
 mem_idle_pct: config.mem_idle_pct,
 idle_threshold_minutes: config.idle_threshold_minutes,
..IdleSensorConfig::default()
 }));
 spawn_idle_sampler(idle_sensor.clone());

 let gate = Arc::new(ResourceGate::new(store.clone(), idle_sensor.clone(), config.clone()));
 let lock = DistributedLock::new(store.clone());

 let kb_root = collaborators::default_kb_root(&cli.state_dir);
 let kb_writer: Arc<dyn autonomy_types::KnowledgeBaseWriter> =
 Arc::new(collaborators::FilesystemKnowledgeBaseWriter::new(kb_root));
 let research: Arc<dyn autonomy_types::ResearchCollaborator> =
 Arc::new(collaborators::UnconfiguredResearchCollaborator);
 let fabrication: Arc<dyn autonomy_types::FabricationCollaborator> =
 Arc::new(collaborators::UnconfiguredFabricationCollaborator::default());
 let probe: Arc<dyn MetricsProbe> = Arc::new(collaborators::NullMetricsProbe);

 let feedback = Arc::new(FeedbackLoop::new(store.clone(), config.feedback_min_samples));
 let approval = Arc::new(ApprovalWorkflow::new(store.clone(), config.outcome_window_days as i64));

 let mut executor = TaskExecutor::new(
 store.clone(),
 gate.clone(),
 RetryPolicy::default(),
 StdDuration::from_secs(3600),
 StdDuration::from_secs(120),
 );
 register_task_handlers(&mut executor, research.clone(), fabrication.clone(), kb_writer.clone(), probe.clone(), store.clone());
 let executor = Arc::new(executor);

 let goal_generator = GoalGenerator::new(store.clone(), config.feedback_min_samples);
 let outcome_tracker = OutcomeTracker::new(store.clone(), config.outcome_window_days as i64);

 let mut scheduler = Scheduler::new(store.clone(), gate.clone(), SystemClock, StdDuration::from_secs(1800));
 scheduler
.reconcile(vec![
 JobRegistration::new(
 "goal_generation_weekly",
 Trigger::Interval { period_seconds: 7 * 24 * 3600 },
 config.scheduler_timezone.clone(),
 WorkloadClass::Scheduled,
 Arc::new(jobs::GoalGenerationJob {
 generator: goal_generator,
 probe: probe.clone(),
 lock: lock.clone(),
 lookback_days: 30,
 default_budget_limit_usd: config.daily_budget_usd,
 }),
 ),
 JobRegistration::new(
 "task_dispatch",
 Trigger::Interval { period_seconds: 60 },
 config.scheduler_timezone.clone(),
 WorkloadClass::Scheduled,
 Arc::new(jobs::TaskDispatchJob {
 store: store.clone(),
 executor: executor.clone(),
 }),
 ),
 JobRegistration::new(
 "outcome_measurement_daily",
 Trigger::Cron { expression: "0 0 3 * * *".to_string() },
 config.scheduler_timezone.clone(),
 WorkloadClass::Scheduled,
 Arc::new(jobs::OutcomeMeasurementJob {
 tracker: outcome_tracker,
 probe: probe.clone(),
 }),
 ),
 ])
.await?;

 let scheduler = Arc::new(scheduler);
 let scheduler_handle = scheduler.start(StdDuration::from_secs(cli.scheduler_tick_seconds));

 let app_state = AppState {
 store,
 approval,
 feedback,
 gate,
 idle_sensor,
 config,
 probe,
 };

 let addr: std::net::SocketAddr = format!("{}:{}", cli.hostname, cli.port).parse()?;
 autonomy_server::serve(addr, app_state).await?;

 scheduler_handle.stop(true).await;
 Ok(())
}

fn register_task_handlers(
 executor: &mut TaskExecutor<SystemClock>,
 research: Arc<dyn autonomy_types::ResearchCollaborator>,
 fabrication: Arc<dyn autonomy_types::FabricationCollaborator>,
 kb_writer: Arc<dyn autonomy_types::KnowledgeBaseWriter>,
 probe: Arc<dyn MetricsProbe>,
 store: Arc<Store>,
) {
 executor.register_handler(
 "research_gather",
 Arc::new(handlers::ResearchGatherHandler { collaborator: research.clone() }),
 );
 executor.register_handler(
 "research_synthesize",
 Arc::new(handlers::ResearchSynthesizeHandler { collaborator: research.clone(), store: store.clone() }),
 );
 executor.register_handler(
 "kb_create",
 Arc::new(handlers::KbCreateHandler { writer: kb_writer.clone(), store: store.clone() }),
 );
 executor.register_handler(
 "review_commit",
 Arc::new(handlers::ReviewCommitHandler { writer: kb_writer.clone() }),
 );
 executor.register_handler(
 "diagnose_failure_pattern",
 Arc::new(handlers::DiagnoseFailurePatternHandler { probe: probe.clone() }),
 );
 executor.register_handler(
 "implement_mitigation",
 Arc::new(handlers::ImplementMitigationHandler { collaborator: research.clone(), store: store.clone() }),
 );
 executor.register_handler(
 "validate_print",
 Arc::new(handlers::ValidatePrintHandler { collaborator: fabrication.clone() }),
 );
 executor.register_handler(
 "analyze_spend_mix",
 Arc::new(handlers::AnalyzeSpendMixHandler { probe: probe.clone() }),
 );
 executor.register_handler("apply_routing_rule", Arc::new(handlers::ApplyRoutingRuleHandler));
 executor.register_handler(
 "gather_training_examples",
 Arc::new(handlers::GatherTrainingExamplesHandler { collaborator: research.clone() }),
 );
 executor.register_handler(
 "explore_candidate",
 Arc::new(handlers::ExploreCandidateHandler { collaborator: research }),
 );
}

/// Background task sampling CPU/memory on the idle sensor's configured
/// interval; the sensor itself
/// never self-schedules.
fn spawn_idle_sampler(idle_sensor: Arc<IdleSensor<SystemClock>>) {
 tokio::spawn(async move {
 let mut ticker = tokio::time::interval(StdDuration::from_secs(5));
 loop {
 ticker.tick().await;
 idle_sensor.sample();
 }
 });
}
