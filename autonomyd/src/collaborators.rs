//! Default collaborator adapters for a standalone `autonomyd` run.
//!
//! The research pipeline, the fabrication stack, and the metrics probe's
//! underlying data sources are owned by other services: this core invokes
//! them via narrow contracts but does not implement them. These
//! adapters are the seam a real deployment replaces with an HTTP client
//! against the lab's LLM router / printer-driver service / analytics
//! store. The knowledge-base writer is the one collaborator this crate
//! can reasonably own outright, since "write markdown to the lab's KB
//! directory and append a commit log line" has no external dependency.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use autonomy_error::{AutonomyError, AutonomyResult};
use autonomy_types::{
 AppendCommitResult, CreateArticleResult, FabricationCollaborator, GatherResult,
 KnowledgeBaseWriter, MetricsProbe, PrintFailureRecord, PrintOutcomeResult, QueuePrintResult,
 ResearchCollaborator, SynthesizeResult,
};

/// Writes KB articles as markdown files under `root`, with a YAML-ish
/// frontmatter header, and appends commit messages to `root/COMMITS.log`.
/// `version_tag`/`commit_ref` are content hashes rather than real VCS
/// objects — a production deployment points this collaborator at the
/// lab's actual KB git repository instead.
pub struct FilesystemKnowledgeBaseWriter {
 root: PathBuf,
}

impl FilesystemKnowledgeBaseWriter {
 pub fn new(root: impl Into<PathBuf>) -> Self {
 Self { root: root.into() }
 }
}

#[async_trait]
impl KnowledgeBaseWriter for FilesystemKnowledgeBaseWriter {
 async fn create_article(
 &self,
 slug: &str,
 markdown: &str,
 frontmatter: &Map<String, Value>,
 ) -> AutonomyResult<CreateArticleResult> {
 tokio::fs::create_dir_all(&self.root)
.await
.map_err(|e| AutonomyError::Internal(e.into()))?;

 let mut doc = String::from("---\n");
 for (key, value) in frontmatter {
 doc.push_str(&format!("{key}: {value}\n"));
 }
 doc.push_str("---\n\n");
 doc.push_str(markdown);

 let path = self.root.join(format!("{slug}.md"));
 tokio::fs::write(&path, &doc)
.await
.map_err(|e| AutonomyError::Internal(e.into()))?;

 Ok(CreateArticleResult {
 path: path.display().to_string(),
 version_tag: autonomy_observability::short_hash(&doc),
 })
 }

 async fn append_commit(&self, message: &str) -> AutonomyResult<AppendCommitResult> {
 let log_path = self.root.join("COMMITS.log");
 let line = format!("{} {}\n", Utc::now().to_rfc3339(), message);
 let mut existing = tokio::fs::read_to_string(&log_path).await.unwrap_or_default();
 existing.push_str(&line);
 tokio::fs::write(&log_path, &existing)
.await
.map_err(|e| AutonomyError::Internal(e.into()))?;
 Ok(AppendCommitResult {
 commit_ref: autonomy_observability::short_hash(&line),
 })
 }
}

/// Placeholder for the research pipeline's web retrieval/synthesis model
/// calls, explicitly out of scope. Always reports
/// `external_unavailable` so a task routed here fails retryably rather
/// than silently fabricating data; wire a real adapter in before running
/// any `research`-typed goal in production.
#[derive(Default)]
pub struct UnconfiguredResearchCollaborator;

#[async_trait]
impl ResearchCollaborator for UnconfiguredResearchCollaborator {
 async fn gather(&self, _query: &str, _budget_usd: rust_decimal::Decimal) -> AutonomyResult<GatherResult> {
 Err(AutonomyError::ExternalUnavailable)
 }

 async fn synthesize(
 &self,
 _inputs: &[String],
 _model_hint: Option<&str>,
 ) -> AutonomyResult<SynthesizeResult> {
 Err(AutonomyError::ExternalUnavailable)
 }
}

/// Placeholder for the CAD/slicer/printer-driver stack, explicitly out of
/// scope. See [`UnconfiguredResearchCollaborator`].
#[derive(Default)]
pub struct UnconfiguredFabricationCollaborator {
 next_job: AtomicU64,
}

#[async_trait]
impl FabricationCollaborator for UnconfiguredFabricationCollaborator {
 async fn queue_print(&self, _spec: &Map<String, Value>) -> AutonomyResult<QueuePrintResult> {
 let id = self.next_job.fetch_add(1, Ordering::Relaxed);
 Ok(QueuePrintResult {
 job_id: format!("unconfigured-print-{id}"),
 })
 }

 async fn print_outcome(&self, _job_id: &str) -> AutonomyResult<PrintOutcomeResult> {
 Err(AutonomyError::ExternalUnavailable)
 }
}

/// Placeholder metrics probe returning empty/zero readings. A production
/// deployment backs this with the print-outcome dashboard's database and
/// the LLM router's spend ledger, both owned by other services; until
/// then the Goal Generator's strategies simply find nothing to propose
/// and the Outcome Tracker's baselines read as zero, which is a safe
/// (if uninteresting) default rather than a crash.
#[derive(Default)]
pub struct NullMetricsProbe;

#[async_trait]
impl MetricsProbe for NullMetricsProbe {
 async fn materials_count_for_slug(&self, _slug: &str) -> AutonomyResult<u64> {
 Ok(0)
 }

 async fn failures_by_reason(
 &self,
 _since: DateTime<Utc>,
 _until: DateTime<Utc>,
 ) -> AutonomyResult<std::collections::HashMap<String, u64>> {
 Ok(std::collections::HashMap::new())
 }

 async fn tier_spend_fraction(&self, _since: DateTime<Utc>, _until: DateTime<Utc>) -> AutonomyResult<f64> {
 Ok(0.0)
 }

 async fn total_spend(&self, _since: DateTime<Utc>, _until: DateTime<Utc>) -> AutonomyResult<rust_decimal::Decimal> {
 Ok(rust_decimal::Decimal::ZERO)
 }

 async fn recent_print_failures(
 &self,
 _since: DateTime<Utc>,
 _until: DateTime<Utc>,
 ) -> AutonomyResult<Vec<PrintFailureRecord>> {
 Ok(Vec::new())
 }

 async fn total_prints(&self, _since: DateTime<Utc>, _until: DateTime<Utc>) -> AutonomyResult<u64> {
 Ok(0)
 }

 async fn existing_kb_slugs(&self) -> AutonomyResult<Vec<String>> {
 Ok(Vec::new())
 }

 async fn recent_query_miss_rate_for_slug(&self, _slug: &str) -> AutonomyResult<f64> {
 Ok(0.0)
 }

 async fn query_hits_since(&self, _slug: &str, _since: DateTime<Utc>) -> AutonomyResult<u64> {
 Ok(0)
 }
}

pub fn default_kb_root(state_dir: &Path) -> PathBuf {
 state_dir.join("kb")
}
