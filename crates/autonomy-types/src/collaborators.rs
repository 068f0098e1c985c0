//! Contracts for the external collaborators the autonomy core invokes but
//! does not implement: the research pipeline, the
//! knowledge-base writer, the fabrication stack, and the metrics probe used
//! by the Goal Generator and Outcome Tracker. Kept here (rather than in
//! each consuming crate) since both `autonomy-goals` and `autonomy-outcomes`
//! depend on `MetricsProbe`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use autonomy_error::AutonomyResult;
use crate::Usd;

#[derive(Debug, Clone)]
pub struct GatherResult {
 pub citations: Vec<String>,
 pub raw_text: String,
 pub cost_usd: Usd,
}

#[derive(Debug, Clone)]
pub struct SynthesizeResult {
 pub article_markdown: String,
 pub cost_usd: Usd,
}

/// `gather`/`synthesize` — the research pipeline.
#[async_trait]
pub trait ResearchCollaborator: Send + Sync {
 async fn gather(&self, query: &str, budget_usd: Usd) -> AutonomyResult<GatherResult>;
 async fn synthesize(
 &self,
 inputs: &[String],
 model_hint: Option<&str>,
 ) -> AutonomyResult<SynthesizeResult>;
}

#[derive(Debug, Clone)]
pub struct CreateArticleResult {
 pub path: String,
 pub version_tag: String,
}

#[derive(Debug, Clone)]
pub struct AppendCommitResult {
 pub commit_ref: String,
}

/// `create_article`/`append_commit`.
#[async_trait]
pub trait KnowledgeBaseWriter: Send + Sync {
 async fn create_article(
 &self,
 slug: &str,
 markdown: &str,
 frontmatter: &Map<String, Value>,
 ) -> AutonomyResult<CreateArticleResult>;
 async fn append_commit(&self, message: &str) -> AutonomyResult<AppendCommitResult>;
}

#[derive(Debug, Clone)]
pub struct QueuePrintResult {
 pub job_id: String,
}

#[derive(Debug, Clone)]
pub struct PrintOutcomeResult {
 pub success: bool,
 pub failure_reason: Option<String>,
 pub duration_h: f64,
 pub material_g: f64,
 pub cost_usd: Usd,
}

/// `queue_print`/`print_outcome`.
#[async_trait]
pub trait FabricationCollaborator: Send + Sync {
 async fn queue_print(&self, design: &Map<String, Value>) -> AutonomyResult<QueuePrintResult>;
 async fn print_outcome(&self, job_id: &str) -> AutonomyResult<PrintOutcomeResult>;
}

/// One row of the print-failure history the Goal Generator's clustering
/// strategy and the Outcome Tracker's `improvement` baseline
/// both consume.
#[derive(Debug, Clone)]
pub struct PrintFailureRecord {
 pub reason: String,
 pub cost_usd: Decimal,
}

/// `materials_count_for_slug`/`failures_by_reason`/`tier_spend_fraction`/
/// `total_spend`, plus `recent_print_failures`/`total_prints`
/// which back the print-failure clustering strategy's `frequency`/
/// `severity` components: all read-only analytics queries over data
/// this core's own collaborators produced.
#[async_trait]
pub trait MetricsProbe: Send + Sync {
 async fn materials_count_for_slug(&self, slug: &str) -> AutonomyResult<u64>;
 async fn failures_by_reason(
 &self,
 since: DateTime<Utc>,
 until: DateTime<Utc>,
 ) -> AutonomyResult<HashMap<String, u64>>;
 async fn tier_spend_fraction(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> AutonomyResult<f64>;
 async fn total_spend(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> AutonomyResult<Decimal>;

 async fn recent_print_failures(
 &self,
 since: DateTime<Utc>,
 until: DateTime<Utc>,
 ) -> AutonomyResult<Vec<PrintFailureRecord>>;
 async fn total_prints(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> AutonomyResult<u64>;

 /// Existing knowledge-base article slugs, for the knowledge-gap
 /// detection strategy to diff against a configured topic set.
 async fn existing_kb_slugs(&self) -> AutonomyResult<Vec<String>>;

 /// Query-miss rate (fraction of recent queries that found no matching
 /// KB article) for a given slug, used by the `research` outcome
 /// baseline/measurement.
 async fn recent_query_miss_rate_for_slug(&self, slug: &str) -> AutonomyResult<f64>;

 /// Subsequent queries that hit a newly created article — the
 /// `research` adoption metric.
 async fn query_hits_since(&self, slug: &str, since: DateTime<Utc>) -> AutonomyResult<u64>;
}
