//! The Approval Workflow: the only path by which a goal may
//! advance past `identified`. Every transition is transactional (delegated
//! to `autonomy-store`/`autonomy-engine`) and emits an audit event; baseline
//! capture for the Outcome Tracker happens synchronously as part of
//! approval.

use std::sync::Arc;

use serde_json::{Map, Value};

use autonomy_engine::ProjectEngine;
use autonomy_error::AutonomyResult;
use autonomy_observability::{emit_event, ObservabilityEvent, ProcessKind};
use autonomy_outcomes::OutcomeTracker;
use autonomy_store::Store;
use autonomy_types::{Goal, GoalStatus, GoalType, MetricsProbe, Project};

/// Per-goal-type policy governing whether a goal may advance without an
/// explicit human decision. Auto-approval is an optional, clearly-recorded
/// extension; the only policy that ships active is [`ManualOnly`] — every
/// goal requires an explicit recorded approval.
pub trait ApprovalPolicy: Send + Sync {
 /// Whether `goal` may be auto-approved right now. Implementations that
 /// answer `true` MUST also supply the `approved_by`/`approval_notes`
 /// values that will be recorded, so the auto-approval is as visible in
 /// the audit trail as a human one.
 fn auto_approve(&self, goal: &Goal) -> Option<AutoApproval>;
}

#[derive(Debug, Clone)]
pub struct AutoApproval {
 pub approved_by: String,
 pub notes: String,
}

/// The default, and only shipping, policy: every goal waits for an
/// explicit operator decision. No goal type is exempted.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualOnly;

impl ApprovalPolicy for ManualOnly {
 fn auto_approve(&self, _goal: &Goal) -> Option<AutoApproval> {
 None
 }
}

/// Wiring for a future `AutoApproveBelow { goal_type, max_cost_usd }`
/// policy. Not constructed by
/// `autonomyd` today — `ManualOnly` is the active default — but the shape
/// is here so a later operator decision to relax a specific goal type
/// doesn't require touching the workflow's call sites.
#[derive(Debug, Clone)]
pub struct AutoApproveBelow {
 pub goal_type: GoalType,
 pub max_cost_usd: rust_decimal::Decimal,
}

impl ApprovalPolicy for AutoApproveBelow {
 fn auto_approve(&self, goal: &Goal) -> Option<AutoApproval> {
 if goal.goal_type == self.goal_type && goal.estimated_cost_usd <= self.max_cost_usd {
 Some(AutoApproval {
 approved_by: "autonomy-core:auto-approval-policy".to_string(),
 notes: format!(
 "auto-approved under policy AutoApproveBelow{{goal_type: {:?}, max_cost_usd: {}}}",
 self.goal_type, self.max_cost_usd
 ),
 })
 } else {
 None
 }
 }
}

pub struct ApprovalWorkflow {
 store: Arc<Store>,
 engine: ProjectEngine,
 outcomes: OutcomeTracker,
 policy: Box<dyn ApprovalPolicy>,
}

impl ApprovalWorkflow {
 pub fn new(store: Arc<Store>, outcome_window_days: i64) -> Self {
 Self::with_policy(store, outcome_window_days, Box::new(ManualOnly))
 }

 pub fn with_policy(
 store: Arc<Store>,
 outcome_window_days: i64,
 policy: Box<dyn ApprovalPolicy>,
 ) -> Self {
 Self {
 engine: ProjectEngine::new(store.clone()),
 outcomes: OutcomeTracker::new(store.clone(), outcome_window_days),
 store,
 policy,
 }
 }

 pub async fn list_pending(&self) -> AutonomyResult<Vec<Goal>> {
 self.store.list_goals_by_status(GoalStatus::Identified).await
 }

 /// Approve a goal: create its project and task template, capture the
 /// Outcome Tracker's baseline, and append an audit entry. Idempotent —
 /// re-approving an already-approved goal returns the existing project
 /// without capturing a second baseline.
 pub async fn approve(
 &self,
 goal_id: &str,
 approver: &str,
 notes: Option<&str>,
 probe: &dyn MetricsProbe,
 ) -> AutonomyResult<Project> {
 let goal_before = self.store.get_goal(goal_id).await?;
 let already_approved = goal_before.status != GoalStatus::Identified;

 let project = self.engine.approve_goal(goal_id, approver, notes).await?;

 if !already_approved {
 let goal = self.store.get_goal(goal_id).await?;
 self.outcomes.capture_baseline(&goal, probe).await?;

 let mut detail = Map::new();
 detail.insert("project_id".to_string(), Value::String(project.id.clone()));
 if let Some(notes) = notes {
 detail.insert(
 "notes".to_string(),
 Value::String(autonomy_observability::redact_text(notes)),
 );
 }
 self.store
.append_audit(approver, "approve", "goal", goal_id, &detail)
.await?;

 emit_event(
 tracing::Level::INFO,
 ProcessKind::Server,
 ObservabilityEvent {
 status: Some("approved"),
 goal_id: Some(goal_id),
 project_id: Some(&project.id),
..ObservabilityEvent::new("goal_approved", "approval_workflow")
 },
 );
 }

 Ok(project)
 }

 pub async fn reject(&self, goal_id: &str, approver: &str, notes: Option<&str>) -> AutonomyResult<()> {
 self.engine.reject_goal(goal_id, approver, notes).await?;

 let mut detail = Map::new();
 if let Some(notes) = notes {
 detail.insert(
 "notes".to_string(),
 Value::String(autonomy_observability::redact_text(notes)),
 );
 }
 self.store
.append_audit(approver, "reject", "goal", goal_id, &detail)
.await?;

 emit_event(
 tracing::Level::INFO,
 ProcessKind::Server,
 ObservabilityEvent {
 status: Some("rejected"),
 goal_id: Some(goal_id),
..ObservabilityEvent::new("goal_rejected", "approval_workflow")
 },
 );
 Ok(())
 }

 /// Run the configured [`ApprovalPolicy`] against every `identified`
 /// goal, auto-approving where it answers. Never called by anything in
 /// this workspace today (only `ManualOnly` ships active, which always
 /// answers `None`) — exposed so an operator who constructs this
 /// workflow with `AutoApproveBelow` has a single entry point to drive
 /// it from a scheduled job.
 pub async fn run_auto_approval_pass(&self, probe: &dyn MetricsProbe) -> AutonomyResult<Vec<Project>> {
 let pending = self.list_pending().await?;
 let mut approved = Vec::new();
 for goal in pending {
 if let Some(decision) = self.policy.auto_approve(&goal) {
 let project = self
.approve(&goal.id, &decision.approved_by, Some(&decision.notes), probe)
.await?;
 approved.push(project);
 }
 }
 Ok(approved)
 }

 /// Goal plus its project and last outcome, joined for the `GET
 /// goals/{id}` response shape.
 pub async fn goal_detail(&self, goal_id: &str) -> AutonomyResult<GoalDetail> {
 let goal = self.store.get_goal(goal_id).await?;
 let project = self.store.get_project_by_goal(goal_id).await?;
 let outcome = self.store.get_outcome(goal_id).await?;
 Ok(GoalDetail { goal, project, outcome })
 }
}

#[derive(Debug, Clone)]
pub struct GoalDetail {
 pub goal: Goal,
 pub project: Option<Project>,
 pub outcome: Option<autonomy_types::GoalOutcome>,
}

#[cfg(test)]
mod tests {
 use super::*;

 use std::collections::HashMap;

 use async_trait::async_trait;
 use autonomy_types::{GoalType, PrintFailureRecord};
 use chrono::Utc;
 use rust_decimal::Decimal;

 struct StubProbe;

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
 async fn tier_spend_fraction(&self, _since: chrono::DateTime<Utc>, _until: chrono::DateTime<Utc>) -> AutonomyResult<f64> {
 Ok(0.0)
 }
 async fn total_spend(&self, _since: chrono::DateTime<Utc>, _until: chrono::DateTime<Utc>) -> AutonomyResult<Decimal> {
 Ok(Decimal::ZERO)
 }
 async fn recent_print_failures(
 &self,
 _since: chrono::DateTime<Utc>,
 _until: chrono::DateTime<Utc>,
 ) -> AutonomyResult<Vec<PrintFailureRecord>> {
 Ok(Vec::new())
 }
 async fn total_prints(&self, _since: chrono::DateTime<Utc>, _until: chrono::DateTime<Utc>) -> AutonomyResult<u64> {
 Ok(0)
 }
 async fn existing_kb_slugs(&self) -> AutonomyResult<Vec<String>> {
 Ok(Vec::new())
 }
 async fn recent_query_miss_rate_for_slug(&self, _slug: &str) -> AutonomyResult<f64> {
 Ok(0.0)
 }
 async fn query_hits_since(&self, _slug: &str, _since: chrono::DateTime<Utc>) -> AutonomyResult<u64> {
 Ok(0)
 }
 }

 fn sample_goal() -> Goal {
 Goal {
 id: "goal-1".to_string(),
 title: "t".to_string(),
 description: "d".to_string(),
 goal_type: GoalType::Research,
 status: GoalStatus::Identified,
 base_impact_score: 60.0,
 adjustment_factor: 1.0,
 adjusted_impact_score: 60.0,
 estimated_cost_usd: Decimal::new(1000, 2),
 budget_limit_usd: Decimal::new(5000, 2),
 approved_by: None,
 approved_at: None,
 approval_notes: None,
 learn_from: true,
 baseline_captured: false,
 baseline_captured_at: None,
 outcome_measured_at: None,
 effectiveness_score: None,
 metadata: Default::default(),
 created_at: Utc::now(),
 }
 }

 #[tokio::test]
 async fn approve_is_idempotent_and_captures_baseline_once() {
 let store = Arc::new(Store::open_in_memory().await.unwrap());
 store.insert_goal(&sample_goal()).await.unwrap();
 let workflow = ApprovalWorkflow::new(store.clone(), 30);
 let probe = StubProbe;

 let project1 = workflow.approve("goal-1", "alice", None, &probe).await.unwrap();
 let project2 = workflow.approve("goal-1", "alice", None, &probe).await.unwrap();
 assert_eq!(project1.id, project2.id);

 let goal = store.get_goal("goal-1").await.unwrap();
 assert!(goal.baseline_captured);

 let audit = store.list_audit_for_entity("goal", "goal-1").await.unwrap();
 assert_eq!(audit.iter().filter(|e| e.action == "approve").count(), 1);
 }

 #[tokio::test]
 async fn reject_then_reject_again_is_invalid_state() {
 let store = Arc::new(Store::open_in_memory().await.unwrap());
 store.insert_goal(&sample_goal()).await.unwrap();
 let workflow = ApprovalWorkflow::new(store.clone(), 30);

 workflow.reject("goal-1", "alice", Some("not worth it")).await.unwrap();
 let err = workflow.reject("goal-1", "alice", None).await.unwrap_err();
 assert_eq!(err.code(), "invalid_state");
 }

 #[tokio::test]
 async fn manual_only_policy_never_auto_approves() {
 let goal = sample_goal();
 assert!(ManualOnly.auto_approve(&goal).is_none());
 }

 #[tokio::test]
 async fn auto_approve_below_policy_respects_cost_ceiling() {
 let policy = AutoApproveBelow {
 goal_type: GoalType::Research,
 max_cost_usd: Decimal::new(500, 2),
 };
 let mut goal = sample_goal();
 goal.estimated_cost_usd = Decimal::new(1000, 2);
 assert!(policy.auto_approve(&goal).is_none());

 goal.estimated_cost_usd = Decimal::new(100, 2);
 assert!(policy.auto_approve(&goal).is_some());
 }
}
