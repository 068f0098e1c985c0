//! The Project/Task Engine: turns an approved goal into a
//! project and its task graph, tracks readiness as dependencies complete,
//! and folds task outcomes back into project/goal completion.

mod templates;

pub use templates::{template_for, TemplateStep};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use autonomy_error::AutonomyResult;
use autonomy_store::Store;
use autonomy_types::{
 BudgetCategory, Goal, Project, ProjectStatus, Task, TaskOutcome, TaskOutcomeStatus, TaskStatus,
};

pub struct ProjectEngine {
 store: Arc<Store>,
}

/// What happened to a task and its project as a result of applying one
/// reported [`TaskOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOutcomeApplied {
 pub new_task_status: TaskStatus,
 pub project_completed: bool,
}

impl ProjectEngine {
 pub fn new(store: Arc<Store>) -> Self {
 Self { store }
 }

 /// Approve a goal, create its project, and instantiate its task
 /// template. Idempotent: re-approving an already-approved goal returns
 /// the existing project without re-instantiating tasks.
 pub async fn approve_goal(
 &self,
 goal_id: &str,
 approver: &str,
 notes: Option<&str>,
 ) -> AutonomyResult<Project> {
 let project = self.store.transition_goal_approved(goal_id, approver, notes).await?;

 let existing_tasks = self.store.list_tasks_for_project(&project.id).await?;
 if existing_tasks.is_empty() {
 let goal = self.store.get_goal(goal_id).await?;
 let tasks = instantiate_tasks(&project.id, &goal);
 self.store.insert_tasks(&tasks).await?;
 self.store.mark_project_active(&project.id).await?;
 }

 Ok(project)
 }

 pub async fn reject_goal(&self, goal_id: &str, approver: &str, notes: Option<&str>) -> AutonomyResult<()> {
 self.store.reject_goal(goal_id, approver, notes).await
 }

 /// Promote every `pending` task in a project whose dependencies are now
 /// satisfied to `ready`.
 pub async fn evaluate_readiness(&self, project_id: &str) -> AutonomyResult<()> {
 let tasks = self.store.list_tasks_for_project(project_id).await?;
 let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();

 for task in &tasks {
 if task.status != TaskStatus::Pending {
 continue;
 }
 let satisfied = task.depends_on.iter().all(|dep_id| {
 by_id
.get(dep_id.as_str())
.map(|dep| dep.satisfies_dependency(task.strict_depends_on.contains(dep_id)))
.unwrap_or(false)
 });
 if satisfied {
 self.store.mark_task_status(&task.id, TaskStatus::Ready).await?;
 }
 }
 Ok(())
 }

 /// Apply a handler's reported [`TaskOutcome`] to its task: record the
 /// attempt, debit the project's budget for the reported cost, evaluate
 /// newly-unblocked dependents, and propagate completion/failure to the
 /// project.
 ///
 /// `max_retries` bounds retryable failures: once `attempt_count + 1`
 /// reaches it, a `failed_retryable` outcome is treated as terminal.
 /// `retry_delay` is the backoff the caller's retry policy computed for
 /// this attempt — the engine only persists it, the executor's
 /// `RetryPolicy` decides it.
 pub async fn apply_task_outcome(
 &self,
 task: &Task,
 outcome: TaskOutcome,
 max_retries: u32,
 retry_delay: chrono::Duration,
 ) -> AutonomyResult<TaskOutcomeApplied> {
 let new_status = match outcome.status {
 TaskOutcomeStatus::Completed => TaskStatus::Completed,
 TaskOutcomeStatus::FailedFatal => TaskStatus::Failed,
 TaskOutcomeStatus::FailedRetryable => {
 if task.attempt_count + 1 >= max_retries {
 TaskStatus::Failed
 } else {
 TaskStatus::Ready
 }
 }
 };
 let retry_not_before = (new_status == TaskStatus::Ready).then(|| Utc::now() + retry_delay);

 self.store
.record_task_attempt(
 &task.id,
 new_status,
 &outcome.result,
 Some(outcome.cost_usd),
 outcome.error.as_deref(),
 retry_not_before,
 )
.await?;

 if outcome.cost_usd != Decimal::ZERO {
 let project = self.store.get_project(&task.project_id).await?;
 let idempotency_key = format!("{}:{}", task.id, task.attempt_count + 1);
 self.store
.record_cost(
 BudgetCategory::Autonomous,
 outcome.cost_usd,
 Some(&project.goal_id),
 Some(&task.project_id),
 Some(&task.id),
 Some(&idempotency_key),
 )
.await?;
 }

 if matches!(new_status, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped) {
 self.evaluate_readiness(&task.project_id).await?;
 }

 let project_completed = self
.maybe_complete_project(&task.project_id, new_status == TaskStatus::Failed && task.project_critical)
.await?;

 Ok(TaskOutcomeApplied {
 new_task_status: new_status,
 project_completed,
 })
 }

 /// Close out the project once either a critical task has failed or
 /// every task has reached a terminal state.
 /// Returns whether the project was transitioned this call.
 async fn maybe_complete_project(&self, project_id: &str, critical_failed: bool) -> AutonomyResult<bool> {
 let project = self.store.get_project(project_id).await?;
 if !matches!(project.status, ProjectStatus::Proposed | ProjectStatus::Active) {
 return Ok(false);
 }

 let tasks = self.store.list_tasks_for_project(project_id).await?;
 let all_terminal = tasks.iter().all(Task::is_terminal);
 if !critical_failed && !all_terminal {
 return Ok(false);
 }

 let status = if critical_failed {
 ProjectStatus::Failed
 } else {
 ProjectStatus::Completed
 };
 let actual_cost_usd = tasks
.iter()
.filter_map(|t| t.actual_cost_usd)
.fold(Decimal::ZERO, |acc, cost| acc + cost);
 let actual_duration_hours = project
.started_at
.map(|started| (Utc::now() - started).num_seconds() as f64 / 3600.0);

 self.store
.complete_project(project_id, status, Some(actual_cost_usd), actual_duration_hours)
.await?;
 Ok(true)
 }
}

fn instantiate_tasks(project_id: &str, goal: &Goal) -> Vec<Task> {
 let template = template_for(goal.goal_type);
 let ids: HashMap<&str, String> = template
.iter()
.map(|step| (step.task_type, uuid::Uuid::new_v4().to_string()))
.collect();
 let now = Utc::now();

 template
.iter()
.map(|step| {
 let depends_on = step.depends_on.iter().map(|dep| ids[dep].clone()).collect();
 let strict_depends_on = step.strict_depends_on.iter().map(|dep| ids[dep].clone()).collect();
 let status = if step.depends_on.is_empty() {
 TaskStatus::Ready
 } else {
 TaskStatus::Pending
 };
 Task {
 id: ids[step.task_type].clone(),
 project_id: project_id.to_string(),
 task_type: step.task_type.to_string(),
 status,
 priority: step.priority,
 depends_on,
 strict_depends_on,
 estimated_cost_usd: step.estimated_cost_usd,
 actual_cost_usd: None,
 payload: Default::default(),
 result: Default::default(),
 attempt_count: 0,
 last_error: None,
 project_critical: step.project_critical,
 created_at: now,
 started_at: None,
 completed_at: None,
 }
 })
.collect()
}

#[cfg(test)]
mod tests {
 use super::*;

 use autonomy_types::{GoalStatus, GoalType};

 fn sample_goal(goal_type: GoalType) -> Goal {
 Goal {
 id: "goal-1".to_string(),
 title: "t".to_string(),
 description: "d".to_string(),
 goal_type,
 status: GoalStatus::Approved,
 base_impact_score: 60.0,
 adjustment_factor: 1.0,
 adjusted_impact_score: 60.0,
 estimated_cost_usd: Decimal::new(1000, 2),
 budget_limit_usd: Decimal::new(5000, 2),
 approved_by: Some("ops".to_string()),
 approved_at: Some(Utc::now()),
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

 #[test]
 fn first_step_is_ready_rest_are_pending() {
 let goal = sample_goal(GoalType::Research);
 let tasks = instantiate_tasks("project-1", &goal);
 assert_eq!(tasks[0].status, TaskStatus::Ready);
 for task in &tasks[1..] {
 assert_eq!(task.status, TaskStatus::Pending);
 }
 }

 #[test]
 fn dependency_ids_resolve_to_real_task_ids() {
 let goal = sample_goal(GoalType::Research);
 let tasks = instantiate_tasks("project-1", &goal);
 let gather = tasks.iter().find(|t| t.task_type == "research_gather").unwrap();
 let synthesize = tasks.iter().find(|t| t.task_type == "research_synthesize").unwrap();
 assert!(synthesize.depends_on.contains(&gather.id));
 assert!(synthesize.strict_depends_on.contains(&gather.id));
 }

 #[tokio::test]
 async fn approving_a_goal_instantiates_its_template_and_is_idempotent() {
 let store = Arc::new(Store::open_in_memory().await.unwrap());
 let mut goal = sample_goal(GoalType::Research);
 goal.status = GoalStatus::Identified;
 goal.approved_by = None;
 goal.approved_at = None;
 store.insert_goal(&goal).await.unwrap();

 let engine = ProjectEngine::new(store.clone());
 let project1 = engine.approve_goal(&goal.id, "ops", None).await.unwrap();
 let tasks1 = store.list_tasks_for_project(&project1.id).await.unwrap();
 assert_eq!(tasks1.len(), 4);

 let project2 = engine.approve_goal(&goal.id, "ops", None).await.unwrap();
 assert_eq!(project1.id, project2.id);
 let tasks2 = store.list_tasks_for_project(&project2.id).await.unwrap();
 assert_eq!(tasks2.len(), 4);
 }

 #[tokio::test]
 async fn completing_all_tasks_completes_the_project() {
 let store = Arc::new(Store::open_in_memory().await.unwrap());
 let mut goal = sample_goal(GoalType::Exploration);
 goal.status = GoalStatus::Identified;
 goal.approved_by = None;
 goal.approved_at = None;
 store.insert_goal(&goal).await.unwrap();

 let engine = ProjectEngine::new(store.clone());
 let project = engine.approve_goal(&goal.id, "ops", None).await.unwrap();
 let tasks = store.list_tasks_for_project(&project.id).await.unwrap();

 let explore = tasks.iter().find(|t| t.task_type == "explore_candidate").unwrap().clone();
 let applied = engine
.apply_task_outcome(
 &explore,
 TaskOutcome {
 status: TaskOutcomeStatus::Completed,
 result: Default::default(),
 cost_usd: Decimal::ZERO,
 error: None,
 },
 3,
 chrono::Duration::seconds(30),
 )
.await
.unwrap();
 assert!(!applied.project_completed);

 let review = store
.list_tasks_for_project(&project.id)
.await
.unwrap()
.into_iter()
.find(|t| t.task_type == "review_commit")
.unwrap();
 assert_eq!(review.status, TaskStatus::Ready);

 let applied = engine
.apply_task_outcome(
 &review,
 TaskOutcome {
 status: TaskOutcomeStatus::Completed,
 result: Default::default(),
 cost_usd: Decimal::ZERO,
 error: None,
 },
 3,
 chrono::Duration::seconds(30),
 )
.await
.unwrap();
 assert!(applied.project_completed);

 let final_project = store.get_project(&project.id).await.unwrap();
 assert_eq!(final_project.status, ProjectStatus::Completed);
 }

 #[tokio::test]
 async fn critical_fatal_failure_fails_the_project_immediately() {
 let store = Arc::new(Store::open_in_memory().await.unwrap());
 let mut goal = sample_goal(GoalType::Research);
 goal.status = GoalStatus::Identified;
 goal.approved_by = None;
 goal.approved_at = None;
 store.insert_goal(&goal).await.unwrap();

 let engine = ProjectEngine::new(store.clone());
 let project = engine.approve_goal(&goal.id, "ops", None).await.unwrap();
 let tasks = store.list_tasks_for_project(&project.id).await.unwrap();
 let gather = tasks.iter().find(|t| t.task_type == "research_gather").unwrap().clone();

 let applied = engine
.apply_task_outcome(
 &gather,
 TaskOutcome {
 status: TaskOutcomeStatus::FailedFatal,
 result: Default::default(),
 cost_usd: Decimal::ZERO,
 error: Some("collaborator rejected the query".to_string()),
 },
 3,
 chrono::Duration::seconds(30),
 )
.await
.unwrap();

 assert!(applied.project_completed);
 let final_project = store.get_project(&project.id).await.unwrap();
 assert_eq!(final_project.status, ProjectStatus::Failed);
 }
}
