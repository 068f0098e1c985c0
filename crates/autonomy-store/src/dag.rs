use std::collections::{HashMap, HashSet, VecDeque};

use autonomy_error::{AutonomyError, AutonomyResult};
use autonomy_types::Task;

/// Validate that a set of tasks forms a DAG within one project: no
/// self-deps, no references outside the project, no cycles. Uses Kahn's
/// algorithm — if any node remains unvisited after topological emptying,
/// the graph has a cycle.
pub fn validate_dependencies(tasks: &[Task]) -> AutonomyResult<()> {
 let ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();

 for task in tasks {
 for dep in task.depends_on.iter().chain(task.strict_depends_on.iter()) {
 if dep == &task.id {
 return Err(AutonomyError::DependencyCycle);
 }
 if !ids.contains(dep.as_str()) {
 return Err(AutonomyError::InvalidState(format!(
 "task {} depends on {dep}, which is not in this project",
 task.id
 )));
 }
 }
 }

 let mut in_degree: HashMap<&str, usize> = tasks.iter().map(|t| (t.id.as_str(), 0)).collect();
 let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();

 for task in tasks {
 let mut deps: HashSet<&str> = task.depends_on.iter().map(|s| s.as_str()).collect();
 deps.extend(task.strict_depends_on.iter().map(|s| s.as_str()));
 for dep in deps {
 edges.entry(dep).or_default().push(task.id.as_str());
 *in_degree.get_mut(task.id.as_str()).unwrap() += 1;
 }
 }

 let mut queue: VecDeque<&str> = in_degree
.iter()
.filter(|(_, &deg)| deg == 0)
.map(|(id, _)| *id)
.collect();

 let mut visited = 0usize;
 while let Some(node) = queue.pop_front() {
 visited += 1;
 if let Some(children) = edges.get(node) {
 for child in children {
 let deg = in_degree.get_mut(child).unwrap();
 *deg -= 1;
 if *deg == 0 {
 queue.push_back(child);
 }
 }
 }
 }

 if visited != tasks.len() {
 return Err(AutonomyError::DependencyCycle);
 }

 Ok(())
}

#[cfg(test)]
mod tests {
 use super::*;
 use autonomy_types::{Task, TaskPriority, TaskStatus};
 use chrono::Utc;
 use rust_decimal::Decimal;
 use std::collections::BTreeSet;

 fn task(id: &str, deps: &[&str]) -> Task {
 Task {
 id: id.to_string(),
 project_id: "p1".to_string(),
 task_type: "research_gather".to_string(),
 status: TaskStatus::Pending,
 priority: TaskPriority::Medium,
 depends_on: deps.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
 strict_depends_on: BTreeSet::new(),
 estimated_cost_usd: Decimal::ZERO,
 actual_cost_usd: None,
 payload: Default::default(),
 result: Default::default(),
 attempt_count: 0,
 last_error: None,
 project_critical: false,
 created_at: Utc::now(),
 started_at: None,
 completed_at: None,
 }
 }

 #[test]
 fn linear_chain_is_valid() {
 let tasks = vec![
 task("t1", &[]),
 task("t2", &["t1"]),
 task("t3", &["t2"]),
 task("t4", &["t3"]),
 ];
 assert!(validate_dependencies(&tasks).is_ok());
 }

 #[test]
 fn self_dependency_is_rejected() {
 let tasks = vec![task("t1", &["t1"])];
 assert!(matches!(
 validate_dependencies(&tasks),
 Err(AutonomyError::DependencyCycle)
 ));
 }

 #[test]
 fn cycle_is_rejected() {
 let tasks = vec![task("t1", &["t2"]), task("t2", &["t1"])];
 assert!(matches!(
 validate_dependencies(&tasks),
 Err(AutonomyError::DependencyCycle)
 ));
 }

 #[test]
 fn dependency_outside_project_is_rejected() {
 let tasks = vec![task("t1", &["ghost"])];
 assert!(matches!(
 validate_dependencies(&tasks),
 Err(AutonomyError::InvalidState(_))
 ));
 }
}
