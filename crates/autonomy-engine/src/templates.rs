//! Fixed per-`GoalType` task templates: each goal type expands into a
//! small DAG of typed tasks wired up by `depends_on`/`strict_depends_on`.
//! The research chain mirrors the lab's actual research-to-commit workflow;
//! the other templates extend the same shape to the lab's remaining goal
//! types.

use rust_decimal::Decimal;

use autonomy_types::{GoalType, TaskPriority};

/// One task in a template, referencing its dependencies by the `task_type`
/// of earlier steps in the same template (template authors never collide
/// across goal types since a project only ever instantiates one template).
pub struct TemplateStep {
 pub task_type: &'static str,
 pub priority: TaskPriority,
 pub depends_on: &'static [&'static str],
 pub strict_depends_on: &'static [&'static str],
 pub project_critical: bool,
 pub estimated_cost_usd: Decimal,
}

pub fn template_for(goal_type: GoalType) -> &'static [TemplateStep] {
 match goal_type {
 GoalType::Research => &RESEARCH_TEMPLATE,
 GoalType::Improvement => &IMPROVEMENT_TEMPLATE,
 GoalType::Optimization => &OPTIMIZATION_TEMPLATE,
 GoalType::Learning => &LEARNING_TEMPLATE,
 GoalType::Exploration => &EXPLORATION_TEMPLATE,
 }
}

const RESEARCH_TEMPLATE: [TemplateStep; 4] = [
 TemplateStep {
 task_type: "research_gather",
 priority: TaskPriority::Medium,
 depends_on: &[],
 strict_depends_on: &[],
 project_critical: true,
 estimated_cost_usd: Decimal::from_parts(200, 0, 0, false, 2),
 },
 TemplateStep {
 task_type: "research_synthesize",
 priority: TaskPriority::Medium,
 depends_on: &["research_gather"],
 strict_depends_on: &["research_gather"],
 project_critical: true,
 estimated_cost_usd: Decimal::from_parts(150, 0, 0, false, 2),
 },
 TemplateStep {
 task_type: "kb_create",
 priority: TaskPriority::Medium,
 depends_on: &["research_synthesize"],
 strict_depends_on: &[],
 project_critical: true,
 estimated_cost_usd: Decimal::from_parts(0, 0, 0, false, 0),
 },
 TemplateStep {
 task_type: "review_commit",
 priority: TaskPriority::Low,
 depends_on: &["kb_create"],
 strict_depends_on: &["kb_create"],
 project_critical: true,
 estimated_cost_usd: Decimal::from_parts(0, 0, 0, false, 0),
 },
];

const IMPROVEMENT_TEMPLATE: [TemplateStep; 4] = [
 TemplateStep {
 task_type: "diagnose_failure_pattern",
 priority: TaskPriority::High,
 depends_on: &[],
 strict_depends_on: &[],
 project_critical: true,
 estimated_cost_usd: Decimal::from_parts(100, 0, 0, false, 2),
 },
 TemplateStep {
 task_type: "implement_mitigation",
 priority: TaskPriority::High,
 depends_on: &["diagnose_failure_pattern"],
 strict_depends_on: &["diagnose_failure_pattern"],
 project_critical: true,
 estimated_cost_usd: Decimal::from_parts(300, 0, 0, false, 2),
 },
 TemplateStep {
 task_type: "validate_print",
 priority: TaskPriority::High,
 depends_on: &["implement_mitigation"],
 strict_depends_on: &["implement_mitigation"],
 project_critical: true,
 estimated_cost_usd: Decimal::from_parts(500, 0, 0, false, 2),
 },
 TemplateStep {
 task_type: "review_commit",
 priority: TaskPriority::Low,
 depends_on: &["validate_print"],
 strict_depends_on: &[],
 project_critical: false,
 estimated_cost_usd: Decimal::from_parts(0, 0, 0, false, 0),
 },
];

const OPTIMIZATION_TEMPLATE: [TemplateStep; 3] = [
 TemplateStep {
 task_type: "analyze_spend_mix",
 priority: TaskPriority::Medium,
 depends_on: &[],
 strict_depends_on: &[],
 project_critical: true,
 estimated_cost_usd: Decimal::from_parts(50, 0, 0, false, 2),
 },
 TemplateStep {
 task_type: "apply_routing_rule",
 priority: TaskPriority::Medium,
 depends_on: &["analyze_spend_mix"],
 strict_depends_on: &["analyze_spend_mix"],
 project_critical: true,
 estimated_cost_usd: Decimal::from_parts(0, 0, 0, false, 0),
 },
 TemplateStep {
 task_type: "review_commit",
 priority: TaskPriority::Low,
 depends_on: &["apply_routing_rule"],
 strict_depends_on: &[],
 project_critical: false,
 estimated_cost_usd: Decimal::from_parts(0, 0, 0, false, 0),
 },
];

const LEARNING_TEMPLATE: [TemplateStep; 2] = [
 TemplateStep {
 task_type: "gather_training_examples",
 priority: TaskPriority::Low,
 depends_on: &[],
 strict_depends_on: &[],
 project_critical: true,
 estimated_cost_usd: Decimal::from_parts(75, 0, 0, false, 2),
 },
 TemplateStep {
 task_type: "review_commit",
 priority: TaskPriority::Low,
 depends_on: &["gather_training_examples"],
 strict_depends_on: &[],
 project_critical: false,
 estimated_cost_usd: Decimal::from_parts(0, 0, 0, false, 0),
 },
];

const EXPLORATION_TEMPLATE: [TemplateStep; 2] = [
 TemplateStep {
 task_type: "explore_candidate",
 priority: TaskPriority::Low,
 depends_on: &[],
 strict_depends_on: &[],
 project_critical: false,
 estimated_cost_usd: Decimal::from_parts(25, 0, 0, false, 2),
 },
 TemplateStep {
 task_type: "review_commit",
 priority: TaskPriority::Low,
 depends_on: &["explore_candidate"],
 strict_depends_on: &[],
 project_critical: false,
 estimated_cost_usd: Decimal::from_parts(0, 0, 0, false, 0),
 },
];

#[cfg(test)]
mod tests {
 use super::*;

 #[test]
 fn every_goal_type_has_a_template() {
 for goal_type in [
 GoalType::Research,
 GoalType::Improvement,
 GoalType::Optimization,
 GoalType::Learning,
 GoalType::Exploration,
 ] {
 assert!(!template_for(goal_type).is_empty());
 }
 }

 #[test]
 fn research_template_matches_the_documented_chain() {
 let steps: Vec<&str> = RESEARCH_TEMPLATE.iter().map(|s| s.task_type).collect();
 assert_eq!(
 steps,
 vec!["research_gather", "research_synthesize", "kb_create", "review_commit"]
 );
 }

 #[test]
 fn every_step_except_the_first_depends_on_something() {
 for goal_type in [
 GoalType::Research,
 GoalType::Improvement,
 GoalType::Optimization,
 GoalType::Learning,
 GoalType::Exploration,
 ] {
 let template = template_for(goal_type);
 for step in &template[1..] {
 assert!(!step.depends_on.is_empty());
 }
 }
 }
}
