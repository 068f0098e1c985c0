use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use autonomy_error::{AutonomyError, AutonomyResult};
use autonomy_types::{GoalStatus, Project, ProjectStatus};

use crate::convert::{decimal_to_sql, dt_to_sql, opt_decimal_to_sql};
use crate::goals::row_to_project;
use crate::{internal, Store};

const PROJECT_COLUMNS: &str = "id, goal_id, status, allocated_budget_usd, spent_budget_usd, \
 actual_cost_usd, actual_duration_hours, created_at, started_at, completed_at";

impl Store {
 pub async fn get_project(&self, project_id: &str) -> AutonomyResult<Project> {
 let conn = self.conn.lock().await;
 conn.query_row(
 &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
 params![project_id],
 row_to_project,
 )
.optional()
.map_err(|e| internal("fetching project", e))?
.ok_or_else(|| AutonomyError::NotFound {
 kind: "project",
 id: project_id.to_string(),
 })
 }

 pub async fn get_project_by_goal(&self, goal_id: &str) -> AutonomyResult<Option<Project>> {
 let conn = self.conn.lock().await;
 conn.query_row(
 &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE goal_id = ?1"),
 params![goal_id],
 row_to_project,
 )
.optional()
.map_err(|e| internal("fetching project by goal", e))
 }

 pub async fn list_projects_by_status(&self, status: ProjectStatus) -> AutonomyResult<Vec<Project>> {
 let conn = self.conn.lock().await;
 let mut stmt = conn
.prepare(&format!(
 "SELECT {PROJECT_COLUMNS} FROM projects WHERE status = ?1 ORDER BY created_at ASC"
 ))
.map_err(|e| internal("preparing project query", e))?;
 let rows = stmt
.query_map(params![status.as_str()], row_to_project)
.map_err(|e| internal("listing projects", e))?;
 rows.collect::<Result<Vec<_>, _>>()
.map_err(|e| internal("reading project rows", e))
 }

 pub async fn mark_project_active(&self, project_id: &str) -> AutonomyResult<()> {
 let conn = self.conn.lock().await;
 conn.execute(
 "UPDATE projects SET status = ?1, started_at = COALESCE(started_at, ?2) WHERE id = ?3",
 params![ProjectStatus::Active.as_str(), dt_to_sql(Utc::now()), project_id],
 )
.map_err(|e| internal("marking project active", e))?;
 Ok(())
 }

 /// Close out a project and its goal in one transaction: the terminal
 /// project status and the goal status move together, since a project's
 /// terminal status determines its goal's terminal status.
 pub async fn complete_project(
 &self,
 project_id: &str,
 status: ProjectStatus,
 actual_cost_usd: Option<rust_decimal::Decimal>,
 actual_duration_hours: Option<f64>,
 ) -> AutonomyResult<()> {
 if !matches!(
 status,
 ProjectStatus::Completed | ProjectStatus::Cancelled | ProjectStatus::Failed
 ) {
 return Err(AutonomyError::InvalidState(format!(
 "{status:?} is not a terminal project status"
 )));
 }

 let mut conn = self.conn.lock().await;
 let tx = conn
.transaction()
.map_err(|e| internal("starting completion transaction", e))?;

 let goal_id: String = tx
.query_row(
 "SELECT goal_id FROM projects WHERE id = ?1",
 params![project_id],
 |row| row.get(0),
 )
.optional()
.map_err(|e| internal("fetching project for completion", e))?
.ok_or_else(|| AutonomyError::NotFound {
 kind: "project",
 id: project_id.to_string(),
 })?;

 tx.execute(
 "UPDATE projects SET status = ?1, actual_cost_usd = ?2, actual_duration_hours = ?3, completed_at = ?4 WHERE id = ?5",
 params![
 status.as_str(),
 opt_decimal_to_sql(actual_cost_usd),
 actual_duration_hours,
 dt_to_sql(Utc::now()),
 project_id,
 ],
 )
.map_err(|e| internal("completing project", e))?;

 let goal_status = match status {
 ProjectStatus::Completed => GoalStatus::Completed,
 ProjectStatus::Cancelled | ProjectStatus::Failed => GoalStatus::Failed,
 _ => unreachable!(),
 };
 tx.execute(
 "UPDATE goals SET status = ?1 WHERE id = ?2",
 params![goal_status.as_str(), goal_id],
 )
.map_err(|e| internal("updating goal on project completion", e))?;

 tx.commit().map_err(|e| internal("committing project completion", e))?;
 Ok(())
 }

 /// Debit `additional` from a project's remaining budget headroom,
 /// rejecting the call instead of allowing `spent_budget_usd` to exceed
 /// `allocated_budget_usd`.
 pub(crate) async fn debit_project_budget(
 &self,
 tx: &rusqlite::Transaction<'_>,
 project_id: &str,
 additional: rust_decimal::Decimal,
 ) -> AutonomyResult<()> {
 let (allocated, spent): (String, String) = tx
.query_row(
 "SELECT allocated_budget_usd, spent_budget_usd FROM projects WHERE id = ?1",
 params![project_id],
 |row| Ok((row.get(0)?, row.get(1)?)),
 )
.optional()
.map_err(|e| internal("fetching project budget", e))?
.ok_or_else(|| AutonomyError::NotFound {
 kind: "project",
 id: project_id.to_string(),
 })?;

 let allocated: rust_decimal::Decimal = crate::convert::decimal_from_sql(&allocated)?;
 let spent: rust_decimal::Decimal = crate::convert::decimal_from_sql(&spent)?;
 let new_spent = spent + additional;
 if new_spent > allocated {
 return Err(AutonomyError::BudgetExceeded);
 }

 tx.execute(
 "UPDATE projects SET spent_budget_usd = ?1 WHERE id = ?2",
 params![decimal_to_sql(new_spent), project_id],
 )
.map_err(|e| internal("updating project spend", e))?;
 Ok(())
 }
}
