use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde_json::{Map, Value};

use autonomy_error::{AutonomyError, AutonomyResult};
use autonomy_types::{Goal, GoalStatus, Project, ProjectStatus};

use crate::convert::{
 decimal_from_sql, decimal_to_sql, dt_from_sql, dt_to_sql, json_from_sql, json_to_sql,
 opt_dt_to_sql, parse_enum,
};
use crate::{internal, Store};

fn row_to_goal(row: &Row) -> rusqlite::Result<Goal> {
 let goal_type: String = row.get("goal_type")?;
 let status: String = row.get("status")?;
 let estimated_cost_usd: String = row.get("estimated_cost_usd")?;
 let budget_limit_usd: String = row.get("budget_limit_usd")?;
 let approved_at: Option<String> = row.get("approved_at")?;
 let baseline_captured_at: Option<String> = row.get("baseline_captured_at")?;
 let outcome_measured_at: Option<String> = row.get("outcome_measured_at")?;
 let metadata: String = row.get("metadata")?;
 let created_at: String = row.get("created_at")?;

 Ok(Goal {
 id: row.get("id")?,
 title: row.get("title")?,
 description: row.get("description")?,
 goal_type: parse_enum(&goal_type, "goal_type").map_err(to_rusqlite_err)?,
 status: parse_enum(&status, "goal_status").map_err(to_rusqlite_err)?,
 base_impact_score: row.get("base_impact_score")?,
 adjustment_factor: row.get("adjustment_factor")?,
 adjusted_impact_score: row.get("adjusted_impact_score")?,
 estimated_cost_usd: decimal_from_sql(&estimated_cost_usd).map_err(to_rusqlite_err)?,
 budget_limit_usd: decimal_from_sql(&budget_limit_usd).map_err(to_rusqlite_err)?,
 approved_by: row.get("approved_by")?,
 approved_at: approved_at
.map(|s| dt_from_sql(&s))
.transpose()
.map_err(to_rusqlite_err)?,
 approval_notes: row.get("approval_notes")?,
 learn_from: row.get::<_, i64>("learn_from")? != 0,
 baseline_captured: row.get::<_, i64>("baseline_captured")? != 0,
 baseline_captured_at: baseline_captured_at
.map(|s| dt_from_sql(&s))
.transpose()
.map_err(to_rusqlite_err)?,
 outcome_measured_at: outcome_measured_at
.map(|s| dt_from_sql(&s))
.transpose()
.map_err(to_rusqlite_err)?,
 effectiveness_score: row.get("effectiveness_score")?,
 metadata: json_from_sql(&metadata).unwrap_or_else(|_| Map::new()),
 created_at: dt_from_sql(&created_at).map_err(to_rusqlite_err)?,
 })
}

fn to_rusqlite_err(err: AutonomyError) -> rusqlite::Error {
 rusqlite::Error::FromSqlConversionFailure(
 0,
 rusqlite::types::Type::Text,
 Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string())),
 )
}

const GOAL_COLUMNS: &str = "id, title, description, goal_type, status, base_impact_score, \
 adjustment_factor, adjusted_impact_score, estimated_cost_usd, budget_limit_usd, \
 approved_by, approved_at, approval_notes, learn_from, baseline_captured, \
 baseline_captured_at, outcome_measured_at, effectiveness_score, metadata, created_at";

impl Store {
 pub async fn insert_goal(&self, goal: &Goal) -> AutonomyResult<()> {
 let conn = self.conn.lock().await;
 conn.execute(
 &format!("INSERT INTO goals ({GOAL_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)"),
 params![
 goal.id,
 goal.title,
 goal.description,
 goal.goal_type.as_str(),
 goal.status.as_str(),
 goal.base_impact_score,
 goal.adjustment_factor,
 goal.adjusted_impact_score,
 decimal_to_sql(goal.estimated_cost_usd),
 decimal_to_sql(goal.budget_limit_usd),
 goal.approved_by,
 opt_dt_to_sql(goal.approved_at),
 goal.approval_notes,
 goal.learn_from as i64,
 goal.baseline_captured as i64,
 opt_dt_to_sql(goal.baseline_captured_at),
 opt_dt_to_sql(goal.outcome_measured_at),
 goal.effectiveness_score,
 json_to_sql(&goal.metadata),
 dt_to_sql(goal.created_at),
 ],
 )
.map_err(|e| internal("inserting goal", e))?;
 Ok(())
 }

 pub async fn get_goal(&self, goal_id: &str) -> AutonomyResult<Goal> {
 let conn = self.conn.lock().await;
 conn.query_row(
 &format!("SELECT {GOAL_COLUMNS} FROM goals WHERE id = ?1"),
 params![goal_id],
 row_to_goal,
 )
.optional()
.map_err(|e| internal("fetching goal", e))?
.ok_or_else(|| AutonomyError::NotFound {
 kind: "goal",
 id: goal_id.to_string(),
 })
 }

 pub async fn list_goals_by_status(&self, status: GoalStatus) -> AutonomyResult<Vec<Goal>> {
 let conn = self.conn.lock().await;
 let mut stmt = conn
.prepare(&format!(
 "SELECT {GOAL_COLUMNS} FROM goals WHERE status = ?1 ORDER BY adjusted_impact_score DESC, created_at ASC"
 ))
.map_err(|e| internal("preparing goal query", e))?;
 let rows = stmt
.query_map(params![status.as_str()], row_to_goal)
.map_err(|e| internal("listing goals", e))?;
 rows.collect::<Result<Vec<_>, _>>()
.map_err(|e| internal("reading goal rows", e))
 }

 pub async fn list_goals(&self) -> AutonomyResult<Vec<Goal>> {
 let conn = self.conn.lock().await;
 let mut stmt = conn
.prepare(&format!("SELECT {GOAL_COLUMNS} FROM goals ORDER BY created_at DESC"))
.map_err(|e| internal("preparing goal query", e))?;
 let rows = stmt
.query_map([], row_to_goal)
.map_err(|e| internal("listing goals", e))?;
 rows.collect::<Result<Vec<_>, _>>()
.map_err(|e| internal("reading goal rows", e))
 }

 /// Approve a goal and create its project in one transaction. Idempotent:
 /// calling this twice on an already-approved goal returns the existing
 /// project rather than erroring.
 pub async fn transition_goal_approved(
 &self,
 goal_id: &str,
 approver: &str,
 notes: Option<&str>,
 ) -> AutonomyResult<Project> {
 let mut conn = self.conn.lock().await;
 let tx = conn
.transaction()
.map_err(|e| internal("starting approval transaction", e))?;

 let (status, goal_type): (String, String) = tx
.query_row(
 "SELECT status, goal_type FROM goals WHERE id = ?1",
 params![goal_id],
 |row| Ok((row.get(0)?, row.get(1)?)),
 )
.optional()
.map_err(|e| internal("fetching goal for approval", e))?
.ok_or_else(|| AutonomyError::NotFound {
 kind: "goal",
 id: goal_id.to_string(),
 })?;
 let _ = goal_type;

 if status == GoalStatus::Approved.as_str() {
 let existing: Option<String> = tx
.query_row(
 "SELECT id FROM projects WHERE goal_id = ?1",
 params![goal_id],
 |row| row.get(0),
 )
.optional()
.map_err(|e| internal("fetching existing project", e))?;
 if let Some(project_id) = existing {
 let project = read_project(&tx, &project_id)?;
 tx.commit().map_err(|e| internal("committing no-op approval", e))?;
 return Ok(project);
 }
 }

 if status != GoalStatus::Identified.as_str() {
 return Err(AutonomyError::InvalidState(format!(
 "goal {goal_id} is {status}, cannot be approved"
 )));
 }

 let now = Utc::now();
 tx.execute(
 "UPDATE goals SET status = ?1, approved_by = ?2, approved_at = ?3, approval_notes = ?4 WHERE id = ?5",
 params![
 GoalStatus::Approved.as_str(),
 approver,
 dt_to_sql(now),
 notes,
 goal_id
 ],
 )
.map_err(|e| internal("marking goal approved", e))?;

 let budget_limit_usd: String = tx
.query_row(
 "SELECT budget_limit_usd FROM goals WHERE id = ?1",
 params![goal_id],
 |row| row.get(0),
 )
.map_err(|e| internal("reading goal budget", e))?;

 let project_id = uuid::Uuid::new_v4().to_string();
 tx.execute(
 "INSERT INTO projects (id, goal_id, status, allocated_budget_usd, spent_budget_usd, actual_cost_usd, actual_duration_hours, created_at, started_at, completed_at)
 VALUES (?1, ?2, ?3, ?4, '0', NULL, NULL, ?5, NULL, NULL)",
 params![
 project_id,
 goal_id,
 ProjectStatus::Proposed.as_str(),
 budget_limit_usd,
 dt_to_sql(now),
 ],
 )
.map_err(|e| internal("inserting project", e))?;

 let project = read_project(&tx, &project_id)?;
 tx.commit().map_err(|e| internal("committing approval", e))?;
 Ok(project)
 }

 pub async fn reject_goal(&self, goal_id: &str, approver: &str, notes: Option<&str>) -> AutonomyResult<()> {
 let conn = self.conn.lock().await;
 let status: Option<String> = conn
.query_row("SELECT status FROM goals WHERE id = ?1", params![goal_id], |row| row.get(0))
.optional()
.map_err(|e| internal("fetching goal for rejection", e))?;
 let status = status.ok_or_else(|| AutonomyError::NotFound {
 kind: "goal",
 id: goal_id.to_string(),
 })?;

 if status != GoalStatus::Identified.as_str() {
 return Err(AutonomyError::InvalidState(format!(
 "goal {goal_id} is {status}, cannot be rejected"
 )));
 }

 conn.execute(
 "UPDATE goals SET status = ?1, approved_by = ?2, approved_at = ?3, approval_notes = ?4 WHERE id = ?5",
 params![
 GoalStatus::Rejected.as_str(),
 approver,
 dt_to_sql(Utc::now()),
 notes,
 goal_id
 ],
 )
.map_err(|e| internal("rejecting goal", e))?;
 Ok(())
 }

 pub async fn mark_goal_terminal(&self, goal_id: &str, status: GoalStatus) -> AutonomyResult<()> {
 let conn = self.conn.lock().await;
 conn.execute(
 "UPDATE goals SET status = ?1 WHERE id = ?2",
 params![status.as_str(), goal_id],
 )
.map_err(|e| internal("updating goal status", e))?;
 Ok(())
 }

 pub async fn set_goal_baseline_captured(&self, goal_id: &str) -> AutonomyResult<()> {
 let conn = self.conn.lock().await;
 conn.execute(
 "UPDATE goals SET baseline_captured = 1, baseline_captured_at = ?1 WHERE id = ?2",
 params![dt_to_sql(Utc::now()), goal_id],
 )
.map_err(|e| internal("marking baseline captured", e))?;
 Ok(())
 }

 pub async fn set_goal_outcome(
 &self,
 goal_id: &str,
 measured_at: chrono::DateTime<Utc>,
 effectiveness_score: f64,
 ) -> AutonomyResult<()> {
 let conn = self.conn.lock().await;
 conn.execute(
 "UPDATE goals SET outcome_measured_at = ?1, effectiveness_score = ?2 WHERE id = ?3",
 params![dt_to_sql(measured_at), effectiveness_score, goal_id],
 )
.map_err(|e| internal("recording goal outcome", e))?;
 Ok(())
 }
}

fn read_project(tx: &rusqlite::Transaction<'_>, project_id: &str) -> AutonomyResult<Project> {
 tx.query_row(
 "SELECT id, goal_id, status, allocated_budget_usd, spent_budget_usd, actual_cost_usd, actual_duration_hours, created_at, started_at, completed_at
 FROM projects WHERE id = ?1",
 params![project_id],
 row_to_project,
 )
.map_err(|e| internal("reading project after approval", e))
}

pub(crate) fn row_to_project(row: &Row) -> rusqlite::Result<Project> {
 let status: String = row.get("status")?;
 let allocated_budget_usd: String = row.get("allocated_budget_usd")?;
 let spent_budget_usd: String = row.get("spent_budget_usd")?;
 let actual_cost_usd: Option<String> = row.get("actual_cost_usd")?;
 let created_at: String = row.get("created_at")?;
 let started_at: Option<String> = row.get("started_at")?;
 let completed_at: Option<String> = row.get("completed_at")?;

 Ok(Project {
 id: row.get("id")?,
 goal_id: row.get("goal_id")?,
 status: parse_enum(&status, "project_status").map_err(to_rusqlite_err)?,
 allocated_budget_usd: decimal_from_sql(&allocated_budget_usd).map_err(to_rusqlite_err)?,
 spent_budget_usd: decimal_from_sql(&spent_budget_usd).map_err(to_rusqlite_err)?,
 actual_cost_usd: actual_cost_usd
.map(|s| decimal_from_sql(&s))
.transpose()
.map_err(to_rusqlite_err)?,
 actual_duration_hours: row.get("actual_duration_hours")?,
 created_at: dt_from_sql(&created_at).map_err(to_rusqlite_err)?,
 started_at: started_at
.map(|s| dt_from_sql(&s))
.transpose()
.map_err(to_rusqlite_err)?,
 completed_at: completed_at
.map(|s| dt_from_sql(&s))
.transpose()
.map_err(to_rusqlite_err)?,
 })
}
