use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde_json::Map;

use autonomy_error::{AutonomyError, AutonomyResult};
use autonomy_types::{Task, TaskPriority, TaskStatus};

use crate::convert::{
 decimal_from_sql, decimal_to_sql, dt_from_sql, dt_to_sql, json_from_sql, json_to_sql,
 opt_decimal_to_sql, opt_dt_to_sql, parse_enum, str_set_from_sql, str_set_to_sql,
};
use crate::{internal, Store};

const TASK_COLUMNS: &str = "id, project_id, task_type, status, priority, depends_on, \
 strict_depends_on, estimated_cost_usd, actual_cost_usd, payload, result, attempt_count, \
 last_error, project_critical, created_at, started_at, completed_at, retry_not_before";

fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
 let status: String = row.get("status")?;
 let priority: String = row.get("priority")?;
 let depends_on: String = row.get("depends_on")?;
 let strict_depends_on: String = row.get("strict_depends_on")?;
 let estimated_cost_usd: String = row.get("estimated_cost_usd")?;
 let actual_cost_usd: Option<String> = row.get("actual_cost_usd")?;
 let payload: String = row.get("payload")?;
 let result: String = row.get("result")?;
 let created_at: String = row.get("created_at")?;
 let started_at: Option<String> = row.get("started_at")?;
 let completed_at: Option<String> = row.get("completed_at")?;
 let retry_not_before: Option<String> = row.get("retry_not_before")?;

 Ok(Task {
 id: row.get("id")?,
 project_id: row.get("project_id")?,
 task_type: row.get("task_type")?,
 status: parse_enum::<TaskStatus>(&status, "task_status").map_err(to_rusqlite_err)?,
 priority: parse_enum::<TaskPriority>(&priority, "task_priority").map_err(to_rusqlite_err)?,
 depends_on: str_set_from_sql(&depends_on),
 strict_depends_on: str_set_from_sql(&strict_depends_on),
 estimated_cost_usd: decimal_from_sql(&estimated_cost_usd).map_err(to_rusqlite_err)?,
 actual_cost_usd: actual_cost_usd
.map(|s| decimal_from_sql(&s))
.transpose()
.map_err(to_rusqlite_err)?,
 payload: json_from_sql(&payload).unwrap_or_else(|_| Map::new()),
 result: json_from_sql(&result).unwrap_or_else(|_| Map::new()),
 attempt_count: row.get::<_, i64>("attempt_count")? as u32,
 last_error: row.get("last_error")?,
 project_critical: row.get::<_, i64>("project_critical")? != 0,
 created_at: dt_from_sql(&created_at).map_err(to_rusqlite_err)?,
 started_at: started_at
.map(|s| dt_from_sql(&s))
.transpose()
.map_err(to_rusqlite_err)?,
 completed_at: completed_at
.map(|s| dt_from_sql(&s))
.transpose()
.map_err(to_rusqlite_err)?,
 retry_not_before: retry_not_before
.map(|s| dt_from_sql(&s))
.transpose()
.map_err(to_rusqlite_err)?,
 })
}

fn to_rusqlite_err(err: AutonomyError) -> rusqlite::Error {
 rusqlite::Error::FromSqlConversionFailure(
 0,
 rusqlite::types::Type::Text,
 Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string())),
 )
}

impl Store {
 /// Validate and insert a project's full task set in one transaction.
 /// Rejects the whole batch if the dependency graph has a cycle so a project never ends up with a partially-inserted DAG.
 pub async fn insert_tasks(&self, tasks: &[Task]) -> AutonomyResult<()> {
 crate::validate_dependencies(tasks)?;

 let mut conn = self.conn.lock().await;
 let tx = conn
.transaction()
.map_err(|e| internal("starting task insert transaction", e))?;

 for task in tasks {
 tx.execute(
 &format!("INSERT INTO tasks ({TASK_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)"),
 params![
 task.id,
 task.project_id,
 task.task_type,
 task.status.as_str(),
 task.priority.as_str(),
 str_set_to_sql(&task.depends_on),
 str_set_to_sql(&task.strict_depends_on),
 decimal_to_sql(task.estimated_cost_usd),
 opt_decimal_to_sql(task.actual_cost_usd),
 json_to_sql(&task.payload),
 json_to_sql(&task.result),
 task.attempt_count as i64,
 task.last_error,
 task.project_critical as i64,
 dt_to_sql(task.created_at),
 opt_dt_to_sql(task.started_at),
 opt_dt_to_sql(task.completed_at),
 opt_dt_to_sql(task.retry_not_before),
 ],
 )
.map_err(|e| internal("inserting task", e))?;
 }

 tx.commit().map_err(|e| internal("committing task insert", e))?;
 Ok(())
 }

 pub async fn get_task(&self, task_id: &str) -> AutonomyResult<Task> {
 let conn = self.conn.lock().await;
 conn.query_row(
 &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
 params![task_id],
 row_to_task,
 )
.optional()
.map_err(|e| internal("fetching task", e))?
.ok_or_else(|| AutonomyError::NotFound {
 kind: "task",
 id: task_id.to_string(),
 })
 }

 pub async fn list_tasks_for_project(&self, project_id: &str) -> AutonomyResult<Vec<Task>> {
 let conn = self.conn.lock().await;
 let mut stmt = conn
.prepare(&format!(
 "SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = ?1 ORDER BY created_at ASC"
 ))
.map_err(|e| internal("preparing task query", e))?;
 let rows = stmt
.query_map(params![project_id], row_to_task)
.map_err(|e| internal("listing tasks", e))?;
 rows.collect::<Result<Vec<_>, _>>()
.map_err(|e| internal("reading task rows", e))
 }

 /// Tasks in a project that are not yet terminal, ordered by the strict
 /// priority order dispatch requires: Critical before High before Medium
 /// before Low, then FIFO by creation time.
 pub async fn list_dispatchable_tasks(&self, project_id: &str) -> AutonomyResult<Vec<Task>> {
 let conn = self.conn.lock().await;
 let mut stmt = conn
.prepare(&format!(
 "SELECT {TASK_COLUMNS} FROM tasks \
 WHERE project_id = ?1 AND status IN ('pending', 'ready') \
 AND (retry_not_before IS NULL OR retry_not_before <= ?2) \
 ORDER BY CASE priority \
 WHEN 'critical' THEN 0 \
 WHEN 'high' THEN 1 \
 WHEN 'medium' THEN 2 \
 ELSE 3 \
 END, created_at ASC"
 ))
.map_err(|e| internal("preparing dispatch query", e))?;
 let rows = stmt
.query_map(params![project_id, dt_to_sql(Utc::now())], row_to_task)
.map_err(|e| internal("listing dispatchable tasks", e))?;
 rows.collect::<Result<Vec<_>, _>>()
.map_err(|e| internal("reading dispatchable task rows", e))
 }

 pub async fn mark_task_status(&self, task_id: &str, status: TaskStatus) -> AutonomyResult<()> {
 let conn = self.conn.lock().await;
 let (started_at, completed_at) = match status {
 TaskStatus::Running => (Some(dt_to_sql(Utc::now())), None),
 TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped => {
 (None, Some(dt_to_sql(Utc::now())))
 }
 _ => (None, None),
 };
 conn.execute(
 "UPDATE tasks SET status = ?1, \
 started_at = COALESCE(?2, started_at), \
 completed_at = COALESCE(?3, completed_at) \
 WHERE id = ?4",
 params![status.as_str(), started_at, completed_at, task_id],
 )
.map_err(|e| internal("updating task status", e))?;
 Ok(())
 }

 /// Apply a collaborator's reported outcome to a task: bump attempt
 /// count, record cost/result/error, and transition status. Does not
 /// itself debit the project budget — callers combine this with
 /// `record_cost` inside the executor's retry loop.
 /// `retry_not_before` is set when the executor sends a retryable
 /// failure back to `ready` with a backoff delay, and cleared on every
 /// other transition.
 pub async fn record_task_attempt(
 &self,
 task_id: &str,
 status: TaskStatus,
 result: &Map<String, serde_json::Value>,
 actual_cost_usd: Option<rust_decimal::Decimal>,
 last_error: Option<&str>,
 retry_not_before: Option<chrono::DateTime<Utc>>,
 ) -> AutonomyResult<()> {
 let conn = self.conn.lock().await;
 let is_terminal = matches!(
 status,
 TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
 );
 conn.execute(
 "UPDATE tasks SET status = ?1, result = ?2, actual_cost_usd = COALESCE(?3, actual_cost_usd), \
 attempt_count = attempt_count + 1, last_error = ?4, \
 completed_at = CASE WHEN ?5 THEN ?6 ELSE completed_at END, \
 retry_not_before = ?7 \
 WHERE id = ?8",
 params![
 status.as_str(),
 json_to_sql(result),
 opt_decimal_to_sql(actual_cost_usd),
 last_error,
 is_terminal as i64,
 dt_to_sql(Utc::now()),
 opt_dt_to_sql(retry_not_before),
 task_id,
 ],
 )
.map_err(|e| internal("recording task attempt", e))?;
 Ok(())
 }
}
