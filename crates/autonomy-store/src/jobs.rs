use rusqlite::{params, OptionalExtension, Row};

use autonomy_error::{AutonomyError, AutonomyResult};
use autonomy_types::{JobRunStatus, ScheduledJob, Trigger, WorkloadClass};

use crate::convert::{dt_from_sql, opt_dt_from_sql, opt_dt_to_sql, parse_enum};
use crate::{internal, Store};

const JOB_COLUMNS: &str = "id, handler_name, trigger_kind, trigger_expr, timezone, enabled, \
 workload_class, next_run_at, last_run_at, last_status, last_skip_reason";

fn row_to_job(row: &Row) -> rusqlite::Result<ScheduledJob> {
 let trigger_kind: String = row.get("trigger_kind")?;
 let trigger_expr: String = row.get("trigger_expr")?;
 let workload_class: String = row.get("workload_class")?;
 let next_run_at: Option<String> = row.get("next_run_at")?;
 let last_run_at: Option<String> = row.get("last_run_at")?;
 let last_status: Option<String> = row.get("last_status")?;

 let trigger = match trigger_kind.as_str() {
 "cron" => Trigger::Cron { expression: trigger_expr },
 "interval" => Trigger::Interval {
 period_seconds: trigger_expr.parse().map_err(to_rusqlite_err_str)?,
 },
 other => {
 return Err(to_rusqlite_err_str(format!("unknown trigger kind {other:?}")));
 }
 };

 Ok(ScheduledJob {
 id: row.get("id")?,
 handler_name: row.get("handler_name")?,
 trigger,
 timezone: row.get("timezone")?,
 enabled: row.get::<_, i64>("enabled")? != 0,
 workload_class: parse_enum::<WorkloadClass>(&workload_class, "workload_class")
.map_err(to_rusqlite_err)?,
 next_run_at: opt_dt_from_sql(next_run_at).map_err(to_rusqlite_err)?,
 last_run_at: opt_dt_from_sql(last_run_at).map_err(to_rusqlite_err)?,
 last_status: last_status
.map(|s| parse_enum::<JobRunStatus>(&s, "job_run_status"))
.transpose()
.map_err(to_rusqlite_err)?,
 last_skip_reason: row.get("last_skip_reason")?,
 })
}

fn to_rusqlite_err(err: AutonomyError) -> rusqlite::Error {
 to_rusqlite_err_str(err.to_string())
}

fn to_rusqlite_err_str(msg: impl std::fmt::Display) -> rusqlite::Error {
 rusqlite::Error::FromSqlConversionFailure(
 0,
 rusqlite::types::Type::Text,
 Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, msg.to_string())),
 )
}

impl Store {
 /// Reconcile a handler's durable definition against what the scheduler
 /// loads from its own code at startup, preserving `next_run_at` /
 /// `last_run_at` history across restarts.
 pub async fn upsert_job_definition(
 &self,
 handler_name: &str,
 trigger: &Trigger,
 timezone: &str,
 workload_class: WorkloadClass,
 enabled: bool,
 ) -> AutonomyResult<()> {
 let conn = self.conn.lock().await;
 let (trigger_kind, trigger_expr) = match trigger {
 Trigger::Cron { expression } => ("cron", expression.clone()),
 Trigger::Interval { period_seconds } => ("interval", period_seconds.to_string()),
 };
 let id = uuid::Uuid::new_v4().to_string();
 conn.execute(
 "INSERT INTO scheduled_jobs (id, handler_name, trigger_kind, trigger_expr, timezone, enabled, workload_class)
 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
 ON CONFLICT(handler_name) DO UPDATE SET
 trigger_kind = excluded.trigger_kind,
 trigger_expr = excluded.trigger_expr,
 timezone = excluded.timezone,
 enabled = excluded.enabled,
 workload_class = excluded.workload_class",
 params![
 id,
 handler_name,
 trigger_kind,
 trigger_expr,
 timezone,
 enabled as i64,
 workload_class.as_str(),
 ],
 )
.map_err(|e| internal("upserting scheduled job", e))?;
 Ok(())
 }

 pub async fn list_jobs(&self) -> AutonomyResult<Vec<ScheduledJob>> {
 let conn = self.conn.lock().await;
 let mut stmt = conn
.prepare(&format!("SELECT {JOB_COLUMNS} FROM scheduled_jobs ORDER BY handler_name ASC"))
.map_err(|e| internal("preparing job query", e))?;
 let rows = stmt
.query_map([], row_to_job)
.map_err(|e| internal("listing jobs", e))?;
 rows.collect::<Result<Vec<_>, _>>()
.map_err(|e| internal("reading job rows", e))
 }

 pub async fn get_job_by_handler(&self, handler_name: &str) -> AutonomyResult<Option<ScheduledJob>> {
 let conn = self.conn.lock().await;
 conn.query_row(
 &format!("SELECT {JOB_COLUMNS} FROM scheduled_jobs WHERE handler_name = ?1"),
 params![handler_name],
 row_to_job,
 )
.optional()
.map_err(|e| internal("fetching job", e))
 }

 /// Set `next_run_at` without recording a run, for a job that was just
 /// reconciled into the table and has never fired yet.
 pub async fn seed_next_run_at(
 &self,
 handler_name: &str,
 next_run_at: chrono::DateTime<chrono::Utc>,
 ) -> AutonomyResult<()> {
 let conn = self.conn.lock().await;
 conn.execute(
 "UPDATE scheduled_jobs SET next_run_at = ?1 WHERE handler_name = ?2 AND next_run_at IS NULL",
 params![crate::convert::dt_to_sql(next_run_at), handler_name],
 )
.map_err(|e| internal("seeding job next_run_at", e))?;
 Ok(())
 }

 /// A handler dropped from the code-defined registration set is
 /// disabled rather than deleted, so its run history and `next_run_at`
 /// survive in case it is reinstated.
 pub async fn disable_job(&self, handler_name: &str) -> AutonomyResult<()> {
 let conn = self.conn.lock().await;
 conn.execute(
 "UPDATE scheduled_jobs SET enabled = 0 WHERE handler_name = ?1",
 params![handler_name],
 )
.map_err(|e| internal("disabling removed job", e))?;
 Ok(())
 }

 pub async fn update_job_run(
 &self,
 handler_name: &str,
 next_run_at: Option<chrono::DateTime<chrono::Utc>>,
 last_run_at: chrono::DateTime<chrono::Utc>,
 last_status: JobRunStatus,
 last_skip_reason: Option<&str>,
 ) -> AutonomyResult<()> {
 let conn = self.conn.lock().await;
 conn.execute(
 "UPDATE scheduled_jobs SET next_run_at = ?1, last_run_at = ?2, last_status = ?3, last_skip_reason = ?4 WHERE handler_name = ?5",
 params![
 opt_dt_to_sql(next_run_at),
 crate::convert::dt_to_sql(last_run_at),
 last_status.as_str(),
 last_skip_reason,
 handler_name,
 ],
 )
.map_err(|e| internal("updating job run", e))?;
 Ok(())
 }
}

#[allow(dead_code)]
fn _unused(_: fn(&str) -> rusqlite::Result<chrono::DateTime<chrono::Utc>>) {
 let _ = dt_from_sql;
}
