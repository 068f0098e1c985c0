use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde_json::{Map, Value};

use autonomy_error::{AutonomyError, AutonomyResult};
use autonomy_types::GoalOutcome;

use crate::convert::{dt_from_sql, dt_to_sql, json_from_sql, json_to_sql};
use crate::{internal, Store};

impl Store {
 /// Record the baseline metrics snapshot captured at approval time. One row per goal; re-capturing overwrites the baseline rather
 /// than erroring, since a goal can only be approved once.
 pub async fn insert_baseline(
 &self,
 goal_id: &str,
 baseline_date: DateTime<Utc>,
 baseline_metrics: &Map<String, Value>,
 ) -> AutonomyResult<()> {
 let conn = self.conn.lock().await;
 let id = uuid::Uuid::new_v4().to_string();
 conn.execute(
 "INSERT INTO goal_outcomes (id, goal_id, baseline_date, baseline_metrics)
 VALUES (?1, ?2, ?3, ?4)
 ON CONFLICT(goal_id) DO UPDATE SET baseline_date = excluded.baseline_date, baseline_metrics = excluded.baseline_metrics",
 params![id, goal_id, dt_to_sql(baseline_date), json_to_sql(baseline_metrics)],
 )
.map_err(|e| internal("inserting outcome baseline", e))?;
 Ok(())
 }

 pub async fn get_outcome(&self, goal_id: &str) -> AutonomyResult<Option<GoalOutcome>> {
 let conn = self.conn.lock().await;
 conn.query_row(
 "SELECT id, goal_id, baseline_date, measurement_date, baseline_metrics, outcome_metrics, \
 effectiveness_score, impact_component, roi_component, adoption_component, quality_component \
 FROM goal_outcomes WHERE goal_id = ?1",
 params![goal_id],
 row_to_outcome,
 )
.optional()
.map_err(|e| internal("fetching goal outcome", e))
 }

 /// Goals whose project completed at least `window_cutoff` ago and have
 /// not yet been measured: `status = completed`, `completed_at <=
 /// window_cutoff`, `outcome_measured_at IS NULL`.
 pub async fn goals_due_for_measurement(
 &self,
 window_cutoff: DateTime<Utc>,
 ) -> AutonomyResult<Vec<String>> {
 let conn = self.conn.lock().await;
 let mut stmt = conn
.prepare(
 "SELECT g.id FROM goals g \
 JOIN projects p ON p.goal_id = g.id \
 WHERE g.status = 'completed' \
 AND g.outcome_measured_at IS NULL \
 AND p.completed_at IS NOT NULL \
 AND p.completed_at <= ?1",
 )
.map_err(|e| internal("preparing due-measurement query", e))?;
 let rows = stmt
.query_map(params![dt_to_sql(window_cutoff)], |row| row.get::<_, String>(0))
.map_err(|e| internal("listing due measurements", e))?;
 rows.collect::<Result<Vec<_>, _>>()
.map_err(|e| internal("reading due-measurement rows", e))
 }

 /// Record the post-window measurement and computed effectiveness
 /// components exactly once per goal.
 #[allow(clippy::too_many_arguments)]
 pub async fn write_outcome_metrics(
 &self,
 goal_id: &str,
 measurement_date: DateTime<Utc>,
 outcome_metrics: &Map<String, Value>,
 effectiveness_score: f64,
 impact_component: f64,
 roi_component: f64,
 adoption_component: f64,
 quality_component: f64,
 ) -> AutonomyResult<()> {
 let conn = self.conn.lock().await;
 let already: Option<String> = conn
.query_row(
 "SELECT measurement_date FROM goal_outcomes WHERE goal_id = ?1",
 params![goal_id],
 |row| row.get(0),
 )
.optional()
.map_err(|e| internal("checking existing measurement", e))?
.flatten();
 if already.is_some() {
 return Err(AutonomyError::AlreadyMeasured);
 }

 let updated = conn
.execute(
 "UPDATE goal_outcomes SET measurement_date = ?1, outcome_metrics = ?2, effectiveness_score = ?3, \
 impact_component = ?4, roi_component = ?5, adoption_component = ?6, quality_component = ?7 \
 WHERE goal_id = ?8",
 params![
 dt_to_sql(measurement_date),
 json_to_sql(outcome_metrics),
 effectiveness_score,
 impact_component,
 roi_component,
 adoption_component,
 quality_component,
 goal_id,
 ],
 )
.map_err(|e| internal("writing outcome metrics", e))?;

 if updated == 0 {
 return Err(AutonomyError::BaselineMissing);
 }
 Ok(())
 }

 /// Effectiveness scores for every completed, learn-eligible goal of a
 /// given type — the sample the Feedback Loop averages over.
 pub async fn effectiveness_scores_for_goal_type(
 &self,
 goal_type: autonomy_types::GoalType,
 ) -> AutonomyResult<Vec<f64>> {
 let conn = self.conn.lock().await;
 let mut stmt = conn
.prepare(
 "SELECT o.effectiveness_score FROM goal_outcomes o
 JOIN goals g ON g.id = o.goal_id
 WHERE g.goal_type = ?1 AND g.learn_from = 1 AND o.effectiveness_score IS NOT NULL",
 )
.map_err(|e| internal("preparing feedback query", e))?;
 let rows = stmt
.query_map(params![goal_type.as_str()], |row| row.get::<_, f64>(0))
.map_err(|e| internal("listing effectiveness scores", e))?;
 rows.collect::<Result<Vec<_>, _>>()
.map_err(|e| internal("reading effectiveness scores", e))
 }
}

fn to_rusqlite_err(err: AutonomyError) -> rusqlite::Error {
 rusqlite::Error::FromSqlConversionFailure(
 0,
 rusqlite::types::Type::Text,
 Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string())),
 )
}

fn row_to_outcome(row: &rusqlite::Row) -> rusqlite::Result<GoalOutcome> {
 let baseline_date: String = row.get(2)?;
 let measurement_date: Option<String> = row.get(3)?;
 let baseline_metrics: String = row.get(4)?;
 let outcome_metrics: String = row.get(5)?;

 Ok(GoalOutcome {
 id: row.get(0)?,
 goal_id: row.get(1)?,
 baseline_date: dt_from_sql(&baseline_date).map_err(to_rusqlite_err)?,
 measurement_date: measurement_date
.map(|s| dt_from_sql(&s))
.transpose()
.map_err(to_rusqlite_err)?,
 baseline_metrics: json_from_sql(&baseline_metrics).unwrap_or_else(|_| Map::new()),
 outcome_metrics: json_from_sql(&outcome_metrics).unwrap_or_else(|_| Map::new()),
 effectiveness_score: row.get(6)?,
 impact_component: row.get(7)?,
 roi_component: row.get(8)?,
 adoption_component: row.get(9)?,
 quality_component: row.get(10)?,
 })
}
