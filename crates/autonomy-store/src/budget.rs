use chrono::{NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};
use rust_decimal::Decimal;

use autonomy_error::AutonomyResult;
use autonomy_types::{BudgetCategory, BudgetOverride};

use crate::convert::{decimal_from_sql, decimal_to_sql, dt_to_sql};
use crate::{internal, Store};

/// Today's autonomous spend plus any operator override in effect, as handed
/// to the Resource Gate.
#[derive(Debug, Clone, Copy)]
pub struct BudgetSummary {
 pub spent_today_usd: Decimal,
 pub override_extra_usd: Decimal,
}

impl Store {
 /// Append a ledger row and, for project-scoped spend, debit the
 /// project's budget headroom in the same transaction. Keyed on
 /// `idempotency_key` via `INSERT OR IGNORE`: replaying the same key
 /// inserts at most once.
 pub async fn record_cost(
 &self,
 category: BudgetCategory,
 amount_usd: Decimal,
 goal_id: Option<&str>,
 project_id: Option<&str>,
 task_id: Option<&str>,
 idempotency_key: Option<&str>,
 ) -> AutonomyResult<()> {
 let mut conn = self.conn.lock().await;
 let tx = conn
.transaction()
.map_err(|e| internal("starting cost recording transaction", e))?;

 if let Some(key) = idempotency_key {
 let already: Option<i64> = tx
.query_row(
 "SELECT 1 FROM budget_ledger WHERE idempotency_key = ?1",
 params![key],
 |row| row.get(0),
 )
.optional()
.map_err(|e| internal("checking ledger idempotency", e))?;
 if already.is_some() {
 tx.commit().map_err(|e| internal("committing no-op cost record", e))?;
 return Ok(());
 }
 }

 if let Some(project_id) = project_id {
 self.debit_project_budget(&tx, project_id, amount_usd).await?;
 }

 let id = uuid::Uuid::new_v4().to_string();
 tx.execute(
 "INSERT INTO budget_ledger (id, when_ts, category, amount_usd, goal_id, project_id, task_id, idempotency_key)
 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
 params![
 id,
 dt_to_sql(Utc::now()),
 category.as_str(),
 decimal_to_sql(amount_usd),
 goal_id,
 project_id,
 task_id,
 idempotency_key,
 ],
 )
.map_err(|e| internal("inserting ledger row", e))?;

 tx.commit().map_err(|e| internal("committing cost record", e))?;
 Ok(())
 }

 /// Sum of `BudgetCategory::Autonomous` ledger rows for the local
 /// calendar date containing `now`.
 pub async fn today_autonomous_spend(&self, today: NaiveDate) -> AutonomyResult<Decimal> {
 let conn = self.conn.lock().await;
 let prefix = today.format("%Y-%m-%d").to_string();
 let rows: Vec<String> = {
 let mut stmt = conn
.prepare(
 "SELECT amount_usd FROM budget_ledger WHERE category = ?1 AND when_ts LIKE ?2",
 )
.map_err(|e| internal("preparing spend query", e))?;
 stmt.query_map(
 params![BudgetCategory::Autonomous.as_str(), format!("{prefix}%")],
 |row| row.get::<_, String>(0),
 )
.map_err(|e| internal("summing spend", e))?
.collect::<Result<Vec<_>, _>>()
.map_err(|e| internal("reading spend rows", e))?
 };

 let mut total = Decimal::ZERO;
 for raw in rows {
 total += decimal_from_sql(&raw)?;
 }
 Ok(total)
 }

 pub async fn budget_override_for(&self, date: NaiveDate) -> AutonomyResult<Option<BudgetOverride>> {
 let conn = self.conn.lock().await;
 conn.query_row(
 "SELECT id, date, authorized_by, reason, extra_usd, created_at FROM budget_overrides WHERE date = ?1",
 params![date.format("%Y-%m-%d").to_string()],
 |row| {
 let date_str: String = row.get(1)?;
 let extra_usd: String = row.get(4)?;
 let created_at: String = row.get(5)?;
 Ok((row.get::<_, String>(0)?, date_str, row.get::<_, String>(2)?, row.get::<_, String>(3)?, extra_usd, created_at))
 },
 )
.optional()
.map_err(|e| internal("fetching budget override", e))?
.map(|(id, date_str, authorized_by, reason, extra_usd, created_at)| {
 Ok(BudgetOverride {
 id,
 date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
.map_err(|e| internal("parsing override date", e))?,
 authorized_by,
 reason,
 extra_usd: decimal_from_sql(&extra_usd)?,
 created_at: crate::convert::dt_from_sql(&created_at)?,
 })
 })
.transpose()
 }

 pub async fn insert_budget_override(&self, budget_override: &BudgetOverride) -> AutonomyResult<()> {
 let conn = self.conn.lock().await;
 conn.execute(
 "INSERT INTO budget_overrides (id, date, authorized_by, reason, extra_usd, created_at)
 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
 params![
 budget_override.id,
 budget_override.date.format("%Y-%m-%d").to_string(),
 budget_override.authorized_by,
 budget_override.reason,
 decimal_to_sql(budget_override.extra_usd),
 dt_to_sql(budget_override.created_at),
 ],
 )
.map_err(|e| internal("inserting budget override", e))?;
 Ok(())
 }

 pub async fn budget_summary_for(&self, today: NaiveDate) -> AutonomyResult<BudgetSummary> {
 let spent_today_usd = self.today_autonomous_spend(today).await?;
 let override_extra_usd = self
.budget_override_for(today)
.await?
.map(|o| o.extra_usd)
.unwrap_or(Decimal::ZERO);
 Ok(BudgetSummary {
 spent_today_usd,
 override_extra_usd,
 })
 }
}
