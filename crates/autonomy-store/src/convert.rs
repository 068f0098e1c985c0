use autonomy_error::{AutonomyError, AutonomyResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

pub fn dt_to_sql(dt: DateTime<Utc>) -> String {
 dt.to_rfc3339()
}

pub fn opt_dt_to_sql(dt: Option<DateTime<Utc>>) -> Option<String> {
 dt.map(|d| d.to_rfc3339())
}

pub fn dt_from_sql(raw: &str) -> AutonomyResult<DateTime<Utc>> {
 DateTime::parse_from_rfc3339(raw)
.map(|d| d.with_timezone(&Utc))
.map_err(|e| crate::internal("parsing timestamp", e))
}

pub fn opt_dt_from_sql(raw: Option<String>) -> AutonomyResult<Option<DateTime<Utc>>> {
 raw.map(|r| dt_from_sql(&r)).transpose()
}

pub fn decimal_to_sql(amount: Decimal) -> String {
 amount.round_dp(4).to_string()
}

pub fn opt_decimal_to_sql(amount: Option<Decimal>) -> Option<String> {
 amount.map(decimal_to_sql)
}

pub fn decimal_from_sql(raw: &str) -> AutonomyResult<Decimal> {
 raw.parse::<Decimal>()
.map_err(|e| crate::internal("parsing decimal", e))
}

pub fn opt_decimal_from_sql(raw: Option<String>) -> AutonomyResult<Option<Decimal>> {
 raw.map(|r| decimal_from_sql(&r)).transpose()
}

pub fn json_to_sql(value: &Map<String, Value>) -> String {
 Value::Object(value.clone()).to_string()
}

pub fn json_from_sql(raw: &str) -> AutonomyResult<Map<String, Value>> {
 match serde_json::from_str::<Value>(raw) {
 Ok(Value::Object(m)) => Ok(m),
 Ok(_) | Err(_) => Ok(Map::new()),
 }
}

pub fn str_set_to_sql(values: &std::collections::BTreeSet<String>) -> String {
 serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

pub fn str_set_from_sql(raw: &str) -> std::collections::BTreeSet<String> {
 serde_json::from_str(raw).unwrap_or_default()
}

pub fn parse_enum<T: std::str::FromStr>(raw: &str, kind: &'static str) -> AutonomyResult<T> {
 raw.parse::<T>()
.map_err(|_| AutonomyError::Internal(anyhow::anyhow!("unknown {kind} value {raw:?}")))
}
