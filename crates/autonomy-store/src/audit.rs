use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use autonomy_error::AutonomyResult;

use crate::convert::{dt_from_sql, dt_to_sql, json_from_sql, json_to_sql};
use crate::{internal, Store};

/// One row of the append-only audit log. Written at every point worth an
/// observable event — goal approval/rejection, project completion, lock
/// denial, job skip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
 pub id: String,
 pub at: DateTime<Utc>,
 pub actor: String,
 pub action: String,
 pub entity_kind: String,
 pub entity_id: String,
 pub detail: Map<String, Value>,
}

fn row_to_audit(row: &Row) -> rusqlite::Result<AuditEntry> {
 let at: String = row.get("at")?;
 let detail_json: String = row.get("detail_json")?;
 Ok(AuditEntry {
 id: row.get("id")?,
 at: dt_from_sql(&at).map_err(to_rusqlite_err)?,
 actor: row.get("actor")?,
 action: row.get("action")?,
 entity_kind: row.get("entity_kind")?,
 entity_id: row.get("entity_id")?,
 detail: json_from_sql(&detail_json).unwrap_or_else(|_| Map::new()),
 })
}

fn to_rusqlite_err(err: autonomy_error::AutonomyError) -> rusqlite::Error {
 rusqlite::Error::FromSqlConversionFailure(
 0,
 rusqlite::types::Type::Text,
 Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string())),
 )
}

const AUDIT_COLUMNS: &str = "id, at, actor, action, entity_kind, entity_id, detail_json";

impl Store {
 pub async fn append_audit(
 &self,
 actor: &str,
 action: &str,
 entity_kind: &str,
 entity_id: &str,
 detail: &Map<String, Value>,
 ) -> AutonomyResult<()> {
 let conn = self.conn.lock().await;
 let id = uuid::Uuid::new_v4().to_string();
 conn.execute(
 "INSERT INTO audit_log (id, at, actor, action, entity_kind, entity_id, detail_json)
 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
 params![
 id,
 dt_to_sql(Utc::now()),
 actor,
 action,
 entity_kind,
 entity_id,
 json_to_sql(detail),
 ],
 )
.map_err(|e| internal("appending audit entry", e))?;
 Ok(())
 }

 pub async fn list_audit_for_entity(
 &self,
 entity_kind: &str,
 entity_id: &str,
 ) -> AutonomyResult<Vec<AuditEntry>> {
 let conn = self.conn.lock().await;
 let mut stmt = conn
.prepare(&format!(
 "SELECT {AUDIT_COLUMNS} FROM audit_log WHERE entity_kind = ?1 AND entity_id = ?2 ORDER BY at ASC"
 ))
.map_err(|e| internal("preparing audit query", e))?;
 let rows = stmt
.query_map(params![entity_kind, entity_id], row_to_audit)
.map_err(|e| internal("listing audit entries", e))?;
 rows.collect::<Result<Vec<_>, _>>()
.map_err(|e| internal("reading audit rows", e))
 }
}

#[cfg(test)]
mod tests {
 use super::*;

 #[tokio::test]
 async fn append_and_list_round_trips() {
 let store = Store::open_in_memory().await.unwrap();
 let mut detail = Map::new();
 detail.insert("notes".into(), Value::String("looks good".into()));
 store
.append_audit("alice", "approve", "goal", "g1", &detail)
.await
.unwrap();

 let entries = store.list_audit_for_entity("goal", "g1").await.unwrap();
 assert_eq!(entries.len(), 1);
 assert_eq!(entries[0].actor, "alice");
 assert_eq!(entries[0].action, "approve");
 }
}
