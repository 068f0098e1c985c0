use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use autonomy_error::AutonomyResult;

use crate::convert::dt_to_sql;
use crate::{internal, Store};

/// Raw SQL primitives the distributed lock builds on: atomic
/// set-if-absent-with-expiry and compare-and-delete/compare-and-update,
/// the same contract an external KV store would provide. A single row per
/// lock name lives in `distributed_locks`; the surrounding transaction is
/// what makes "absent or expired -> claim it" atomic across replicas
/// sharing this database.
impl Store {
 /// Attempt to claim `name` for `token` until `expires_at`. Succeeds
 /// (returns `true`) if no row exists or the existing row has already
 /// expired; otherwise leaves the existing holder untouched and returns
 /// `false`.
 pub async fn try_acquire_lock(
 &self,
 name: &str,
 token: &str,
 acquired_at: DateTime<Utc>,
 expires_at: DateTime<Utc>,
 ) -> AutonomyResult<bool> {
 let mut conn = self.conn.lock().await;
 let tx = conn
.transaction()
.map_err(|e| internal("starting lock acquire transaction", e))?;

 let existing: Option<String> = tx
.query_row(
 "SELECT expires_at FROM distributed_locks WHERE name = ?1",
 params![name],
 |row| row.get(0),
 )
.optional()
.map_err(|e| internal("reading lock row", e))?;

 let claimable = match existing {
 None => true,
 Some(expires_at_raw) => {
 let existing_expiry = crate::convert::dt_from_sql(&expires_at_raw)?;
 existing_expiry <= acquired_at
 }
 };

 if !claimable {
 tx.commit().map_err(|e| internal("committing lock no-op", e))?;
 return Ok(false);
 }

 tx.execute(
 "INSERT INTO distributed_locks (name, token, acquired_at, expires_at)
 VALUES (?1, ?2, ?3, ?4)
 ON CONFLICT(name) DO UPDATE SET token = excluded.token, acquired_at = excluded.acquired_at, expires_at = excluded.expires_at",
 params![name, token, dt_to_sql(acquired_at), dt_to_sql(expires_at)],
 )
.map_err(|e| internal("claiming lock", e))?;

 tx.commit().map_err(|e| internal("committing lock claim", e))?;
 Ok(true)
 }

 /// Delete the lock row iff it is still held by `token` (compare-and-delete).
 pub async fn release_lock_if_token(&self, name: &str, token: &str) -> AutonomyResult<bool> {
 let conn = self.conn.lock().await;
 let affected = conn
.execute(
 "DELETE FROM distributed_locks WHERE name = ?1 AND token = ?2",
 params![name, token],
 )
.map_err(|e| internal("releasing lock", e))?;
 Ok(affected > 0)
 }

 /// Extend `expires_at` iff the row is still held by `token`
 /// (compare-and-update).
 pub async fn renew_lock_if_token(
 &self,
 name: &str,
 token: &str,
 new_expires_at: DateTime<Utc>,
 ) -> AutonomyResult<bool> {
 let conn = self.conn.lock().await;
 let affected = conn
.execute(
 "UPDATE distributed_locks SET expires_at = ?1 WHERE name = ?2 AND token = ?3",
 params![dt_to_sql(new_expires_at), name, token],
 )
.map_err(|e| internal("renewing lock", e))?;
 Ok(affected > 0)
 }

 /// Current holder's token and expiry, if any, for status/debugging.
 pub async fn lock_status(&self, name: &str) -> AutonomyResult<Option<(String, DateTime<Utc>)>> {
 let conn = self.conn.lock().await;
 conn.query_row(
 "SELECT token, expires_at FROM distributed_locks WHERE name = ?1",
 params![name],
 |row| {
 let expires_at: String = row.get(1)?;
 Ok((row.get::<_, String>(0)?, expires_at))
 },
 )
.optional()
.map_err(|e| internal("reading lock status", e))?
.map(|(token, expires_at)| Ok((token, crate::convert::dt_from_sql(&expires_at)?)))
.transpose()
 }
}

#[cfg(test)]
mod tests {
 use super::*;
 use chrono::Duration;

 #[tokio::test]
 async fn second_acquire_fails_while_first_holds() {
 let store = Store::open_in_memory().await.unwrap();
 let now = Utc::now();
 let ok1 = store
.try_acquire_lock("job:x", "tok1", now, now + Duration::seconds(30))
.await
.unwrap();
 assert!(ok1);

 let ok2 = store
.try_acquire_lock("job:x", "tok2", now, now + Duration::seconds(30))
.await
.unwrap();
 assert!(!ok2);
 }

 #[tokio::test]
 async fn acquire_succeeds_after_expiry() {
 let store = Store::open_in_memory().await.unwrap();
 let now = Utc::now();
 store
.try_acquire_lock("job:x", "tok1", now, now + Duration::seconds(1))
.await
.unwrap();

 let later = now + Duration::seconds(2);
 let ok = store
.try_acquire_lock("job:x", "tok2", later, later + Duration::seconds(30))
.await
.unwrap();
 assert!(ok);
 }

 #[tokio::test]
 async fn release_requires_matching_token() {
 let store = Store::open_in_memory().await.unwrap();
 let now = Utc::now();
 store
.try_acquire_lock("job:x", "tok1", now, now + Duration::seconds(30))
.await
.unwrap();

 assert!(!store.release_lock_if_token("job:x", "wrong").await.unwrap());
 assert!(store.release_lock_if_token("job:x", "tok1").await.unwrap());
 }
}
