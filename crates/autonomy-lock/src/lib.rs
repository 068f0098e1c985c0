//! Distributed, fencing-token-bearing mutual exclusion across replicas,
//! backed by `autonomy-store`'s `distributed_locks` table. The store gives
//! us the atomic set-if-absent-with-expiry and compare-and-delete/update
//! primitives an external KV would otherwise provide; this crate is the
//! thin contract (`acquire`/`release`/`renew`) plus the named locks the
//! rest of the core coordinates through.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use rand::RngCore;

use autonomy_error::{AutonomyError, AutonomyResult};
use autonomy_store::Store;
use autonomy_types::LockHandle;

/// Named-lock convention for serializing a scheduled job's recurring fire.
pub fn job_lock_name(handler_name: &str) -> String {
 format!("job:{handler_name}")
}

pub fn task_lock_name(task_id: &str) -> String {
 format!("task:{task_id}")
}

pub const GOAL_GEN_WEEKLY_LOCK: &str = "goal_gen:weekly";

fn random_token() -> String {
 let mut bytes = [0u8; 24];
 rand::thread_rng().fill_bytes(&mut bytes);
 bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Clone)]
pub struct DistributedLock {
 store: Arc<Store>,
}

impl DistributedLock {
 pub fn new(store: Arc<Store>) -> Self {
 Self { store }
 }

 /// Attempt to claim `name` for `ttl`. Returns `None` rather than an
 /// error when another caller holds it — callers are expected to treat
 /// "didn't get the lock" as routine, not exceptional.
 pub async fn acquire(&self, name: &str, ttl: StdDuration) -> AutonomyResult<Option<LockHandle>> {
 let token = random_token();
 let acquired_at = Utc::now();
 let expires_at = acquired_at + Duration::from_std(ttl).unwrap_or(Duration::zero());

 let claimed = self
.store
.try_acquire_lock(name, &token, acquired_at, expires_at)
.await?;

 if !claimed {
 return Ok(None);
 }

 Ok(Some(LockHandle {
 name: name.to_string(),
 token,
 acquired_at,
 expires_at,
 }))
 }

 /// Same as `acquire`, but polls until `timeout` elapses rather than
 /// failing on the first contested attempt.
 pub async fn acquire_with_timeout(
 &self,
 name: &str,
 ttl: StdDuration,
 timeout: StdDuration,
 ) -> AutonomyResult<Option<LockHandle>> {
 let deadline = tokio::time::Instant::now() + timeout;
 loop {
 if let Some(handle) = self.acquire(name, ttl).await? {
 return Ok(Some(handle));
 }
 if tokio::time::Instant::now() >= deadline {
 return Ok(None);
 }
 tokio::time::sleep(StdDuration::from_millis(100)).await;
 }
 }

 /// Release a held lock. Errors with `LockStale` if the caller's token
 /// no longer matches the stored holder (lock expired and was reclaimed,
 /// or was never held) — the caller's critical section is no longer
 /// exclusive and must not proceed as if it were.
 pub async fn release(&self, handle: &LockHandle) -> AutonomyResult<()> {
 let released = self
.store
.release_lock_if_token(&handle.name, &handle.token)
.await?;
 if released {
 Ok(())
 } else {
 Err(AutonomyError::LockStale {
 name: handle.name.clone(),
 })
 }
 }

 /// Extend a held lock's TTL. Mandatory once a long-running handler has
 /// used more than half its TTL. Returns the renewed handle on
 /// success or `LockStale` if another replica has already reclaimed it.
 pub async fn renew(&self, handle: &LockHandle, ttl: StdDuration) -> AutonomyResult<LockHandle> {
 let new_expires_at = Utc::now() + Duration::from_std(ttl).unwrap_or(Duration::zero());
 let renewed = self
.store
.renew_lock_if_token(&handle.name, &handle.token, new_expires_at)
.await?;
 if !renewed {
 return Err(AutonomyError::LockStale {
 name: handle.name.clone(),
 });
 }
 Ok(LockHandle {
 name: handle.name.clone(),
 token: handle.token.clone(),
 acquired_at: handle.acquired_at,
 expires_at: new_expires_at,
 })
 }

 pub async fn status(&self, name: &str) -> AutonomyResult<Option<(String, chrono::DateTime<Utc>)>> {
 self.store.lock_status(name).await
 }
}

#[cfg(test)]
mod tests {
 use super::*;

 async fn lock() -> DistributedLock {
 let store = Store::open_in_memory().await.unwrap();
 DistributedLock::new(Arc::new(store))
 }

 #[tokio::test]
 async fn second_replica_is_denied() {
 let lock = lock().await;
 let h1 = lock
.acquire("job:weekly_research_cycle", StdDuration::from_secs(30))
.await
.unwrap();
 assert!(h1.is_some());

 let h2 = lock
.acquire("job:weekly_research_cycle", StdDuration::from_secs(30))
.await
.unwrap();
 assert!(h2.is_none());
 }

 #[tokio::test]
 async fn release_then_reacquire_succeeds() {
 let lock = lock().await;
 let handle = lock
.acquire("task:t1", StdDuration::from_secs(30))
.await
.unwrap()
.unwrap();
 lock.release(&handle).await.unwrap();

 let handle2 = lock.acquire("task:t1", StdDuration::from_secs(30)).await.unwrap();
 assert!(handle2.is_some());
 }

 #[tokio::test]
 async fn release_with_stale_token_errors() {
 let lock = lock().await;
 let handle = lock
.acquire("task:t1", StdDuration::from_secs(30))
.await
.unwrap()
.unwrap();
 lock.release(&handle).await.unwrap();

 // Now stale: someone else could have claimed it since.
 let err = lock.release(&handle).await.unwrap_err();
 assert!(matches!(err, AutonomyError::LockStale {.. }));
 }

 #[tokio::test]
 async fn renew_extends_expiry() {
 let lock = lock().await;
 let handle = lock
.acquire("task:t1", StdDuration::from_secs(5))
.await
.unwrap()
.unwrap();
 let renewed = lock.renew(&handle, StdDuration::from_secs(60)).await.unwrap();
 assert!(renewed.expires_at > handle.expires_at);
 }
}
