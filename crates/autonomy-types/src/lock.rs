use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A held distributed lock. Only the holder quoting
/// `token` may release or renew.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockHandle {
 pub name: String,
 pub token: String,
 pub acquired_at: DateTime<Utc>,
 pub expires_at: DateTime<Utc>,
}

impl LockHandle {
 pub fn ttl(&self) -> chrono::Duration {
 self.expires_at - self.acquired_at
 }

 pub fn half_ttl_elapsed(&self, now: DateTime<Utc>) -> bool {
 let half = self.acquired_at + self.ttl() / 2;
 now >= half
 }
}
