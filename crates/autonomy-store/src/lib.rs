//! The autonomy core's persistent store: a single SQLite database holding
//! goals, projects, tasks, outcomes, the budget ledger, scheduled-job
//! definitions, and an append-only audit log. One connection behind a
//! `tokio::sync::Mutex`, WAL mode, schema created idempotently on open.

mod audit;
mod budget;
mod convert;
mod dag;
mod goals;
mod jobs;
mod locks;
mod outcomes;
mod projects;
mod schema;
mod tasks;

pub use audit::AuditEntry;
pub use budget::BudgetSummary;
pub use dag::validate_dependencies;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use rusqlite::Connection;
use tokio::sync::Mutex;

use autonomy_error::{AutonomyError, AutonomyResult};

pub struct Store {
 conn: Arc<Mutex<Connection>>,
}

impl Store {
 /// Open (creating if absent) the database behind `STORE_URL`. Accepts
 /// either a bare filesystem path or a `sqlite://` URL.
 pub async fn open(store_url: &str) -> AutonomyResult<Self> {
 let path = store_url
.strip_prefix("sqlite://")
.unwrap_or(store_url)
.to_string();
 Self::open_path(Path::new(&path)).await
 }

 pub async fn open_path(path: &Path) -> AutonomyResult<Self> {
 if let Some(parent) = path.parent() {
 if !parent.as_os_str().is_empty() {
 tokio::fs::create_dir_all(parent)
.await
.context("creating store directory")?;
 }
 }

 let path = path.to_path_buf();
 let conn = tokio::task::spawn_blocking(move || -> anyhow::Result<Connection> {
 let conn = Connection::open(&path).context("opening sqlite database")?;
 conn.busy_timeout(std::time::Duration::from_secs(10))?;
 conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
 conn.execute("PRAGMA foreign_keys = ON", [])?;
 conn.execute_batch(schema::SCHEMA)?;
 Ok(conn)
 })
.await
.context("store init task panicked")??;

 Ok(Self {
 conn: Arc::new(Mutex::new(conn)),
 })
 }

 /// In-memory store for tests.
 #[cfg(any(test, feature = "test-util"))]
 pub async fn open_in_memory() -> AutonomyResult<Self> {
 let conn = Connection::open_in_memory().context("opening in-memory sqlite database")?;
 conn.execute_batch(schema::SCHEMA)
.context("applying schema")?;
 Ok(Self {
 conn: Arc::new(Mutex::new(conn)),
 })
 }
}

pub(crate) fn internal<E: std::fmt::Display>(context: &str, err: E) -> AutonomyError {
 AutonomyError::Internal(anyhow::anyhow!("{context}: {err}"))
}
