use thiserror::Error;

/// The stable, machine-readable error taxonomy of the autonomy core. Every
/// public operation returns one of these variants on failure; no
/// collaborator's native exception type crosses a contract boundary —
/// adapters translate at the edge.
#[derive(Debug, Error)]
pub enum AutonomyError {
 // --- Resource Gate denials ---
 #[error("autonomy is disabled")]
 AutonomyDisabled,
 #[error("daily autonomous budget exhausted")]
 BudgetExhausted,
 #[error("system is not idle")]
 NotIdle,
 #[error("CPU or memory pressure exceeds the per-class threshold")]
 ResourcePressure,
 #[error("current local hour is outside the permitted workload window")]
 WindowClosed,

 // --- Distributed Lock ---
 #[error("lock {name:?} is held by another caller")]
 LockUnavailable { name: String },
 #[error("lock {name:?} token is stale")]
 LockStale { name: String },

 // --- Project/Task Engine ---
 #[error("invalid state transition: {0}")]
 InvalidState(String),
 #[error("{kind} {id:?} not found")]
 NotFound { kind: &'static str, id: String },
 #[error("dependency graph contains a cycle")]
 DependencyCycle,
 #[error("cost would exceed the project's allocated budget")]
 BudgetExceeded,

 // --- Collaborator errors ---
 #[error("external call timed out")]
 ExternalTimeout,
 #[error("external collaborator unavailable")]
 ExternalUnavailable,
 #[error("external collaborator returned an invalid response")]
 ExternalInvalidResponse,

 // --- Outcome Tracker ---
 #[error("measurement window has not elapsed yet")]
 MeasurementNotDue,
 #[error("no baseline captured for this goal")]
 BaselineMissing,
 #[error("outcome already measured for this goal")]
 AlreadyMeasured,

 // --- Startup ---
 #[error("required configuration missing: {0}")]
 ConfigMissing(String),
 #[error("invalid configuration: {0}")]
 ConfigInvalid(String),

 /// Internal failures (store I/O, lock-KV I/O) that don't have a
 /// taxonomy code of their own. Wrapped rather than downcast so callers
 /// that only care about the taxonomy can match on it and treat this
 /// arm as "something went wrong, log and retry/report".
 #[error(transparent)]
 Internal(#[from] anyhow::Error),
}

impl AutonomyError {
 /// The stable string surfaced on the HTTP API and in structured logs.
 pub fn code(&self) -> &'static str {
 match self {
 AutonomyError::AutonomyDisabled => "autonomy_disabled",
 AutonomyError::BudgetExhausted => "budget_exhausted",
 AutonomyError::NotIdle => "not_idle",
 AutonomyError::ResourcePressure => "resource_pressure",
 AutonomyError::WindowClosed => "window_closed",
 AutonomyError::LockUnavailable {.. } => "lock_unavailable",
 AutonomyError::LockStale {.. } => "lock_stale",
 AutonomyError::InvalidState(_) => "invalid_state",
 AutonomyError::NotFound {.. } => "not_found",
 AutonomyError::DependencyCycle => "dependency_cycle",
 AutonomyError::BudgetExceeded => "budget_exceeded",
 AutonomyError::ExternalTimeout => "external_timeout",
 AutonomyError::ExternalUnavailable => "external_unavailable",
 AutonomyError::ExternalInvalidResponse => "external_invalid_response",
 AutonomyError::MeasurementNotDue => "measurement_not_due",
 AutonomyError::BaselineMissing => "baseline_missing",
 AutonomyError::AlreadyMeasured => "already_measured",
 AutonomyError::ConfigMissing(_) => "config_missing",
 AutonomyError::ConfigInvalid(_) => "config_invalid",
 AutonomyError::Internal(_) => "internal_error",
 }
 }
}

pub type AutonomyResult<T> = Result<T, AutonomyError>;

#[cfg(test)]
mod tests {
 use super::*;

 #[test]
 fn codes_are_stable_strings() {
 assert_eq!(AutonomyError::BudgetExhausted.code(), "budget_exhausted");
 assert_eq!(
 AutonomyError::NotFound {
 kind: "goal",
 id: "g1".into()
 }
.code(),
 "not_found"
 );
 }
}
