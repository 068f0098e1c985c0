use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use autonomy_approval::ApprovalWorkflow;
use autonomy_clock::{IdleSensor, SystemClock};
use autonomy_config::AutonomyConfig;
use autonomy_error::AutonomyError;
use autonomy_feedback::FeedbackLoop;
use autonomy_gate::ResourceGate;
use autonomy_store::Store;
use autonomy_types::{GoalStatus, GoalType, MetricsProbe, ProjectStatus};

/// Everything a handler needs, cloned per-request — every field is an
/// `Arc` (or otherwise cheaply cloneable), so `Clone` is free.
#[derive(Clone)]
pub struct AppState {
 pub store: Arc<Store>,
 pub approval: Arc<ApprovalWorkflow>,
 pub feedback: Arc<FeedbackLoop>,
 pub gate: Arc<ResourceGate<SystemClock>>,
 pub idle_sensor: Arc<IdleSensor<SystemClock>>,
 pub config: AutonomyConfig,
 pub probe: Arc<dyn MetricsProbe>,
}

/// A request-scoped failure translated to a stable `error` code.
/// `AutonomyError` never reaches a client directly — this is the one place
/// that decides the HTTP status for each code.
struct ApiError(AutonomyError);

impl From<AutonomyError> for ApiError {
 fn from(err: AutonomyError) -> Self {
 ApiError(err)
 }
}

impl IntoResponse for ApiError {
 fn into_response(self) -> Response {
 let status = match &self.0 {
 AutonomyError::NotFound {.. } => StatusCode::NOT_FOUND,
 AutonomyError::AutonomyDisabled
 | AutonomyError::BudgetExhausted
 | AutonomyError::NotIdle
 | AutonomyError::ResourcePressure
 | AutonomyError::WindowClosed => StatusCode::FORBIDDEN,
 AutonomyError::InvalidState(_)
 | AutonomyError::BudgetExceeded
 | AutonomyError::DependencyCycle
 | AutonomyError::LockUnavailable {.. }
 | AutonomyError::LockStale {.. }
 | AutonomyError::AlreadyMeasured
 | AutonomyError::BaselineMissing
 | AutonomyError::MeasurementNotDue => StatusCode::CONFLICT,
 AutonomyError::ExternalTimeout
 | AutonomyError::ExternalUnavailable
 | AutonomyError::ExternalInvalidResponse => StatusCode::BAD_GATEWAY,
 AutonomyError::ConfigMissing(_) | AutonomyError::ConfigInvalid(_) => {
 StatusCode::INTERNAL_SERVER_ERROR
 }
 AutonomyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
 };
 if matches!(self.0, AutonomyError::Internal(_)) {
 tracing::error!(error = %self.0, "internal_error serving request");
 }
 (status, Json(json!({ "error": self.0.code() })))
.into_response()
 }
}

#[derive(Deserialize)]
struct ApproveGoalInput {
 goal_id: String,
 approver: String,
 #[serde(default)]
 notes: Option<String>,
}

#[derive(Serialize)]
struct ApproveGoalOutput {
 project_id: String,
}

async fn approve_goal(
 State(state): State<AppState>,
 Json(input): Json<ApproveGoalInput>,
) -> Result<Json<ApproveGoalOutput>, ApiError> {
 let project = state
.approval
.approve(&input.goal_id, &input.approver, input.notes.as_deref(), state.probe.as_ref())
.await?;
 Ok(Json(ApproveGoalOutput { project_id: project.id }))
}

#[derive(Deserialize)]
struct RejectGoalInput {
 goal_id: String,
 approver: String,
 #[serde(default)]
 notes: Option<String>,
}

async fn reject_goal(
 State(state): State<AppState>,
 Json(input): Json<RejectGoalInput>,
) -> Result<Json<serde_json::Value>, ApiError> {
 state
.approval
.reject(&input.goal_id, &input.approver, input.notes.as_deref())
.await?;
 Ok(Json(json!({})))
}

#[derive(Deserialize)]
struct GoalListQuery {
 status: Option<String>,
}

async fn list_goals(
 State(state): State<AppState>,
 Query(query): Query<GoalListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
 let goals = match query.status {
 Some(raw) => {
 let status: GoalStatus = raw
.parse()
.map_err(|_| AutonomyError::ConfigInvalid(format!("unknown goal status {raw:?}")))?;
 state.store.list_goals_by_status(status).await?
 }
 None => state.store.list_goals().await?,
 };
 Ok(Json(json!(goals)))
}

async fn get_goal(
 State(state): State<AppState>,
 Path(goal_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
 let detail = state.approval.goal_detail(&goal_id).await?;
 Ok(Json(json!({
 "goal": detail.goal,
 "project": detail.project,
 "outcome": detail.outcome,
 })))
}

#[derive(Deserialize)]
struct ProjectListQuery {
 status: Option<String>,
}

async fn list_projects(
 State(state): State<AppState>,
 Query(query): Query<ProjectListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
 let status: ProjectStatus = match query.status {
 Some(raw) => raw
.parse()
.map_err(|_| AutonomyError::ConfigInvalid(format!("unknown project status {raw:?}")))?,
 None => ProjectStatus::Active,
 };
 let projects = state.store.list_projects_by_status(status).await?;
 Ok(Json(json!(projects)))
}

async fn autonomy_status(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
 let today = Utc::now().date_naive();
 let summary = state.store.budget_summary_for(today).await?;
 let sample = state.idle_sensor.last_sample();
 let last_denial = state.gate.recent_denials().last().map(|d| {
 json!({
 "at": d.at,
 "workload_class": d.workload_class,
 "reason": d.reason,
 })
 });
 Ok(Json(json!({
 "daily_spend_usd": summary.spent_today_usd,
 "daily_budget_usd": state.config.daily_budget_usd + summary.override_extra_usd,
 "idle": state.idle_sensor.is_idle(),
 "cpu_pct": sample.map(|s| s.cpu_pct),
 "mem_pct": sample.map(|s| s.mem_pct),
 "gate_last_denial": last_denial,
 })))
}

#[derive(Deserialize)]
struct EffectivenessQuery {
 goal_type: String,
}

async fn effectiveness(
 State(state): State<AppState>,
 Query(query): Query<EffectivenessQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
 let goal_type: GoalType = query
.goal_type
.parse()
.map_err(|_| AutonomyError::ConfigInvalid(format!("unknown goal type {:?}", query.goal_type)))?;
 let scores = state.store.effectiveness_scores_for_goal_type(goal_type).await?;
 let sample_size = scores.len();
 let mean_effectiveness = if sample_size == 0 {
 None
 } else {
 Some(scores.iter().sum::<f64>() / sample_size as f64)
 };
 let adjustment_factor = state.feedback.adjust(goal_type).await?;
 Ok(Json(json!({
 "mean_effectiveness": mean_effectiveness,
 "sample_size": sample_size,
 "adjustment_factor": adjustment_factor,
 })))
}

pub fn app_router(state: AppState) -> Router {
 let cors = CorsLayer::new()
.allow_origin(Any)
.allow_methods(Any)
.allow_headers(Any);

 Router::new()
.route("/approve-goal", post(approve_goal))
.route("/reject-goal", post(reject_goal))
.route("/goals", get(list_goals))
.route("/goals/{id}", get(get_goal))
.route("/projects", get(list_projects))
.route("/autonomy/status", get(autonomy_status))
.route("/effectiveness", get(effectiveness))
.layer(cors)
.with_state(state)
}

/// Bind and run the API, shutting down gracefully on Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
 let app = app_router(state);
 let listener = tokio::net::TcpListener::bind(addr).await?;
 tracing::info!(%addr, "autonomy-server listening");
 axum::serve(listener, app)
.with_graceful_shutdown(async {
 let _ = tokio::signal::ctrl_c().await;
 })
.await?;
 Ok(())
}

#[cfg(test)]
mod tests {
 use super::*;

 use std::collections::HashMap;

 use async_trait::async_trait;
 use autonomy_clock::IdleSensorConfig;
 use autonomy_config::SchedulerMode;
 use autonomy_types::{Goal, PrintFailureRecord};
 use rust_decimal::Decimal;
 use tower::ServiceExt;

 struct StubProbe;

 #[async_trait]
 impl MetricsProbe for StubProbe {
 async fn materials_count_for_slug(&self, _slug: &str) -> autonomy_error::AutonomyResult<u64> {
 Ok(0)
 }
 async fn failures_by_reason(
 &self,
 _since: chrono::DateTime<Utc>,
 _until: chrono::DateTime<Utc>,
 ) -> autonomy_error::AutonomyResult<HashMap<String, u64>> {
 Ok(HashMap::new())
 }
 async fn tier_spend_fraction(
 &self,
 _since: chrono::DateTime<Utc>,
 _until: chrono::DateTime<Utc>,
 ) -> autonomy_error::AutonomyResult<f64> {
 Ok(0.0)
 }
 async fn total_spend(
 &self,
 _since: chrono::DateTime<Utc>,
 _until: chrono::DateTime<Utc>,
 ) -> autonomy_error::AutonomyResult<Decimal> {
 Ok(Decimal::ZERO)
 }
 async fn recent_print_failures(
 &self,
 _since: chrono::DateTime<Utc>,
 _until: chrono::DateTime<Utc>,
 ) -> autonomy_error::AutonomyResult<Vec<PrintFailureRecord>> {
 Ok(Vec::new())
 }
 async fn total_prints(
 &self,
 _since: chrono::DateTime<Utc>,
 _until: chrono::DateTime<Utc>,
 ) -> autonomy_error::AutonomyResult<u64> {
 Ok(0)
 }
 async fn existing_kb_slugs(&self) -> autonomy_error::AutonomyResult<Vec<String>> {
 Ok(Vec::new())
 }
 async fn recent_query_miss_rate_for_slug(&self, _slug: &str) -> autonomy_error::AutonomyResult<f64> {
 Ok(0.0)
 }
 async fn query_hits_since(
 &self,
 _slug: &str,
 _since: chrono::DateTime<Utc>,
 ) -> autonomy_error::AutonomyResult<u64> {
 Ok(0)
 }
 }

 fn base_config() -> AutonomyConfig {
 AutonomyConfig {
 autonomy_enabled: true,
 daily_budget_usd: Decimal::new(2500, 2),
 per_query_budget_usd: Decimal::new(500, 2),
 idle_threshold_minutes: 120,
 cpu_idle_pct: 20,
 mem_idle_pct: 70,
 outcome_window_days: 30,
 feedback_min_samples: 10,
 feedback_adjustment_max: 1.5,
 scheduler_timezone: "UTC".to_string(),
 scheduler_mode: SchedulerMode::Prod,
 lock_kv_url: "sqlite://:memory:".to_string(),
 store_url: "sqlite://:memory:".to_string(),
 }
 }

 async fn test_state() -> AppState {
 let store = Arc::new(Store::open_in_memory().await.unwrap());
 let config = base_config();
 let idle_sensor = Arc::new(IdleSensor::<SystemClock>::new(IdleSensorConfig::default()));
 let gate = Arc::new(ResourceGate::new(store.clone(), idle_sensor.clone(), config.clone()));
 let feedback = Arc::new(FeedbackLoop::new(store.clone(), config.feedback_min_samples));
 let approval = Arc::new(ApprovalWorkflow::new(store.clone(), config.outcome_window_days as i64));
 AppState {
 store,
 approval,
 feedback,
 gate,
 idle_sensor,
 config,
 probe: Arc::new(StubProbe),
 }
 }

 fn sample_goal(id: &str) -> Goal {
 Goal {
 id: id.to_string(),
 title: "t".to_string(),
 description: "d".to_string(),
 goal_type: GoalType::Research,
 status: GoalStatus::Identified,
 base_impact_score: 60.0,
 adjustment_factor: 1.0,
 adjusted_impact_score: 60.0,
 estimated_cost_usd: Decimal::new(1000, 2),
 budget_limit_usd: Decimal::new(5000, 2),
 approved_by: None,
 approved_at: None,
 approval_notes: None,
 learn_from: true,
 baseline_captured: false,
 baseline_captured_at: None,
 outcome_measured_at: None,
 effectiveness_score: None,
 metadata: Default::default(),
 created_at: Utc::now(),
 }
 }

 #[tokio::test]
 async fn approve_goal_returns_project_id() {
 let state = test_state().await;
 state.store.insert_goal(&sample_goal("g1")).await.unwrap();
 let app = app_router(state);

 let req = axum::http::Request::builder()
.method("POST")
.uri("/approve-goal")
.header("content-type", "application/json")
.body(axum::body::Body::from(
 json!({ "goal_id": "g1", "approver": "alice" }).to_string(),
 ))
.unwrap();

 let response = app.oneshot(req).await.unwrap();
 assert_eq!(response.status(), StatusCode::OK);
 }

 #[tokio::test]
 async fn approve_unknown_goal_returns_not_found() {
 let state = test_state().await;
 let app = app_router(state);

 let req = axum::http::Request::builder()
.method("POST")
.uri("/approve-goal")
.header("content-type", "application/json")
.body(axum::body::Body::from(
 json!({ "goal_id": "missing", "approver": "alice" }).to_string(),
 ))
.unwrap();

 let response = app.oneshot(req).await.unwrap();
 assert_eq!(response.status(), StatusCode::NOT_FOUND);
 }

 #[tokio::test]
 async fn list_goals_filters_by_status() {
 let state = test_state().await;
 state.store.insert_goal(&sample_goal("g1")).await.unwrap();
 let app = app_router(state);

 let req = axum::http::Request::builder()
.uri("/goals?status=identified")
.body(axum::body::Body::empty())
.unwrap();

 let response = app.oneshot(req).await.unwrap();
 assert_eq!(response.status(), StatusCode::OK);
 }

 #[tokio::test]
 async fn autonomy_status_reports_idle_and_spend() {
 let state = test_state().await;
 let app = app_router(state);

 let req = axum::http::Request::builder()
.uri("/autonomy/status")
.body(axum::body::Body::empty())
.unwrap();

 let response = app.oneshot(req).await.unwrap();
 assert_eq!(response.status(), StatusCode::OK);
 let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
 let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
 assert_eq!(value["idle"], false);
 }
}
