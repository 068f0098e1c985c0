pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS goals (
 id TEXT PRIMARY KEY,
 title TEXT NOT NULL,
 description TEXT NOT NULL,
 goal_type TEXT NOT NULL,
 status TEXT NOT NULL,
 base_impact_score REAL NOT NULL,
 adjustment_factor REAL NOT NULL,
 adjusted_impact_score REAL NOT NULL,
 estimated_cost_usd TEXT NOT NULL,
 budget_limit_usd TEXT NOT NULL,
 approved_by TEXT,
 approved_at TEXT,
 approval_notes TEXT,
 learn_from INTEGER NOT NULL DEFAULT 1,
 baseline_captured INTEGER NOT NULL DEFAULT 0,
 baseline_captured_at TEXT,
 outcome_measured_at TEXT,
 effectiveness_score REAL,
 metadata TEXT NOT NULL DEFAULT '{}',
 created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_goals_status ON goals(status);
CREATE INDEX IF NOT EXISTS idx_goals_type ON goals(goal_type);

CREATE TABLE IF NOT EXISTS projects (
 id TEXT PRIMARY KEY,
 goal_id TEXT NOT NULL UNIQUE REFERENCES goals(id),
 status TEXT NOT NULL,
 allocated_budget_usd TEXT NOT NULL,
 spent_budget_usd TEXT NOT NULL,
 actual_cost_usd TEXT,
 actual_duration_hours REAL,
 created_at TEXT NOT NULL,
 started_at TEXT,
 completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_projects_status ON projects(status);

CREATE TABLE IF NOT EXISTS tasks (
 id TEXT PRIMARY KEY,
 project_id TEXT NOT NULL REFERENCES projects(id),
 task_type TEXT NOT NULL,
 status TEXT NOT NULL,
 priority TEXT NOT NULL,
 depends_on TEXT NOT NULL DEFAULT '[]',
 strict_depends_on TEXT NOT NULL DEFAULT '[]',
 estimated_cost_usd TEXT NOT NULL,
 actual_cost_usd TEXT,
 payload TEXT NOT NULL DEFAULT '{}',
 result TEXT NOT NULL DEFAULT '{}',
 attempt_count INTEGER NOT NULL DEFAULT 0,
 last_error TEXT,
 project_critical INTEGER NOT NULL DEFAULT 0,
 created_at TEXT NOT NULL,
 started_at TEXT,
 completed_at TEXT,
 retry_not_before TEXT
);

CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(project_id, status);

CREATE TABLE IF NOT EXISTS goal_outcomes (
 id TEXT PRIMARY KEY,
 goal_id TEXT NOT NULL UNIQUE REFERENCES goals(id),
 baseline_date TEXT NOT NULL,
 measurement_date TEXT,
 baseline_metrics TEXT NOT NULL DEFAULT '{}',
 outcome_metrics TEXT NOT NULL DEFAULT '{}',
 effectiveness_score REAL,
 impact_component REAL,
 roi_component REAL,
 adoption_component REAL,
 quality_component REAL
);

CREATE TABLE IF NOT EXISTS scheduled_jobs (
 id TEXT PRIMARY KEY,
 handler_name TEXT NOT NULL UNIQUE,
 trigger_kind TEXT NOT NULL,
 trigger_expr TEXT NOT NULL,
 timezone TEXT NOT NULL,
 enabled INTEGER NOT NULL DEFAULT 1,
 workload_class TEXT NOT NULL,
 next_run_at TEXT,
 last_run_at TEXT,
 last_status TEXT,
 last_skip_reason TEXT
);

CREATE TABLE IF NOT EXISTS budget_ledger (
 id TEXT PRIMARY KEY,
 when_ts TEXT NOT NULL,
 category TEXT NOT NULL,
 amount_usd TEXT NOT NULL,
 goal_id TEXT,
 project_id TEXT,
 task_id TEXT,
 idempotency_key TEXT UNIQUE
);

CREATE INDEX IF NOT EXISTS idx_ledger_category_when ON budget_ledger(category, when_ts);
CREATE INDEX IF NOT EXISTS idx_ledger_project ON budget_ledger(project_id);

CREATE TABLE IF NOT EXISTS budget_overrides (
 id TEXT PRIMARY KEY,
 date TEXT NOT NULL,
 authorized_by TEXT NOT NULL,
 reason TEXT NOT NULL,
 extra_usd TEXT NOT NULL,
 created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_overrides_date ON budget_overrides(date);

CREATE TABLE IF NOT EXISTS audit_log (
 id TEXT PRIMARY KEY,
 at TEXT NOT NULL,
 actor TEXT NOT NULL,
 action TEXT NOT NULL,
 entity_kind TEXT NOT NULL,
 entity_id TEXT NOT NULL,
 detail_json TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log(entity_kind, entity_id);

CREATE TABLE IF NOT EXISTS distributed_locks (
 name TEXT PRIMARY KEY,
 token TEXT NOT NULL,
 acquired_at TEXT NOT NULL,
 expires_at TEXT NOT NULL
);
"#;
