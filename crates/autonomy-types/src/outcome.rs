use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Baseline + post-window measurement for a completed goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalOutcome {
 pub id: String,
 pub goal_id: String,

 pub baseline_date: DateTime<Utc>,
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub measurement_date: Option<DateTime<Utc>>,

 pub baseline_metrics: Map<String, Value>,
 #[serde(default)]
 pub outcome_metrics: Map<String, Value>,

 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub effectiveness_score: Option<f64>,
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub impact_component: Option<f64>,
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub roi_component: Option<f64>,
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub adoption_component: Option<f64>,
 #[serde(default, skip_serializing_if = "Option::is_none")]
 pub quality_component: Option<f64>,
}

/// Fixed weights for the four effectiveness components.
pub const EFFECTIVENESS_WEIGHT_IMPACT: f64 = 0.4;
pub const EFFECTIVENESS_WEIGHT_ROI: f64 = 0.3;
pub const EFFECTIVENESS_WEIGHT_ADOPTION: f64 = 0.2;
pub const EFFECTIVENESS_WEIGHT_QUALITY: f64 = 0.1;

pub fn effectiveness_score(impact: f64, roi: f64, adoption: f64, quality: f64) -> f64 {
 100.0
 * (EFFECTIVENESS_WEIGHT_IMPACT * impact.clamp(0.0, 1.0)
 + EFFECTIVENESS_WEIGHT_ROI * roi.clamp(0.0, 1.0)
 + EFFECTIVENESS_WEIGHT_ADOPTION * adoption.clamp(0.0, 1.0)
 + EFFECTIVENESS_WEIGHT_QUALITY * quality.clamp(0.0, 1.0))
}
