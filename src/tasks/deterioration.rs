use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::agents::{render_json, AgentDeps, QueryContext};
use crate::db::VITALS;
use crate::error::Result;
use crate::stream::VitalChannel;
use crate::tasks::{analysis_request, context_patient_id, field_f64, query_or_empty, sort_by_timestamp};

const SYSTEM_PROMPT: &str = r#"You forecast short-term patient deterioration from vital-sign trajectories.
Use established early warning scores such as NEWS and MEWS as a reference.
Report: a deterioration risk score from 0 to 100, early warning signs, a
likely timeline, your confidence (Low, Medium or High), the most concerning
vitals, and recommended interventions."#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalTrend {
    pub current: f64,
    pub previous: f64,
    pub trend: TrendDirection,
    pub rate_of_change: f64,
}

/// Per-channel trend over time-ordered readings. Channels with fewer than two
/// values are left out. A flat series counts as decreasing.
pub fn vital_trends(readings: &[Value]) -> BTreeMap<String, VitalTrend> {
    let mut trends = BTreeMap::new();
    for channel in VitalChannel::ALL {
        let values = readings
            .iter()
            .filter_map(|row| field_f64(row, channel.as_str()))
            .collect::<Vec<_>>();
        let (Some(first), Some(last)) = (values.first(), values.last()) else {
            continue;
        };
        if values.len() < 2 {
            continue;
        }

        trends.insert(
            channel.as_str().to_string(),
            VitalTrend {
                current: *last,
                previous: values[values.len() - 2],
                trend: if last > first {
                    TrendDirection::Increasing
                } else {
                    TrendDirection::Decreasing
                },
                rate_of_change: (last - first) / values.len() as f64,
            },
        );
    }
    trends
}

pub async fn predict_deterioration(
    deps: &AgentDeps,
    query: &str,
    context: &QueryContext,
    model: &str,
) -> Result<Value> {
    let patient_id = context_patient_id(context);
    let mut readings = match patient_id.as_deref() {
        Some(patient_id) => {
            query_or_empty(deps.store.as_ref(), VITALS, &[("patient_id", json!(patient_id))]).await
        }
        None => Vec::new(),
    };
    sort_by_timestamp(&mut readings);
    let trends = vital_trends(&readings);

    let recent = &readings[readings.len().saturating_sub(20)..];
    let prompt = format!(
        r#"Deterioration question: {query}

Recent vital signs, oldest first:
{recent}

Computed trends:
{trends}

1. Analyse the vital-sign trajectories.
2. Identify early warning signs.
3. Estimate a deterioration risk score from 0 to 100.
4. Predict a likely timeline.
5. State how confident you are."#,
        recent = if recent.is_empty() {
            "No vitals data available".to_string()
        } else {
            render_json(&recent)
        },
        trends = render_json(&trends),
    );

    let findings = deps
        .inference
        .generate(analysis_request(SYSTEM_PROMPT, prompt, model, context))
        .await?;

    Ok(json!({
        "task": "predict_deterioration",
        "patient_id": patient_id,
        "findings": findings,
        "trends_analyzed": trends,
        "vitals_data_points": readings.len(),
    }))
}
