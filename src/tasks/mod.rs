//! The six analysis routines a worker can be bound to.

pub mod deterioration;
pub mod external_research;
pub mod guidelines;
pub mod individual_data;
pub mod internal_research;
pub mod patient_data;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::agents::{AgentDeps, QueryContext};
use crate::db::RecordStore;
use crate::error::Result;
use crate::llm_adapter::InferenceRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    CompareExternalResearch,
    CompareInternalResearch,
    StudyPatientData,
    StudyIndividualData,
    StudyMedicalGuidelines,
    PredictDeterioration,
}

impl TaskKind {
    pub const ALL: [TaskKind; 6] = [
        TaskKind::CompareExternalResearch,
        TaskKind::CompareInternalResearch,
        TaskKind::StudyPatientData,
        TaskKind::StudyIndividualData,
        TaskKind::StudyMedicalGuidelines,
        TaskKind::PredictDeterioration,
    ];

    /// Fallback for workers configured without a task.
    pub const DEFAULT: TaskKind = TaskKind::StudyPatientData;

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::CompareExternalResearch => "compare_external_research",
            TaskKind::CompareInternalResearch => "compare_internal_research",
            TaskKind::StudyPatientData => "study_patient_data",
            TaskKind::StudyIndividualData => "study_individual_data",
            TaskKind::StudyMedicalGuidelines => "study_medical_guidelines",
            TaskKind::PredictDeterioration => "predict_deterioration",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    pub async fn run(
        self,
        deps: &AgentDeps,
        query: &str,
        context: &QueryContext,
        model: &str,
    ) -> Result<Value> {
        match self {
            TaskKind::CompareExternalResearch => {
                external_research::compare_external_research(deps, query, context, model).await
            }
            TaskKind::CompareInternalResearch => {
                internal_research::compare_internal_research(deps, query, context, model).await
            }
            TaskKind::StudyPatientData => {
                patient_data::study_patient_data(deps, query, context, model).await
            }
            TaskKind::StudyIndividualData => {
                individual_data::study_individual_data(deps, query, context, model).await
            }
            TaskKind::StudyMedicalGuidelines => {
                guidelines::study_medical_guidelines(deps, query, context, model).await
            }
            TaskKind::PredictDeterioration => {
                deterioration::predict_deterioration(deps, query, context, model).await
            }
        }
    }
}

pub(crate) fn analysis_request(
    system_instruction: &str,
    prompt: String,
    model: &str,
    context: &QueryContext,
) -> InferenceRequest {
    InferenceRequest::new(prompt, model)
        .with_system_instruction(system_instruction)
        .with_context(Value::Object(context.clone()))
}

/// Reads a collection, degrading to an empty list when the store is down.
pub(crate) async fn read_or_empty(store: &dyn RecordStore, collection: &str) -> Vec<Value> {
    match store.read(collection).await {
        Ok(rows) => rows,
        Err(error) => {
            warn!(collection, error = %error, "record store read failed; continuing without rows");
            Vec::new()
        }
    }
}

/// Rows matching `filters`, degrading to an empty list when the store is down.
pub(crate) async fn query_or_empty(
    store: &dyn RecordStore,
    collection: &str,
    filters: &[(&str, Value)],
) -> Vec<Value> {
    match store.query(collection, filters).await {
        Ok(rows) => rows,
        Err(error) => {
            warn!(collection, error = %error, "record store query failed; continuing without rows");
            Vec::new()
        }
    }
}

pub(crate) fn context_patient_id(context: &QueryContext) -> Option<String> {
    match context.get("patient_id") {
        Some(Value::String(value)) if !value.trim().is_empty() => Some(value.trim().to_string()),
        Some(Value::Number(value)) => Some(value.to_string()),
        _ => None,
    }
}

pub(crate) fn field_f64(row: &Value, field: &str) -> Option<f64> {
    match row.get(field)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub(crate) fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0_usize), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Orders rows by their parsed `timestamp`, oldest first. Rows without a
/// readable one keep their stored order ahead of timestamped rows.
pub(crate) fn sort_by_timestamp(rows: &mut [Value]) {
    rows.sort_by_cached_key(|row| {
        row.get("timestamp")
            .and_then(Value::as_str)
            .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
            .map(|timestamp| timestamp.with_timezone(&Utc))
    });
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn every_task_name_parses_back() {
        for kind in TaskKind::ALL {
            assert_eq!(TaskKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(TaskKind::parse("summon_oracle"), None);
    }

    #[test]
    fn sort_by_timestamp_is_stable_for_untimed_rows() {
        let mut rows = vec![
            json!({"id": 1, "timestamp": "2025-01-02T00:00:00Z"}),
            json!({"id": 2}),
            json!({"id": 3, "timestamp": "2025-01-01T00:00:00Z"}),
        ];
        sort_by_timestamp(&mut rows);
        let ids = rows.iter().map(|row| row["id"].clone()).collect::<Vec<_>>();
        assert_eq!(ids, vec![json!(2), json!(3), json!(1)]);
    }

    #[test]
    fn sort_by_timestamp_compares_instants_not_text() {
        // mixed fractional precision and offsets; text order would differ
        let mut rows = vec![
            json!({"id": "late", "timestamp": "2025-01-01T10:00:00.5Z"}),
            json!({"id": "early", "timestamp": "2025-01-01T10:00:00.100000001Z"}),
            json!({"id": "first", "timestamp": "2025-01-01T10:00:00Z"}),
            json!({"id": "offset", "timestamp": "2025-01-01T11:00:00.2+01:00"}),
        ];
        sort_by_timestamp(&mut rows);
        let ids = rows.iter().map(|row| row["id"].clone()).collect::<Vec<_>>();
        assert_eq!(ids, vec![json!("first"), json!("early"), json!("offset"), json!("late")]);
    }

    #[test]
    fn context_patient_id_accepts_strings_and_numbers() {
        let mut context = QueryContext::new();
        assert_eq!(context_patient_id(&context), None);
        context.insert("patient_id".to_string(), json!(" P001 "));
        assert_eq!(context_patient_id(&context).as_deref(), Some("P001"));
        context.insert("patient_id".to_string(), json!(42));
        assert_eq!(context_patient_id(&context).as_deref(), Some("42"));
    }
}
