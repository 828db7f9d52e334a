use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::agents::{render_json, AgentDeps, QueryContext};
use crate::db::{PATIENTS, VITALS};
use crate::error::Result;
use crate::tasks::{analysis_request, field_f64, mean, read_or_empty};

const SYSTEM_PROMPT: &str = r#"You look for patterns across the whole monitored patient population.
Report: the patterns you see, how statistically solid they are, population-level
risk factors, comparisons between patient groups, and actionable recommendations."#;

pub async fn study_patient_data(
    deps: &AgentDeps,
    query: &str,
    context: &QueryContext,
    model: &str,
) -> Result<Value> {
    let patients = read_or_empty(deps.store.as_ref(), PATIENTS).await;
    let vitals = read_or_empty(deps.store.as_ref(), VITALS).await;
    let statistics = population_statistics(&patients, &vitals);

    let prompt = format!(
        r#"Population question: {query}

Total patients: {total}

Demographics (first 10 patients):
{demographics}

Population statistics:
{statistics}

Recent vitals (first 20 rows):
{recent}

1. Identify patterns across patients.
2. Find statistical correlations.
3. Compare patient groups.
4. Summarise the insights."#,
        total = patients.len(),
        demographics = render_json(&patients.iter().take(10).collect::<Vec<_>>()),
        statistics = render_json(&statistics),
        recent = render_json(&vitals.iter().take(20).collect::<Vec<_>>()),
    );

    let findings = deps
        .inference
        .generate(analysis_request(SYSTEM_PROMPT, prompt, model, context))
        .await?;

    Ok(json!({
        "task": "study_patient_data",
        "findings": findings,
        "statistics": statistics,
        "patients_analyzed": patients.len(),
    }))
}

/// Summary figures over the stored population. Keys are omitted when there is
/// nothing to compute them from.
pub fn population_statistics(patients: &[Value], vitals: &[Value]) -> Map<String, Value> {
    let mut stats = Map::new();

    if !patients.is_empty() {
        stats.insert("total_patients".to_string(), json!(patients.len()));
        if let Some(avg_age) = mean(patients.iter().filter_map(|row| field_f64(row, "age"))) {
            stats.insert("avg_age".to_string(), json!(avg_age));
        }
        let mut genders = BTreeMap::<String, usize>::new();
        for gender in patients
            .iter()
            .filter_map(|row| row.get("gender").and_then(Value::as_str))
        {
            *genders.entry(gender.to_string()).or_default() += 1;
        }
        if !genders.is_empty() {
            stats.insert("gender_distribution".to_string(), json!(genders));
        }
    }

    if let Some(avg_heart_rate) = mean(vitals.iter().filter_map(|row| field_f64(row, "heart_rate"))) {
        stats.insert("avg_heart_rate".to_string(), json!(avg_heart_rate));
        for (key, field) in [("avg_bp_systolic", "bp_systolic"), ("avg_o2_sat", "o2_saturation")] {
            let average = mean(vitals.iter().filter_map(|row| field_f64(row, field))).unwrap_or(0.0);
            stats.insert(key.to_string(), json!(average));
        }
    }

    stats
}
