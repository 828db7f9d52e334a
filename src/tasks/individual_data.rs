use serde_json::{json, Value};

use crate::agents::{render_json, AgentDeps, QueryContext};
use crate::db::{PATIENTS, VITALS};
use crate::error::{MonitError, Result};
use crate::tasks::{analysis_request, context_patient_id, query_or_empty, sort_by_timestamp};

const SYSTEM_PROMPT: &str = r#"You review one patient's full record in depth.
Focus on this individual's circumstances rather than population norms.
Report: a profile summary, personal risk factors, how the vital signs have
evolved, any recent concerning change, and personalised care recommendations."#;

const MAX_READINGS: usize = 50;

pub async fn study_individual_data(
    deps: &AgentDeps,
    query: &str,
    context: &QueryContext,
    model: &str,
) -> Result<Value> {
    let patient_id = context_patient_id(context).ok_or_else(|| {
        MonitError::InvalidInput("No patient_id provided in context".to_string())
    })?;

    let by_patient = [("patient_id", json!(patient_id))];
    let profile = query_or_empty(deps.store.as_ref(), PATIENTS, &by_patient)
        .await
        .into_iter()
        .next();
    let mut readings = query_or_empty(deps.store.as_ref(), VITALS, &by_patient).await;
    sort_by_timestamp(&mut readings);
    readings.reverse();

    let prompt = format!(
        r#"Question about patient {patient_id}: {query}

Patient record:
{profile}

Vitals history, most recent first (up to {MAX_READINGS}):
{history}

1. Review the full profile.
2. Analyse how the vital signs have moved over time.
3. Identify personal risk factors.
4. Note trends and recent changes."#,
        profile = profile
            .as_ref()
            .map(render_json)
            .unwrap_or_else(|| "No patient data found".to_string()),
        history = if readings.is_empty() {
            "No vitals data found".to_string()
        } else {
            render_json(&readings.iter().take(MAX_READINGS).collect::<Vec<_>>())
        },
    );

    let findings = deps
        .inference
        .generate(analysis_request(SYSTEM_PROMPT, prompt, model, context))
        .await?;

    Ok(json!({
        "task": "study_individual_data",
        "patient_id": patient_id,
        "findings": findings,
        "vitals_records_analyzed": readings.len(),
        "patient_found": profile.is_some(),
    }))
}
