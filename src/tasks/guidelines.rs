use serde_json::{json, Value};

use crate::agents::{render_json, AgentDeps, QueryContext};
use crate::db::{CLINICAL_GUIDELINES, DRUG_INTERACTIONS, EMERGENCY_PROTOCOLS};
use crate::error::Result;
use crate::tasks::{analysis_request, read_or_empty};

const SYSTEM_PROMPT: &str = r#"You check a patient case against clinical practice guidelines.
Stick to evidence-based, standard-of-care recommendations.
Report: guidelines that apply, protocol recommendations, how current care
aligns with best practice, contraindications or warnings, and quality-of-care
indicators."#;

pub async fn study_medical_guidelines(
    deps: &AgentDeps,
    query: &str,
    context: &QueryContext,
    model: &str,
) -> Result<Value> {
    let guidelines = read_or_empty(deps.store.as_ref(), CLINICAL_GUIDELINES).await;
    let protocols = read_or_empty(deps.store.as_ref(), EMERGENCY_PROTOCOLS).await;
    let interactions = read_or_empty(deps.store.as_ref(), DRUG_INTERACTIONS).await;

    let prompt = format!(
        r#"Case question: {query}

Guidelines and protocols on file:
{reference}

1. Identify the clinical guidelines that apply.
2. Check the relevant emergency protocols.
3. Verify treatment standards.
4. Review drug interactions for any medication mentioned.
5. Assess compliance with best practice."#,
        reference = render_json(&json!({
            "clinical_guidelines": guidelines,
            "emergency_protocols": protocols,
            "drug_interactions": interactions,
        })),
    );

    let findings = deps
        .inference
        .generate(analysis_request(SYSTEM_PROMPT, prompt, model, context))
        .await?;

    Ok(json!({
        "task": "study_medical_guidelines",
        "findings": findings,
        "guidelines_consulted": guidelines.len(),
        "protocols_reviewed": protocols.len(),
        "drug_interactions_checked": interactions.len(),
    }))
}
