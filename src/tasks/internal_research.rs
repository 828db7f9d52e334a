use serde_json::{json, Value};

use crate::agents::{render_json, AgentDeps, QueryContext};
use crate::db::{CASE_STUDIES, TREATMENT_OUTCOMES};
use crate::error::Result;
use crate::tasks::{analysis_request, read_or_empty};

const SYSTEM_PROMPT: &str = r#"You review this hospital's own case archive and treatment outcomes.
The data is internal; focus on patterns within this institution.
Report: how many similar cases exist, key similarities and differences,
treatments that worked, observed success rates, and site-specific insights."#;

pub async fn compare_internal_research(
    deps: &AgentDeps,
    query: &str,
    context: &QueryContext,
    model: &str,
) -> Result<Value> {
    let case_studies = read_or_empty(deps.store.as_ref(), CASE_STUDIES).await;
    let treatment_outcomes = read_or_empty(deps.store.as_ref(), TREATMENT_OUTCOMES).await;

    let prompt = format!(
        r#"Case question: {query}

Internal research archive:
{archive}

1. Find similar cases in the archive.
2. Compare demographics, symptoms and vitals.
3. Review how similar cases were treated.
4. Summarise the outcomes achieved."#,
        archive = render_json(&json!({
            "case_studies": case_studies,
            "treatment_outcomes": treatment_outcomes,
        })),
    );

    let findings = deps
        .inference
        .generate(analysis_request(SYSTEM_PROMPT, prompt, model, context))
        .await?;

    Ok(json!({
        "task": "compare_internal_research",
        "findings": findings,
        "cases_analyzed": case_studies.len(),
        "treatments_reviewed": treatment_outcomes.len(),
    }))
}
