use serde_json::{json, Value};
use tracing::debug;

use crate::agents::{render_json, AgentDeps, QueryContext};
use crate::db::{CARDIAC_STUDIES, RESPIRATORY_STUDIES, SEPSIS_STUDIES};
use crate::error::Result;
use crate::tasks::{analysis_request, read_or_empty};

const SYSTEM_PROMPT: &str = r#"You compare a patient case against published medical research.
Prefer peer-reviewed work from the last five years and cite sources where you can.
Report: relevant studies, findings that apply to this case, the statistical
evidence behind them, and your confidence."#;

pub async fn compare_external_research(
    deps: &AgentDeps,
    query: &str,
    context: &QueryContext,
    model: &str,
) -> Result<Value> {
    let sepsis = read_or_empty(deps.store.as_ref(), SEPSIS_STUDIES).await;
    let cardiac = read_or_empty(deps.store.as_ref(), CARDIAC_STUDIES).await;
    let respiratory = read_or_empty(deps.store.as_ref(), RESPIRATORY_STUDIES).await;
    debug!(
        sepsis = sepsis.len(),
        cardiac = cardiac.len(),
        respiratory = respiratory.len(),
        "external research loaded"
    );

    let prompt = format!(
        r#"Case question: {query}

Research library on file:
{library}

1. Search for recent research relevant to this case.
2. Compare it with the library above.
3. Identify similar cases or patterns.
4. Extract the evidence-based insights that apply."#,
        library = render_json(&json!({
            "sepsis_studies": sepsis,
            "cardiac_studies": cardiac,
            "respiratory_studies": respiratory,
        })),
    );

    let request = analysis_request(SYSTEM_PROMPT, prompt, model, context).with_grounding();
    let findings = deps.inference.generate(request).await?;

    Ok(json!({
        "task": "compare_external_research",
        "findings": findings,
        "sources_consulted": {
            "sepsis_studies": sepsis.len(),
            "cardiac_studies": cardiac.len(),
            "respiratory_studies": respiratory.len(),
        },
        "grounding_used": true,
    }))
}
