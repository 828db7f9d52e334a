//! System instructions and prompt builders for the coordinating tiers.
//! Worker task instructions live with their handlers in `crate::tasks`.

use serde_json::Value;

use crate::agents::render_json;

pub const ROOT_SYSTEM_PROMPT: &str = r#"You coordinate a clinical decision-support team for a hospital monitoring unit.

You receive questions from clinicians about patient status and risk. Decide what
analysis each question needs, delegate it to your team leads, then merge their
findings into one answer.

Rules:
- Patient safety comes first.
- Recommendations must be concrete and actionable.
- Show your reasoning and call out uncertainty.
- Flag anything that needs review by a human specialist.
- Weigh immediate risk alongside longer-term trends.

Answer with: a summary of findings, an overall risk level (Low, Medium, High or
Critical), specific recommendations, your confidence, and items for human review."#;

pub const TEAM_SYSTEM_PROMPT: &str = r#"You lead a small team of clinical analysts in a hospital monitoring unit.

You receive a task from the coordinator, split it across your analysts, and
merge what they report. Each analyst has one specialty such as population
statistics, an individual patient's chart, published research, or clinical
guidelines.

Rules:
- Make sure every relevant angle is covered.
- Point out where analysts agree and where they conflict.
- Separate well-supported conclusions from tentative ones.
- Keep the output clinically relevant.

Answer with: the work split, each analyst's key finding, the merged insight,
your confidence, and what the coordinator must know."#;

pub fn team_plan_prompt(query: &str, context: &Value, roster: &Value) -> String {
    format!(
        r#"Task from the coordinator: {query}

Context:
{context}

Analysts on your team:
{roster}

Plan the work:
1. What should each analyst look at?
2. Which parts can run in parallel and which depend on others?
3. What does a complete answer need to contain?

Reply with a short distribution plan."#,
        context = render_json(context),
        roster = render_json(roster),
    )
}

pub fn team_synthesis_prompt(query: &str, plan: &str, results: &Value) -> String {
    format!(
        r#"Original task: {query}

Your plan:
{plan}

Analyst reports (failed analysts are listed with their error):
{results}

Merge these reports:
1. Key insights from each analyst
2. Where findings agree
3. Where findings conflict, if anywhere
4. Overall assessment
5. How confident you are
6. What the coordinator should act on"#,
        results = render_json(results),
    )
}

pub fn delegation_prompt(query: &str, context: &Value, teams: &Value) -> String {
    format!(
        r#"Question from a clinician: {query}

Context:
{context}

Team leads available:
{teams}

Plan the delegation:
1. What kind of analysis does this question need?
2. Which teams should be involved?
3. What should each team investigate?
4. How should their findings be weighed?

Reply with a structured delegation plan."#,
        context = render_json(context),
        teams = render_json(teams),
    )
}

pub fn root_synthesis_prompt(query: &str, plan: &str, results: &Value) -> String {
    format!(
        r#"Original question: {query}

Your delegation plan:
{plan}

Team reports (failed teams are listed with their error):
{results}

Write the final answer:
1. Summary of what the teams found
2. Overall patient risk level with justification
3. Recommended actions in priority order
4. Confidence and its limits
5. Points that need human expert review"#,
        results = render_json(results),
    )
}
