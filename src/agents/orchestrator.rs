use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{error, info};

use crate::agents::prompts::{delegation_prompt, root_synthesis_prompt, ROOT_SYSTEM_PROMPT};
use crate::agents::team::{TeamAgent, TeamReport};
use crate::agents::{fan_out, AgentDeps, AgentInfo, AgentProfile, AgentStatus, QueryContext};
use crate::error::{MonitError, Result};
use crate::llm_adapter::InferenceRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// `high` when every team and worker succeeded, `low` when at most half
    /// of the teams succeeded, `medium` otherwise.
    pub fn from_reports(reports: &[TeamReport]) -> Self {
        let succeeded = reports.iter().filter(|report| report.is_success()).count();
        if !reports.is_empty() && reports.iter().all(TeamReport::is_clean) {
            Confidence::High
        } else if succeeded * 2 <= reports.len() {
            Confidence::Low
        } else {
            Confidence::Medium
        }
    }
}

/// Final answer to a query, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    Success {
        orchestrator: String,
        delegation_plan: String,
        team_results: Vec<TeamReport>,
        final_response: String,
        confidence: Confidence,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        orchestrator: Option<String>,
        error: String,
    },
}

impl QueryOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        QueryOutcome::Error {
            orchestrator: None,
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, QueryOutcome::Success { .. })
    }
}

/// Top tier: delegates to every team and merges their reports into one answer.
pub struct RootAgent {
    pub profile: AgentProfile,
    teams: Vec<Arc<TeamAgent>>,
    deps: AgentDeps,
}

impl RootAgent {
    pub fn new(
        id: Option<&str>,
        name: &str,
        model: &str,
        metadata: Map<String, Value>,
        deps: AgentDeps,
    ) -> Self {
        Self {
            profile: AgentProfile::new(id, name, model, None, metadata),
            teams: Vec::new(),
            deps,
        }
    }

    pub fn add_team(&mut self, team: TeamAgent) {
        info!(root = %self.profile.name, team = %team.profile.name, "team added to root");
        self.teams.push(Arc::new(team));
    }

    pub fn remove_team(&mut self, team_id: &str) -> Result<Arc<TeamAgent>> {
        let position = self
            .teams
            .iter()
            .position(|team| team.profile.id == team_id)
            .ok_or_else(|| MonitError::NotFound(format!("team '{team_id}'")))?;
        Ok(self.teams.remove(position))
    }

    pub fn teams(&self) -> &[Arc<TeamAgent>] {
        &self.teams
    }

    pub fn info(&self) -> AgentInfo {
        self.profile.info()
    }

    async fn generate(&self, prompt: String, context: &QueryContext) -> Result<String> {
        let request = InferenceRequest::new(prompt, self.profile.model.clone())
            .with_system_instruction(ROOT_SYSTEM_PROMPT)
            .with_context(Value::Object(context.clone()));
        self.deps.inference.generate(request).await
    }

    pub async fn execute(&self, query: &str, context: &QueryContext) -> QueryOutcome {
        self.profile
            .transition(AgentStatus::Processing, "query_received");

        match self.run(query, context).await {
            Ok(outcome) => {
                self.profile
                    .transition(AgentStatus::Completed, "query_completed");
                outcome
            }
            Err(err) => {
                self.profile.transition(AgentStatus::Error, "query_failed");
                error!(root = %self.profile.name, error = %err, "root execution failed");
                QueryOutcome::Error {
                    orchestrator: Some(self.profile.name.clone()),
                    error: err.to_string(),
                }
            }
        }
    }

    async fn run(&self, query: &str, context: &QueryContext) -> Result<QueryOutcome> {
        let teams = Value::Array(
            self.teams
                .iter()
                .map(|team| {
                    json!({
                        "team_id": team.profile.id,
                        "name": team.profile.name,
                        "workers": team.workers().len(),
                    })
                })
                .collect(),
        );
        let delegation_plan = self
            .generate(
                delegation_prompt(query, &Value::Object(context.clone()), &teams),
                context,
            )
            .await?;

        let team_results = self.dispatch(query, context).await;
        let confidence = Confidence::from_reports(&team_results);
        info!(
            root = %self.profile.name,
            teams = team_results.len(),
            confidence = ?confidence,
            "team fan-out finished"
        );

        let results_value = serde_json::to_value(&team_results)?;
        let final_response = self
            .generate(
                root_synthesis_prompt(query, &delegation_plan, &results_value),
                context,
            )
            .await?;

        Ok(QueryOutcome::Success {
            orchestrator: self.profile.name.clone(),
            delegation_plan,
            team_results,
            final_response,
            confidence,
        })
    }

    async fn dispatch(&self, query: &str, context: &QueryContext) -> Vec<TeamReport> {
        let outcomes = fan_out(&self.teams, self.deps.team_timeout, |team| {
            let query = query.to_string();
            let context = context.clone();
            async move { team.execute(&query, &context).await }
        })
        .await;

        outcomes
            .into_iter()
            .zip(&self.teams)
            .map(|(outcome, team)| {
                outcome.unwrap_or_else(|err| {
                    error!(team = %team.profile.name, error = %err, "team did not finish");
                    team.profile.transition(AgentStatus::Error, "team_timed_out");
                    TeamReport::failed(team, err.to_string())
                })
            })
            .collect()
    }
}
