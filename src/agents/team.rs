use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{error, info};

use crate::agents::prompts::{team_plan_prompt, team_synthesis_prompt, TEAM_SYSTEM_PROMPT};
use crate::agents::worker::{WorkerAgent, WorkerReport};
use crate::agents::{fan_out, AgentDeps, AgentInfo, AgentProfile, AgentStatus, QueryContext};
use crate::error::{MonitError, Result};
use crate::llm_adapter::InferenceRequest;

pub const MIN_TEAM_WORKERS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TeamOutcome {
    Success {
        plan: String,
        worker_results: Vec<WorkerReport>,
        synthesis: String,
    },
    Error {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamReport {
    pub team_id: String,
    pub team_name: String,
    #[serde(flatten)]
    pub outcome: TeamOutcome,
}

impl TeamReport {
    pub fn failed(team: &TeamAgent, error: impl Into<String>) -> Self {
        Self {
            team_id: team.profile.id.clone(),
            team_name: team.profile.name.clone(),
            outcome: TeamOutcome::Error {
                error: error.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TeamOutcome::Success { .. })
    }

    /// True when the team succeeded and none of its workers reported an error.
    pub fn is_clean(&self) -> bool {
        match &self.outcome {
            TeamOutcome::Success { worker_results, .. } => worker_results
                .iter()
                .all(|report| report.outcome.is_success()),
            TeamOutcome::Error { .. } => false,
        }
    }
}

/// Middle tier: plans, fans out to its workers, and synthesizes what they return.
pub struct TeamAgent {
    pub profile: AgentProfile,
    workers: Vec<Arc<WorkerAgent>>,
    deps: AgentDeps,
}

impl TeamAgent {
    pub fn new(
        id: Option<&str>,
        name: &str,
        model: &str,
        metadata: Map<String, Value>,
        deps: AgentDeps,
    ) -> Self {
        Self {
            profile: AgentProfile::new(id, name, model, None, metadata),
            workers: Vec::new(),
            deps,
        }
    }

    pub fn add_worker(&mut self, worker: WorkerAgent) {
        info!(team = %self.profile.name, worker = %worker.profile.name, "worker added to team");
        self.workers.push(Arc::new(worker));
    }

    /// Detaches a worker by id. A team never drops below its minimum size.
    pub fn remove_worker(&mut self, worker_id: &str) -> Result<Arc<WorkerAgent>> {
        let position = self
            .workers
            .iter()
            .position(|worker| worker.profile.id == worker_id)
            .ok_or_else(|| MonitError::NotFound(format!("worker '{worker_id}'")))?;
        if self.workers.len() <= MIN_TEAM_WORKERS {
            return Err(MonitError::ConfigurationInvalid(format!(
                "team '{}' must keep at least {MIN_TEAM_WORKERS} workers",
                self.profile.name
            )));
        }
        Ok(self.workers.remove(position))
    }

    pub fn workers(&self) -> &[Arc<WorkerAgent>] {
        &self.workers
    }

    pub fn info(&self) -> AgentInfo {
        self.profile.info()
    }

    fn roster(&self) -> Value {
        Value::Array(
            self.workers
                .iter()
                .map(|worker| {
                    json!({
                        "worker_id": worker.profile.id,
                        "name": worker.profile.name,
                        "task": worker.task().as_str(),
                    })
                })
                .collect(),
        )
    }

    async fn generate(&self, prompt: String, context: &QueryContext) -> Result<String> {
        let request = InferenceRequest::new(prompt, self.profile.model.clone())
            .with_system_instruction(TEAM_SYSTEM_PROMPT)
            .with_context(Value::Object(context.clone()));
        self.deps.inference.generate(request).await
    }

    /// Worker failures are recorded in `worker_results`; only a failed plan or
    /// synthesis call makes the team report an error.
    pub async fn execute(&self, query: &str, context: &QueryContext) -> TeamReport {
        self.profile
            .transition(AgentStatus::Processing, "task_received");

        match self.run(query, context).await {
            Ok(outcome) => {
                self.profile
                    .transition(AgentStatus::Completed, "task_completed");
                TeamReport {
                    team_id: self.profile.id.clone(),
                    team_name: self.profile.name.clone(),
                    outcome,
                }
            }
            Err(err) => {
                self.profile.transition(AgentStatus::Error, "task_failed");
                error!(team = %self.profile.name, error = %err, "team execution failed");
                TeamReport::failed(self, err.to_string())
            }
        }
    }

    async fn run(&self, query: &str, context: &QueryContext) -> Result<TeamOutcome> {
        let context_value = Value::Object(context.clone());
        let plan = self
            .generate(team_plan_prompt(query, &context_value, &self.roster()), context)
            .await?;

        let worker_results = self.dispatch(query, context).await;
        let failed = worker_results
            .iter()
            .filter(|report| !report.outcome.is_success())
            .count();
        info!(
            team = %self.profile.name,
            workers = worker_results.len(),
            failed,
            "worker fan-out finished"
        );

        let results_value = serde_json::to_value(&worker_results)?;
        let synthesis = self
            .generate(team_synthesis_prompt(query, &plan, &results_value), context)
            .await?;

        Ok(TeamOutcome::Success {
            plan,
            worker_results,
            synthesis,
        })
    }

    async fn dispatch(&self, query: &str, context: &QueryContext) -> Vec<WorkerReport> {
        let outcomes = fan_out(&self.workers, self.deps.worker_timeout, |worker| {
            let query = query.to_string();
            let context = context.clone();
            async move { worker.execute(&query, &context).await }
        })
        .await;

        outcomes
            .into_iter()
            .zip(&self.workers)
            .map(|(outcome, worker)| {
                outcome.unwrap_or_else(|err| {
                    error!(worker = %worker.profile.name, error = %err, "worker did not finish");
                    worker.profile.transition(AgentStatus::Error, "task_timed_out");
                    WorkerReport::failed(worker, err.to_string())
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::agents::worker::ChildOutcome;
    use crate::db::SqliteRecordStore;
    use crate::test_support::{setup_test_pool, ScriptedInference};

    async fn team_with(
        inference: Arc<ScriptedInference>,
        tasks: &[&str],
        worker_timeout: Duration,
    ) -> TeamAgent {
        let deps = AgentDeps {
            inference,
            store: Arc::new(SqliteRecordStore::new(setup_test_pool().await)),
            worker_timeout,
            team_timeout: Duration::from_secs(10),
        };
        let mut team = TeamAgent::new(Some("team-1"), "Medical Analysis Team", "m", Map::new(), deps.clone());
        for (index, task) in tasks.iter().enumerate() {
            team.add_worker(WorkerAgent::new(
                Some(format!("w-{index}").as_str()),
                &format!("Worker {index}"),
                "m",
                Some(*task),
                Map::new(),
                deps.clone(),
            ));
        }
        team
    }

    #[tokio::test]
    async fn one_failing_worker_does_not_fail_the_team() {
        let inference = Arc::new(ScriptedInference::new().fail_on("clinical practice guidelines"));
        let team = team_with(
            Arc::clone(&inference),
            &["study_patient_data", "study_medical_guidelines", "compare_internal_research"],
            Duration::from_secs(5),
        )
        .await;

        let report = team.execute("Assess ward risk", &QueryContext::new()).await;

        let TeamOutcome::Success { worker_results, synthesis, .. } = &report.outcome else {
            panic!("team should succeed, got {report:?}");
        };
        assert_eq!(worker_results.len(), 3);
        assert!(worker_results[0].outcome.is_success());
        assert!(matches!(worker_results[1].outcome, ChildOutcome::Error { .. }));
        assert!(worker_results[2].outcome.is_success());
        assert!(synthesis.starts_with("scripted response"));
        assert!(!report.is_clean());
        assert_eq!(team.profile.status(), AgentStatus::Completed);
    }

    #[tokio::test]
    async fn team_still_synthesizes_when_every_worker_fails() {
        let inference = Arc::new(ScriptedInference::new());
        let team = team_with(
            Arc::clone(&inference),
            &["study_individual_data", "study_individual_data"],
            Duration::from_secs(5),
        )
        .await;

        let report = team.execute("Review patient", &QueryContext::new()).await;

        assert!(report.is_success());
        // plan + synthesis; the workers never reach inference without a patient id
        assert_eq!(inference.call_count(), 2);
        assert_eq!(inference.prompts_containing("Analyst reports"), 1);
    }

    #[tokio::test]
    async fn synthesis_failure_marks_team_error() {
        let inference = Arc::new(ScriptedInference::new().fail_on("Merge these reports"));
        let team = team_with(
            Arc::clone(&inference),
            &["study_patient_data", "predict_deterioration"],
            Duration::from_secs(5),
        )
        .await;

        let report = team.execute("Assess", &QueryContext::new()).await;

        assert!(matches!(report.outcome, TeamOutcome::Error { .. }));
        assert_eq!(team.profile.status(), AgentStatus::Error);
        let serialized = serde_json::to_value(&report).expect("report should serialize");
        assert_eq!(serialized["status"], "error");
        assert_eq!(serialized["team_name"], "Medical Analysis Team");
    }

    #[tokio::test]
    async fn slow_worker_times_out_in_its_own_slot() {
        let inference = Arc::new(
            ScriptedInference::new().delay_on("whole monitored patient population", Duration::from_millis(500)),
        );
        let team = team_with(
            Arc::clone(&inference),
            &["study_patient_data", "study_medical_guidelines"],
            Duration::from_millis(100),
        )
        .await;

        let report = team.execute("Assess", &QueryContext::new()).await;

        let TeamOutcome::Success { worker_results, .. } = &report.outcome else {
            panic!("team should succeed, got {report:?}");
        };
        assert_eq!(worker_results[0].worker_id, "w-0");
        match &worker_results[0].outcome {
            ChildOutcome::Error { error } => assert!(error.contains("timed out")),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(worker_results[1].outcome.is_success());
        assert_eq!(team.workers()[0].profile.status(), AgentStatus::Error);

        // the abandoned call never comes back to flip the status
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(team.workers()[0].profile.status(), AgentStatus::Error);
        assert_eq!(team.workers()[1].profile.status(), AgentStatus::Completed);
    }

    #[tokio::test]
    async fn remove_worker_keeps_minimum_team_size() {
        let team_inference = Arc::new(ScriptedInference::new());
        let mut team = team_with(
            team_inference,
            &["study_patient_data", "predict_deterioration", "compare_internal_research"],
            Duration::from_secs(5),
        )
        .await;

        let removed = team.remove_worker("w-2").expect("third worker can be removed");
        assert_eq!(removed.profile.id, "w-2");
        assert!(matches!(
            team.remove_worker("w-0"),
            Err(MonitError::ConfigurationInvalid(_))
        ));
        assert!(matches!(team.remove_worker("ghost"), Err(MonitError::NotFound(_))));
        assert_eq!(team.workers().len(), 2);
    }
}
