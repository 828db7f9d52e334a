use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, warn};

use crate::agents::{AgentDeps, AgentInfo, AgentProfile, AgentStatus, QueryContext};
use crate::tasks::TaskKind;

/// Result of one child call, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChildOutcome {
    Success { result: Value },
    Error { error: String },
}

impl ChildOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ChildOutcome::Success { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub worker_id: String,
    pub worker_name: String,
    pub task: String,
    #[serde(flatten)]
    pub outcome: ChildOutcome,
}

impl WorkerReport {
    pub fn failed(worker: &WorkerAgent, error: impl Into<String>) -> Self {
        Self {
            worker_id: worker.profile.id.clone(),
            worker_name: worker.profile.name.clone(),
            task: worker.task.as_str().to_string(),
            outcome: ChildOutcome::Error {
                error: error.into(),
            },
        }
    }
}

/// Leaf agent bound to exactly one task handler.
pub struct WorkerAgent {
    pub profile: AgentProfile,
    task: TaskKind,
    deps: AgentDeps,
}

impl WorkerAgent {
    /// Unknown or missing task names fall back to the default task so the
    /// worker is always runnable.
    pub fn new(
        id: Option<&str>,
        name: &str,
        model: &str,
        task: Option<&str>,
        metadata: Map<String, Value>,
        deps: AgentDeps,
    ) -> Self {
        let kind = match task.map(str::trim).filter(|value| !value.is_empty()) {
            Some(requested) => TaskKind::parse(requested).unwrap_or_else(|| {
                warn!(
                    worker = name,
                    task = requested,
                    fallback = TaskKind::DEFAULT.as_str(),
                    "unknown task; using default"
                );
                TaskKind::DEFAULT
            }),
            None => TaskKind::DEFAULT,
        };

        Self {
            profile: AgentProfile::new(id, name, model, Some(kind.as_str()), metadata),
            task: kind,
            deps,
        }
    }

    pub fn task(&self) -> TaskKind {
        self.task
    }

    pub fn info(&self) -> AgentInfo {
        self.profile.info()
    }

    /// Never fails: handler errors come back as an error-tagged report.
    pub async fn execute(&self, query: &str, context: &QueryContext) -> WorkerReport {
        self.profile
            .transition(AgentStatus::Processing, "task_started");

        let outcome = match self
            .task
            .run(&self.deps, query, context, &self.profile.model)
            .await
        {
            Ok(result) => {
                self.profile
                    .transition(AgentStatus::Completed, "task_completed");
                ChildOutcome::Success { result }
            }
            Err(err) => {
                self.profile.transition(AgentStatus::Error, "task_failed");
                error!(
                    worker = %self.profile.name,
                    task = self.task.as_str(),
                    error = %err,
                    "worker task failed"
                );
                ChildOutcome::Error {
                    error: err.to_string(),
                }
            }
        };

        WorkerReport {
            worker_id: self.profile.id.clone(),
            worker_name: self.profile.name.clone(),
            task: self.task.as_str().to_string(),
            outcome,
        }
    }
}
