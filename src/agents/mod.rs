pub mod orchestrator;
pub mod prompts;
pub mod team;
pub mod worker;

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::db::RecordStore;
use crate::error::MonitError;
use crate::llm_adapter::InferenceService;

/// Free-form key/value context passed down the hierarchy with a query.
pub type QueryContext = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Initialized,
    Processing,
    Completed,
    Error,
}

impl AgentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Initialized => "initialized",
            AgentStatus::Processing => "processing",
            AgentStatus::Completed => "completed",
            AgentStatus::Error => "error",
        }
    }
}

/// Snapshot of one agent, as reported by the coordination status view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub agent_id: String,
    pub name: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    pub status: AgentStatus,
    pub created_at: DateTime<Utc>,
    pub metadata: Map<String, Value>,
}

/// Identity and lifecycle state shared by all three tiers.
#[derive(Debug)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    pub model: String,
    pub task: Option<String>,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    status: RwLock<AgentStatus>,
}

impl AgentProfile {
    pub fn new(
        id: Option<&str>,
        name: &str,
        model: &str,
        task: Option<&str>,
        metadata: Map<String, Value>,
    ) -> Self {
        let id = id
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            id,
            name: name.trim().to_string(),
            model: model.trim().to_string(),
            task: task.map(ToString::to_string),
            metadata,
            created_at: Utc::now(),
            status: RwLock::new(AgentStatus::Initialized),
        }
    }

    pub fn status(&self) -> AgentStatus {
        match self.status.read() {
            Ok(status) => *status,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Records a lifecycle transition together with the activity that caused it.
    pub fn transition(&self, status: AgentStatus, activity: &str) {
        match self.status.write() {
            Ok(mut current) => *current = status,
            Err(poisoned) => *poisoned.into_inner() = status,
        }
        debug!(
            agent_id = %self.id,
            agent_name = %self.name,
            status = status.as_str(),
            activity,
            "agent status changed"
        );
    }

    pub fn info(&self) -> AgentInfo {
        AgentInfo {
            agent_id: self.id.clone(),
            name: self.name.clone(),
            model: self.model.clone(),
            task: self.task.clone(),
            status: self.status(),
            created_at: self.created_at,
            metadata: self.metadata.clone(),
        }
    }
}

/// Collaborators every tier needs, cloned into each spawned child call.
#[derive(Clone)]
pub struct AgentDeps {
    pub inference: Arc<dyn InferenceService>,
    pub store: Arc<dyn RecordStore>,
    pub worker_timeout: Duration,
    pub team_timeout: Duration,
}

/// Runs `run` for every child concurrently, each under `limit`, and returns
/// the outcomes in the children's declared order. A timeout or a panicked
/// task occupies its own slot as `ChildExecutionFailed`; siblings are never
/// cancelled.
pub(crate) async fn fan_out<C, T, F, Fut>(
    children: &[Arc<C>],
    limit: Duration,
    run: F,
) -> Vec<Result<T, MonitError>>
where
    C: Send + Sync + 'static,
    T: Send + 'static,
    F: Fn(Arc<C>) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
{
    let handles = children
        .iter()
        .map(|child| {
            let call = run(Arc::clone(child));
            tokio::spawn(tokio::time::timeout(limit, call))
        })
        .collect::<Vec<_>>();

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        let outcome = match handle.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(MonitError::ChildExecutionFailed(format!(
                "timed out after {}s",
                limit.as_secs_f64()
            ))),
            Err(join_error) => Err(MonitError::ChildExecutionFailed(format!(
                "child task aborted: {join_error}"
            ))),
        };
        outcomes.push(outcome);
    }
    outcomes
}

/// Pretty JSON for prompt embedding; falls back to compact form.
pub(crate) fn render_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .or_else(|_| serde_json::to_string(value))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn profile_generates_id_when_missing() {
        let profile = AgentProfile::new(None, " Analyst ", "m", None, Map::new());
        assert!(!profile.id.is_empty());
        assert_eq!(profile.name, "Analyst");
        assert_eq!(profile.status(), AgentStatus::Initialized);

        profile.transition(AgentStatus::Processing, "task_started");
        assert_eq!(profile.info().status, AgentStatus::Processing);
    }

    #[tokio::test]
    async fn fan_out_preserves_declared_order_despite_completion_order() {
        let children = vec![Arc::new(30_u64), Arc::new(1_u64), Arc::new(10_u64)];
        let completed = Arc::new(AtomicUsize::new(0));

        let outcomes = fan_out(&children, Duration::from_secs(5), |delay| {
            let completed = Arc::clone(&completed);
            async move {
                tokio::time::sleep(Duration::from_millis(*delay)).await;
                completed.fetch_add(1, Ordering::SeqCst);
                *delay
            }
        })
        .await;

        let values = outcomes
            .into_iter()
            .map(|outcome| outcome.expect("child should succeed"))
            .collect::<Vec<_>>();
        assert_eq!(values, vec![30, 1, 10]);
        assert_eq!(completed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fan_out_records_timeout_without_cancelling_siblings() {
        let children = vec![Arc::new(500_u64), Arc::new(1_u64)];

        let outcomes = fan_out(&children, Duration::from_millis(50), |delay| async move {
            tokio::time::sleep(Duration::from_millis(*delay)).await;
            *delay
        })
        .await;

        assert!(matches!(outcomes[0], Err(MonitError::ChildExecutionFailed(_))));
        assert_eq!(outcomes[1].as_ref().ok(), Some(&1));
    }
}
