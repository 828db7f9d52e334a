//! Structural description of the agent tree, its validation, and
//! instantiation into live agents.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::agents::orchestrator::RootAgent;
use crate::agents::team::{TeamAgent, MIN_TEAM_WORKERS};
use crate::agents::worker::WorkerAgent;
use crate::agents::AgentDeps;
use crate::error::{MonitError, Result};
use crate::tasks::TaskKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    #[serde(alias = "orchestrator")]
    Root,
    #[serde(alias = "super")]
    Team,
    #[serde(alias = "utility")]
    Worker,
}

impl AgentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::Root => "root",
            AgentKind::Team => "team",
            AgentKind::Worker => "worker",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub agent_id: String,
    pub name: String,
    pub agent_type: AgentKind,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl AgentDescriptor {
    pub fn new(name: &str, agent_type: AgentKind, model: &str, task: Option<TaskKind>) -> Self {
        Self {
            agent_id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            agent_type,
            model: model.to_string(),
            task: task.map(|kind| kind.as_str().to_string()),
            metadata: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyConfig {
    pub config_id: String,
    pub name: String,
    #[serde(alias = "orchestrator")]
    pub root: AgentDescriptor,
    #[serde(alias = "super_agents")]
    pub teams: Vec<AgentDescriptor>,
    #[serde(alias = "utility_agents")]
    pub workers: Vec<AgentDescriptor>,
    /// team id -> ids of the workers it owns, in dispatch order.
    pub connections: BTreeMap<String, Vec<String>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub reason: String,
}

impl ValidationReport {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: "Hierarchy is valid".to_string(),
        }
    }

    fn rejected(reason: String) -> Self {
        Self {
            valid: false,
            reason,
        }
    }
}

/// Checks the structural rules in order and stops at the first violation.
pub fn validate_hierarchy(config: &HierarchyConfig) -> ValidationReport {
    match check(config) {
        Ok(()) => ValidationReport::ok(),
        Err(reason) => ValidationReport::rejected(reason),
    }
}

pub fn ensure_valid(config: &HierarchyConfig) -> Result<()> {
    check(config).map_err(MonitError::ConfigurationInvalid)
}

fn check(config: &HierarchyConfig) -> std::result::Result<(), String> {
    if config.root.agent_type != AgentKind::Root {
        return Err(format!(
            "Root agent '{}' must have agent_type 'root' (has '{}')",
            config.root.name,
            config.root.agent_type.as_str()
        ));
    }

    for team in &config.teams {
        if team.agent_type != AgentKind::Team {
            return Err(format!(
                "Team agent '{}' must have agent_type 'team' (has '{}')",
                team.name,
                team.agent_type.as_str()
            ));
        }
        let owned = config
            .connections
            .get(&team.agent_id)
            .map(Vec::len)
            .unwrap_or(0);
        if owned < MIN_TEAM_WORKERS {
            return Err(format!(
                "Team agent '{}' must own at least {MIN_TEAM_WORKERS} workers (has {owned})",
                team.name
            ));
        }
    }

    let mut declared = HashMap::<&str, &AgentDescriptor>::new();
    for descriptor in std::iter::once(&config.root)
        .chain(&config.teams)
        .chain(&config.workers)
    {
        if let Some(first) = declared.insert(descriptor.agent_id.as_str(), descriptor) {
            return Err(format!(
                "Duplicate agent_id '{}' shared by '{}' and '{}'",
                descriptor.agent_id, first.name, descriptor.name
            ));
        }
    }

    let workers_by_id = config
        .workers
        .iter()
        .map(|worker| (worker.agent_id.as_str(), worker))
        .collect::<HashMap<_, _>>();
    let mut owner_of = HashMap::<&str, &str>::new();
    for (team_id, worker_ids) in &config.connections {
        for worker_id in worker_ids {
            let Some(worker) = workers_by_id.get(worker_id.as_str()) else {
                return Err(format!(
                    "Connection for team '{team_id}' names unknown worker '{worker_id}'"
                ));
            };
            if owner_of.insert(worker_id.as_str(), team_id.as_str()).is_some() {
                return Err(format!(
                    "Worker agent '{}' is assigned to more than one team",
                    worker.name
                ));
            }
        }
    }
    let mut unassigned = config
        .workers
        .iter()
        .filter(|worker| !owner_of.contains_key(worker.agent_id.as_str()))
        .map(|worker| worker.name.as_str())
        .collect::<Vec<_>>();
    if !unassigned.is_empty() {
        unassigned.sort_unstable();
        return Err(format!(
            "Worker agents not assigned to any team: {}",
            unassigned.join(", ")
        ));
    }

    for worker in &config.workers {
        if worker.agent_type != AgentKind::Worker {
            return Err(format!(
                "Worker agent '{}' must have agent_type 'worker' (has '{}')",
                worker.name,
                worker.agent_type.as_str()
            ));
        }
    }

    let team_ids = config
        .teams
        .iter()
        .map(|team| team.agent_id.as_str())
        .collect::<HashSet<_>>();
    if let Some(team_id) = config
        .connections
        .keys()
        .find(|team_id| !team_ids.contains(team_id.as_str()))
    {
        return Err(format!("Connections reference unknown team '{team_id}'"));
    }

    for worker in &config.workers {
        if let Some(task) = worker.task.as_deref() {
            if TaskKind::parse(task).is_none() {
                return Err(format!(
                    "Worker agent '{}' has unknown task '{task}'",
                    worker.name
                ));
            }
        }
    }

    Ok(())
}

/// One root, two teams of two workers each.
pub fn default_configuration(model: &str) -> HierarchyConfig {
    let root = AgentDescriptor::new("Main Orchestrator", AgentKind::Root, model, None);
    let teams = vec![
        AgentDescriptor::new("Medical Analysis Team", AgentKind::Team, model, None),
        AgentDescriptor::new("Research Team", AgentKind::Team, model, None),
    ];
    let workers = [
        ("Patient Data Analyst", TaskKind::StudyPatientData),
        ("Individual Care Specialist", TaskKind::StudyIndividualData),
        ("External Research Analyst", TaskKind::CompareExternalResearch),
        ("Guidelines Specialist", TaskKind::StudyMedicalGuidelines),
    ]
    .into_iter()
    .map(|(name, task)| AgentDescriptor::new(name, AgentKind::Worker, model, Some(task)))
    .collect::<Vec<_>>();

    let connections = teams
        .iter()
        .zip(workers.chunks(2))
        .map(|(team, owned)| {
            (
                team.agent_id.clone(),
                owned.iter().map(|worker| worker.agent_id.clone()).collect(),
            )
        })
        .collect();

    let now = Utc::now();
    HierarchyConfig {
        config_id: Uuid::new_v4().to_string(),
        name: "Default Configuration".to_string(),
        root,
        teams,
        workers,
        connections,
        created_at: now,
        updated_at: now,
    }
}

/// Builds the full agent tree. Nothing is returned unless the configuration
/// validates and every team is wired.
pub fn instantiate(config: &HierarchyConfig, deps: &AgentDeps) -> Result<RootAgent> {
    ensure_valid(config)?;

    let workers_by_id = config
        .workers
        .iter()
        .map(|worker| (worker.agent_id.as_str(), worker))
        .collect::<HashMap<_, _>>();

    let mut root = RootAgent::new(
        Some(config.root.agent_id.as_str()),
        &config.root.name,
        &config.root.model,
        config.root.metadata.clone(),
        deps.clone(),
    );

    for team_config in &config.teams {
        let mut team = TeamAgent::new(
            Some(team_config.agent_id.as_str()),
            &team_config.name,
            &team_config.model,
            team_config.metadata.clone(),
            deps.clone(),
        );
        let worker_ids = config
            .connections
            .get(&team_config.agent_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for worker_id in worker_ids {
            let worker_config = workers_by_id.get(worker_id.as_str()).ok_or_else(|| {
                MonitError::ConfigurationInvalid(format!("unknown worker '{worker_id}'"))
            })?;
            if worker_config.task.is_none() {
                info!(
                    worker = %worker_config.name,
                    task = TaskKind::DEFAULT.as_str(),
                    "worker has no task; using default"
                );
            }
            team.add_worker(WorkerAgent::new(
                Some(worker_config.agent_id.as_str()),
                &worker_config.name,
                &worker_config.model,
                worker_config.task.as_deref(),
                worker_config.metadata.clone(),
                deps.clone(),
            ));
        }
        root.add_team(team);
    }

    info!(
        config_id = %config.config_id,
        teams = config.teams.len(),
        workers = config.workers.len(),
        "agent hierarchy instantiated"
    );
    Ok(root)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::db::SqliteRecordStore;
    use crate::test_support::{setup_test_pool, ScriptedInference};

    fn worker_named<'a>(config: &'a HierarchyConfig, name: &str) -> &'a AgentDescriptor {
        config
            .workers
            .iter()
            .find(|worker| worker.name == name)
            .expect("worker should exist")
    }

    #[test]
    fn default_configuration_is_valid() {
        let config = default_configuration("gemini-2.0-flash-exp");
        let report = validate_hierarchy(&config);
        assert!(report.valid, "{}", report.reason);
        assert_eq!(config.teams.len(), 2);
        assert_eq!(config.workers.len(), 4);

        let medical = &config.connections[&config.teams[0].agent_id];
        assert_eq!(medical[0], worker_named(&config, "Patient Data Analyst").agent_id);
        assert_eq!(medical[1], worker_named(&config, "Individual Care Specialist").agent_id);
    }

    #[test]
    fn team_with_one_worker_is_rejected_by_name() {
        let mut config = default_configuration("m");
        let team_id = config.teams[0].agent_id.clone();
        let moved = config
            .connections
            .get_mut(&team_id)
            .and_then(Vec::pop)
            .expect("team should own workers");
        config
            .connections
            .entry(config.teams[1].agent_id.clone())
            .or_default()
            .push(moved);

        let report = validate_hierarchy(&config);
        assert!(!report.valid);
        assert!(report.reason.contains("Medical Analysis Team"));
        assert!(report.reason.contains("has 1"));
    }

    #[test]
    fn unassigned_worker_is_rejected_by_name() {
        let mut config = default_configuration("m");
        let mut extra = AgentDescriptor::new("Night Shift Analyst", AgentKind::Worker, "m", None);
        extra.agent_id = "w-extra".to_string();
        config.workers.push(extra);

        let report = validate_hierarchy(&config);
        assert!(!report.valid);
        assert!(report.reason.contains("Night Shift Analyst"));
    }

    #[test]
    fn double_assignment_is_rejected() {
        let mut config = default_configuration("m");
        let shared = config.workers[0].agent_id.clone();
        let second_team = config.teams[1].agent_id.clone();
        config
            .connections
            .get_mut(&second_team)
            .expect("team should own workers")
            .push(shared);

        let report = validate_hierarchy(&config);
        assert!(!report.valid);
        assert!(report.reason.contains("more than one team"));
    }

    #[test]
    fn wrong_root_type_is_checked_first() {
        let mut config = default_configuration("m");
        config.root.agent_type = AgentKind::Team;
        config.connections.clear();

        let report = validate_hierarchy(&config);
        assert!(!report.valid);
        assert!(report.reason.starts_with("Root agent 'Main Orchestrator'"));
    }

    #[test]
    fn unknown_task_and_unknown_team_are_rejected() {
        let mut config = default_configuration("m");
        config.workers[3].task = Some("divine_outcome".to_string());
        let report = validate_hierarchy(&config);
        assert!(!report.valid);
        assert!(report.reason.contains("divine_outcome"));

        let mut config = default_configuration("m");
        let ids = config.workers[..2]
            .iter()
            .map(|worker| worker.agent_id.clone())
            .collect::<Vec<_>>();
        config.connections.insert("ghost-team".to_string(), ids);
        let report = validate_hierarchy(&config);
        assert!(!report.valid);
    }

    #[test]
    fn duplicate_team_id_is_rejected_by_name() {
        let mut config = default_configuration("m");
        let first_id = config.teams[0].agent_id.clone();
        let second_id = std::mem::replace(&mut config.teams[1].agent_id, first_id.clone());
        let moved = config
            .connections
            .remove(&second_id)
            .expect("second team should own workers");
        config
            .connections
            .get_mut(&first_id)
            .expect("first team should own workers")
            .extend(moved);

        let report = validate_hierarchy(&config);
        assert!(!report.valid);
        assert!(report.reason.contains("Duplicate agent_id"));
        assert!(report.reason.contains("Medical Analysis Team"));
        assert!(report.reason.contains("Research Team"));
    }

    #[tokio::test]
    async fn duplicate_worker_id_is_rejected_before_instantiation() {
        let mut config = default_configuration("m");
        let mut twin = config.workers[0].clone();
        twin.name = "Patient Data Analyst (copy)".to_string();
        config.workers.push(twin);

        let report = validate_hierarchy(&config);
        assert!(!report.valid);
        assert!(report.reason.contains("Patient Data Analyst (copy)"));

        let deps = AgentDeps {
            inference: Arc::new(ScriptedInference::new()),
            store: Arc::new(SqliteRecordStore::new(setup_test_pool().await)),
            worker_timeout: Duration::from_secs(1),
            team_timeout: Duration::from_secs(1),
        };
        assert!(matches!(
            instantiate(&config, &deps),
            Err(MonitError::ConfigurationInvalid(_))
        ));
    }

    #[test]
    fn legacy_field_names_deserialize() {
        let config: HierarchyConfig = serde_json::from_value(json!({
            "config_id": "c-1",
            "name": "Legacy",
            "orchestrator": {"agent_id": "o", "name": "Boss", "agent_type": "orchestrator", "model": "m"},
            "super_agents": [{"agent_id": "s", "name": "Lead", "agent_type": "super", "model": "m"}],
            "utility_agents": [
                {"agent_id": "u1", "name": "A", "agent_type": "utility", "model": "m", "task": "predict_deterioration"},
                {"agent_id": "u2", "name": "B", "agent_type": "utility", "model": "m"}
            ],
            "connections": {"s": ["u1", "u2"]}
        }))
        .expect("legacy config should parse");

        assert_eq!(config.root.agent_type, AgentKind::Root);
        assert!(validate_hierarchy(&config).valid);
    }

    #[tokio::test]
    async fn instantiate_wires_declared_counts_and_connections() {
        let config = default_configuration("m");
        let deps = AgentDeps {
            inference: Arc::new(ScriptedInference::new()),
            store: Arc::new(SqliteRecordStore::new(setup_test_pool().await)),
            worker_timeout: Duration::from_secs(1),
            team_timeout: Duration::from_secs(1),
        };

        let root = instantiate(&config, &deps).expect("default config should instantiate");

        assert_eq!(root.profile.id, config.root.agent_id);
        assert_eq!(root.teams().len(), 2);
        for team in root.teams() {
            let declared = &config.connections[&team.profile.id];
            let wired = team
                .workers()
                .iter()
                .map(|worker| worker.profile.id.clone())
                .collect::<Vec<_>>();
            assert_eq!(&wired, declared);
        }
        assert_eq!(
            root.teams()[1].workers()[0].task(),
            TaskKind::CompareExternalResearch
        );
    }

    #[tokio::test]
    async fn instantiate_refuses_invalid_configuration() {
        let mut config = default_configuration("m");
        config.connections.clear();
        let deps = AgentDeps {
            inference: Arc::new(ScriptedInference::new()),
            store: Arc::new(SqliteRecordStore::new(setup_test_pool().await)),
            worker_timeout: Duration::from_secs(1),
            team_timeout: Duration::from_secs(1),
        };

        let result = instantiate(&config, &deps);
        assert!(matches!(result, Err(MonitError::ConfigurationInvalid(_))));
    }
}
