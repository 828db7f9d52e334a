//! Owns the live agent hierarchy and is the single entry point for queries.
//!
//! The live tree sits behind an `Arc` that is swapped wholesale on
//! `initialize`; a query clones the `Arc` before executing, so a concurrent
//! re-initialization never touches a tree that is mid-query.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::agents::orchestrator::{QueryOutcome, RootAgent};
use crate::agents::{AgentDeps, AgentInfo, QueryContext};
use crate::db::AGENT_CONFIGURATIONS;
use crate::error::Result;
use crate::hierarchy::{
    default_configuration, ensure_valid, instantiate, validate_hierarchy, HierarchyConfig,
};

pub struct LiveHierarchy {
    pub config: HierarchyConfig,
    pub root: RootAgent,
}

enum HierarchyState {
    Uninitialized,
    Live(Arc<LiveHierarchy>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamStatus {
    #[serde(flatten)]
    pub team: AgentInfo,
    pub workers: Vec<AgentInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HierarchyStatus {
    NotInitialized,
    Active {
        config_id: String,
        config_name: String,
        root: AgentInfo,
        teams: Vec<TeamStatus>,
    },
}

pub struct CoordinationService {
    deps: AgentDeps,
    default_model: String,
    state: RwLock<HierarchyState>,
    bootstrap: Mutex<()>,
}

impl CoordinationService {
    pub fn new(deps: AgentDeps, default_model: &str) -> Self {
        Self {
            deps,
            default_model: default_model.to_string(),
            state: RwLock::new(HierarchyState::Uninitialized),
            bootstrap: Mutex::new(()),
        }
    }

    /// The requested (or most recent) stored configuration that validates.
    /// Falls back to a freshly persisted default.
    pub async fn load_configuration(&self, config_id: Option<&str>) -> Result<HierarchyConfig> {
        let rows = match self.deps.store.read(AGENT_CONFIGURATIONS).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(error = %err, "could not read stored configurations");
                Vec::new()
            }
        };

        for row in rows.iter().rev() {
            if let Some(wanted) = config_id {
                if row.get("config_id").and_then(Value::as_str) != Some(wanted) {
                    continue;
                }
            }
            let Some(stored) = row.get("config") else {
                continue;
            };
            match serde_json::from_value::<HierarchyConfig>(stored.clone()) {
                Ok(config) => {
                    let report = validate_hierarchy(&config);
                    if report.valid {
                        return Ok(config);
                    }
                    warn!(config_id = %config.config_id, reason = %report.reason, "stored configuration is invalid");
                }
                Err(err) => warn!(error = %err, "stored configuration does not parse"),
            }
        }

        let config = default_configuration(&self.default_model);
        info!(config_id = %config.config_id, requested = ?config_id, "using default configuration");
        if let Err(err) = self.save_configuration(&config).await {
            warn!(error = %err, "could not persist default configuration");
        }
        Ok(config)
    }

    pub async fn save_configuration(&self, config: &HierarchyConfig) -> Result<()> {
        ensure_valid(config)?;
        self.deps
            .store
            .append(
                AGENT_CONFIGURATIONS,
                json!({
                    "config_id": config.config_id,
                    "name": config.name,
                    "config": serde_json::to_value(config)?,
                    "created_at": Utc::now(),
                }),
            )
            .await
    }

    /// Builds a new tree from `config` and swaps it in. On failure the
    /// previous tree, if any, stays live.
    pub async fn initialize(&self, config: HierarchyConfig) -> Result<()> {
        let root = instantiate(&config, &self.deps)?;
        let config_id = config.config_id.clone();
        let live = Arc::new(LiveHierarchy { config, root });
        *self.state.write().await = HierarchyState::Live(live);
        info!(config_id = %config_id, "agent hierarchy is live");
        Ok(())
    }

    /// Validate, persist, then go live.
    pub async fn configure(&self, mut config: HierarchyConfig) -> Result<()> {
        ensure_valid(&config)?;
        config.updated_at = Utc::now();
        self.save_configuration(&config).await?;
        self.initialize(config).await
    }

    /// Never fails: initialization and execution errors come back as an
    /// error-tagged outcome.
    pub async fn process_query(&self, query: &str, context: QueryContext) -> QueryOutcome {
        let live = match self.live_or_bootstrap().await {
            Ok(live) => live,
            Err(err) => {
                error!(error = %err, "agent hierarchy could not be initialized");
                return QueryOutcome::failed(err.to_string());
            }
        };
        live.root.execute(query, &context).await
    }

    pub async fn current_configuration(&self) -> Option<HierarchyConfig> {
        self.live().await.map(|live| live.config.clone())
    }

    pub async fn status(&self) -> HierarchyStatus {
        let Some(live) = self.live().await else {
            return HierarchyStatus::NotInitialized;
        };
        HierarchyStatus::Active {
            config_id: live.config.config_id.clone(),
            config_name: live.config.name.clone(),
            root: live.root.info(),
            teams: live
                .root
                .teams()
                .iter()
                .map(|team| TeamStatus {
                    team: team.info(),
                    workers: team.workers().iter().map(|worker| worker.info()).collect(),
                })
                .collect(),
        }
    }

    async fn live(&self) -> Option<Arc<LiveHierarchy>> {
        match &*self.state.read().await {
            HierarchyState::Live(live) => Some(Arc::clone(live)),
            HierarchyState::Uninitialized => None,
        }
    }

    async fn live_or_bootstrap(&self) -> Result<Arc<LiveHierarchy>> {
        if let Some(live) = self.live().await {
            return Ok(live);
        }

        let _guard = self.bootstrap.lock().await;
        // another caller may have finished while we waited
        if let Some(live) = self.live().await {
            return Ok(live);
        }
        let config = self.load_configuration(None).await?;
        self.initialize(config).await?;
        self.live().await.ok_or_else(|| {
            crate::error::MonitError::ConfigurationInvalid(
                "hierarchy vanished after initialization".to_string(),
            )
        })
    }
}
