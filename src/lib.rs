pub mod agents;
pub mod alerts;
pub mod bus;
pub mod coordination;
pub mod db;
pub mod error;
pub mod hierarchy;
pub mod llm_adapter;
pub mod notify;
pub mod patients;
pub mod runtime_config;
pub mod stream;
pub mod tasks;

#[cfg(test)]
mod test_support;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::EnvFilter;

use agents::AgentDeps;
use alerts::{AlertOptions, AlertService};
use bus::BroadcastBus;
use coordination::CoordinationService;
use db::{RecordStore, SqliteRecordStore};
use error::{MonitError, Result};
use llm_adapter::GeminiAdapter;
use notify::notifier_from_settings;
use patients::PatientService;
use runtime_config::MonitSettings;
use stream::consumer::{vitals_queue, ConsumerStats, VitalsConsumer};
use stream::processor::VitalsProcessor;

/// Everything the monitor needs at run time, wired once at startup.
pub struct MonitRuntime {
    pub settings: MonitSettings,
    pub db_pool: SqlitePool,
    pub bus: Arc<BroadcastBus>,
    pub patients: Arc<PatientService>,
    pub alerts: Arc<AlertService>,
    pub coordination: Arc<CoordinationService>,
    pub processor: Arc<VitalsProcessor>,
}

impl MonitRuntime {
    pub async fn bootstrap(settings: MonitSettings) -> Result<Self> {
        if let Some(parent) = settings
            .database_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            fs::create_dir_all(parent).map_err(|error| {
                MonitError::PersistenceUnavailable(format!(
                    "Failed to create database directory: {error}"
                ))
            })?;
        }

        let db_pool = db::connect_pool(&settings.database_path).await?;
        db::run_migrations(&db_pool).await?;
        let store: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::new(db_pool.clone()));

        let inference = Arc::new(GeminiAdapter::from_settings(&settings)?);
        let bus = Arc::new(BroadcastBus::default());
        let notifier = Arc::from(notifier_from_settings(&settings));

        let deps = AgentDeps {
            inference,
            store: Arc::clone(&store),
            worker_timeout: settings.worker_timeout(),
            team_timeout: settings.team_timeout(),
        };
        let patients = Arc::new(PatientService::new(Arc::clone(&store)));
        let alerts = Arc::new(AlertService::new(
            Arc::clone(&store),
            bus.clone(),
            notifier,
            AlertOptions::from_settings(&settings),
        ));
        let coordination = Arc::new(CoordinationService::new(deps, &settings.default_model));
        let processor = Arc::new(VitalsProcessor::new(
            Arc::clone(&patients),
            Arc::clone(&alerts),
            Arc::clone(&coordination),
            store,
            bus.clone(),
            &settings,
        ));

        info!(
            database = %settings.database_path.display(),
            model = %settings.default_model,
            streaming = settings.streaming_enabled,
            "monit runtime ready"
        );

        Ok(Self {
            settings,
            db_pool,
            bus,
            patients,
            alerts,
            coordination,
            processor,
        })
    }

    /// Starts a consumer task; it finishes once the returned sender (and
    /// every clone of it) is dropped and the queue is drained.
    pub fn spawn_consumer(&self, capacity: usize) -> (mpsc::Sender<String>, JoinHandle<ConsumerStats>) {
        let (sender, receiver) = vitals_queue(capacity);
        let consumer = VitalsConsumer::new(Arc::clone(&self.processor), receiver);
        (sender, tokio::spawn(consumer.run()))
    }

    pub async fn shutdown(self) {
        self.db_pool.close().await;
        info!("monit runtime stopped");
    }
}

/// `RUST_LOG` wins; otherwise info, with debug for this crate.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,monit_lib=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub fn resolve_workspace_root() -> Result<PathBuf> {
    std::env::current_dir().map_err(|error| {
        MonitError::ConfigurationInvalid(format!("Failed to determine workspace root: {error}"))
    })
}

/// `.env` then `.env.local`; values already in the process env are kept.
pub fn load_env_files(workspace_root: &Path) {
    let _ = dotenvy::from_path(workspace_root.join(".env"));
    let _ = dotenvy::from_path(workspace_root.join(".env.local"));
}
