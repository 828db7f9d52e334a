pub mod records;

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::error::Result;

pub use records::{RecordStore, SqliteRecordStore};

pub const PATIENTS: &str = "patients";
pub const VITALS: &str = "vitals";
pub const ALERTS: &str = "alerts";
pub const AGENT_CONFIGURATIONS: &str = "agent_configurations";
pub const AGENT_PERFORMANCE_LOGS: &str = "agent_performance_logs";

pub const SEPSIS_STUDIES: &str = "research_external_sepsis_studies";
pub const CARDIAC_STUDIES: &str = "research_external_cardiac_studies";
pub const RESPIRATORY_STUDIES: &str = "research_external_respiratory_studies";
pub const CASE_STUDIES: &str = "research_internal_case_studies";
pub const TREATMENT_OUTCOMES: &str = "research_internal_treatment_outcomes";
pub const CLINICAL_GUIDELINES: &str = "guidelines_clinical";
pub const EMERGENCY_PROTOCOLS: &str = "guidelines_emergency_protocols";
pub const DRUG_INTERACTIONS: &str = "guidelines_drug_interactions";

pub async fn connect_pool(db_path: &Path) -> Result<SqlitePool> {
    let connect_options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
