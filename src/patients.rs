use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::{RecordStore, PATIENTS, VITALS};
use crate::error::{MonitError, Result};
use crate::stream::risk::{score_reading, RiskAssessment};
use crate::stream::VitalReading;

pub const DEFAULT_VITALS_LIMIT: usize = 100;

pub struct PatientService {
    store: Arc<dyn RecordStore>,
}

impl PatientService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn list_patients(&self) -> Result<Vec<Value>> {
        self.store.read(PATIENTS).await
    }

    pub async fn get_patient(&self, patient_id: &str) -> Result<Value> {
        self.store
            .query(PATIENTS, &[("patient_id", json!(patient_id))])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MonitError::NotFound(format!("patient '{patient_id}'")))
    }

    pub async fn add_patient(&self, patient: Value) -> Result<()> {
        let has_id = patient
            .get("patient_id")
            .and_then(Value::as_str)
            .is_some_and(|value| !value.trim().is_empty());
        if !has_id {
            return Err(MonitError::InvalidInput(
                "patient record requires a patient_id".to_string(),
            ));
        }
        self.store.append(PATIENTS, patient).await
    }

    pub async fn update_patient(&self, patient_id: &str, patch: Map<String, Value>) -> Result<()> {
        let touched = self
            .store
            .update(PATIENTS, "patient_id", patient_id, patch)
            .await?;
        if touched == 0 {
            return Err(MonitError::NotFound(format!("patient '{patient_id}'")));
        }
        Ok(())
    }

    /// Appends a reading, assigning a `vital_id` when the feed did not.
    pub async fn add_vital_signs(&self, reading: &VitalReading) -> Result<VitalReading> {
        let mut stored = reading.clone();
        if stored.vital_id.is_none() {
            stored.vital_id = Some(Uuid::new_v4().to_string());
        }
        self.store
            .append(VITALS, serde_json::to_value(&stored)?)
            .await?;
        debug!(patient_id = %stored.patient_id, "vital signs stored");
        Ok(stored)
    }

    /// Most recent first. Rows that do not parse as readings are skipped.
    pub async fn get_patient_vitals(
        &self,
        patient_id: &str,
        limit: usize,
    ) -> Result<Vec<VitalReading>> {
        let mut readings = self
            .store
            .query(VITALS, &[("patient_id", json!(patient_id))])
            .await?
            .into_iter()
            .filter_map(|row| match serde_json::from_value::<VitalReading>(row) {
                Ok(reading) => Some(reading),
                Err(error) => {
                    warn!(patient_id, error = %error, "skipping malformed vitals row");
                    None
                }
            })
            .collect::<Vec<_>>();
        // later inserts win ties on equal timestamps
        readings.reverse();
        readings.sort_by(|left, right| right.timestamp.cmp(&left.timestamp));
        readings.truncate(limit);
        Ok(readings)
    }

    /// Scores the patient's latest reading; no readings yields `unknown`.
    pub async fn calculate_risk_score(&self, patient_id: &str) -> Result<RiskAssessment> {
        let latest = self.get_patient_vitals(patient_id, 1).await?;
        Ok(match latest.first() {
            Some(reading) => score_reading(reading),
            None => RiskAssessment::unknown(patient_id),
        })
    }
}
