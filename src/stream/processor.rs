//! Per-reading escalation: store, detect, score, alert, and for the worst
//! cases hand the patient to the agent hierarchy.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::agents::QueryContext;
use crate::alerts::AlertService;
use crate::bus::MessageBus;
use crate::coordination::CoordinationService;
use crate::db::{RecordStore, AGENT_PERFORMANCE_LOGS};
use crate::error::{MonitError, Result};
use crate::patients::PatientService;
use crate::runtime_config::MonitSettings;
use crate::stream::anomaly::detect_anomalies;
use crate::stream::risk::RiskLevel;
use crate::stream::VitalReading;

pub const ALERT_CATEGORY: &str = "vitals_anomaly";

/// Risk levels at which a reading raises an alert, and at which it
/// additionally triggers deep analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationPolicy {
    pub alert_min_risk: RiskLevel,
    pub analysis_min_risk: RiskLevel,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            alert_min_risk: RiskLevel::Medium,
            analysis_min_risk: RiskLevel::High,
        }
    }
}

impl EscalationPolicy {
    pub fn from_settings(settings: &MonitSettings) -> Self {
        Self {
            alert_min_risk: settings.alert_min_risk,
            analysis_min_risk: settings.analysis_min_risk.max(settings.alert_min_risk),
        }
    }
}

/// How far a single reading travelled through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Escalation {
    Nominal,
    Anomalous {
        anomalies: Vec<String>,
        risk_level: RiskLevel,
    },
    Alerted {
        anomalies: Vec<String>,
        risk_level: RiskLevel,
        alert_id: Option<String>,
    },
    Analyzed {
        anomalies: Vec<String>,
        risk_level: RiskLevel,
        alert_id: Option<String>,
        analysis_succeeded: bool,
    },
    Failed {
        error: String,
    },
}

pub struct VitalsProcessor {
    patients: Arc<PatientService>,
    alerts: Arc<AlertService>,
    coordination: Arc<CoordinationService>,
    store: Arc<dyn RecordStore>,
    bus: Arc<dyn MessageBus>,
    policy: EscalationPolicy,
    vitals_topic: Option<String>,
    agent_logs_topic: Option<String>,
}

impl VitalsProcessor {
    pub fn new(
        patients: Arc<PatientService>,
        alerts: Arc<AlertService>,
        coordination: Arc<CoordinationService>,
        store: Arc<dyn RecordStore>,
        bus: Arc<dyn MessageBus>,
        settings: &MonitSettings,
    ) -> Self {
        Self {
            patients,
            alerts,
            coordination,
            store,
            bus,
            policy: EscalationPolicy::from_settings(settings),
            vitals_topic: settings
                .streaming_enabled
                .then(|| settings.topics.vitals.clone()),
            agent_logs_topic: settings
                .streaming_enabled
                .then(|| settings.topics.agent_logs.clone()),
        }
    }

    pub fn policy(&self) -> EscalationPolicy {
        self.policy
    }

    /// Never fails; a broken step is logged and reported as `Failed` so the
    /// next reading is processed normally.
    ///
    /// The returned `Escalation` is diagnostic only (logging, stream stats).
    /// The stored vitals, alerts and analysis logs are the outcome of record.
    pub async fn process_vitals(&self, reading: &VitalReading) -> Escalation {
        match self.escalate(reading).await {
            Ok(escalation) => escalation,
            Err(err) => {
                error!(patient_id = %reading.patient_id, error = %err, "vitals processing failed");
                Escalation::Failed {
                    error: err.to_string(),
                }
            }
        }
    }

    async fn escalate(&self, reading: &VitalReading) -> Result<Escalation> {
        if reading.patient_id.trim().is_empty() {
            return Err(MonitError::InvalidInput(
                "vitals reading is missing patient_id".to_string(),
            ));
        }

        let stored = self.patients.add_vital_signs(reading).await?;
        if let Some(topic) = &self.vitals_topic {
            let payload = serde_json::to_value(&stored)?;
            if let Err(err) = self.bus.publish(topic, &stored.patient_id, &payload).await {
                warn!(patient_id = %stored.patient_id, error = %err, "vitals publish failed");
            }
        }
        let anomalies = detect_anomalies(&stored);
        if anomalies.is_empty() {
            return Ok(Escalation::Nominal);
        }
        warn!(patient_id = %stored.patient_id, anomalies = ?anomalies, "anomalies detected");

        let risk = self
            .patients
            .calculate_risk_score(&stored.patient_id)
            .await?;
        let risk_level = risk.risk_level;
        let severity = match risk_level.severity() {
            Some(severity) if risk_level >= self.policy.alert_min_risk => severity,
            _ => {
                return Ok(Escalation::Anomalous {
                    anomalies,
                    risk_level,
                })
            }
        };

        let vitals = serde_json::to_value(&stored)?;
        let alert_id = match self
            .alerts
            .create_alert(
                &stored.patient_id,
                ALERT_CATEGORY,
                severity,
                &format!("Vital signs anomalies detected: {}", anomalies.join(", ")),
                json!({
                    "anomalies": anomalies,
                    "risk_score": risk.risk_score,
                    "vitals": vitals,
                }),
            )
            .await
        {
            Ok(alert) => Some(alert.alert_id),
            Err(err) => {
                // analysis still runs for a patient this sick
                error!(patient_id = %stored.patient_id, error = %err, "alert creation failed");
                None
            }
        };

        if risk_level < self.policy.analysis_min_risk {
            return Ok(Escalation::Alerted {
                anomalies,
                risk_level,
                alert_id,
            });
        }

        let analysis_succeeded = self
            .request_analysis(&stored, &anomalies, risk.risk_score, vitals)
            .await;
        Ok(Escalation::Analyzed {
            anomalies,
            risk_level,
            alert_id,
            analysis_succeeded,
        })
    }

    async fn request_analysis(
        &self,
        reading: &VitalReading,
        anomalies: &[String],
        risk_score: u32,
        vitals: Value,
    ) -> bool {
        let query = urgent_analysis_query(reading, anomalies);
        let mut context = QueryContext::new();
        context.insert("patient_id".to_string(), json!(reading.patient_id));
        context.insert("anomalies".to_string(), json!(anomalies));
        context.insert("risk_score".to_string(), json!(risk_score));
        context.insert("vitals".to_string(), vitals);

        let outcome = self.coordination.process_query(&query, context).await;
        let succeeded = outcome.is_success();
        info!(patient_id = %reading.patient_id, succeeded, "agent analysis finished");

        let result = match serde_json::to_value(&outcome) {
            Ok(result) => result,
            Err(err) => {
                error!(patient_id = %reading.patient_id, error = %err, "analysis result does not serialize");
                return succeeded;
            }
        };
        let log = json!({
            "patient_id": reading.patient_id,
            "query": query,
            "result": result,
            "timestamp": reading.timestamp,
        });
        if let Err(err) = self.store.append(AGENT_PERFORMANCE_LOGS, log.clone()).await {
            error!(patient_id = %reading.patient_id, error = %err, "analysis log was not stored");
        }
        if let Some(topic) = &self.agent_logs_topic {
            if let Err(err) = self.bus.publish(topic, &reading.patient_id, &log).await {
                warn!(patient_id = %reading.patient_id, error = %err, "analysis log publish failed");
            }
        }
        succeeded
    }
}

fn urgent_analysis_query(reading: &VitalReading, anomalies: &[String]) -> String {
    format!(
        "Urgent analysis needed for patient {patient}.\n\n\
         Detected anomalies: {anomalies}\n\n\
         Latest vital signs:\n\
         - Heart Rate: {hr} bpm\n\
         - Blood Pressure: {sys}/{dia} mmHg\n\
         - O2 Saturation: {o2}%\n\
         - Temperature: {temp}°C\n\n\
         Please provide:\n\
         1. Risk assessment\n\
         2. Possible causes\n\
         3. Recommended interventions\n\
         4. Urgency level",
        patient = reading.patient_id,
        anomalies = anomalies.join(", "),
        hr = reading.heart_rate,
        sys = reading.bp_systolic,
        dia = reading.bp_diastolic,
        o2 = reading.o2_saturation,
        temp = reading.temperature,
    )
}
