//! Alert records: creation with bus/notification fan-out, and the one-way
//! `active -> acknowledged -> resolved` lifecycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::MessageBus;
use crate::db::{RecordStore, ALERTS};
use crate::error::{MonitError, Result};
use crate::notify::Notifier;
use crate::runtime_config::MonitSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }

    pub fn requires_notification(self) -> bool {
        self >= AlertSeverity::High
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    pub patient_id: String,
    #[serde(alias = "alert_type")]
    pub category: String,
    pub severity: AlertSeverity,
    pub message: String,
    #[serde(default)]
    pub details: Value,
    pub status: AlertStatus,
    #[serde(default = "system_author")]
    pub created_by: String,
    #[serde(alias = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

fn system_author() -> String {
    "system".to_string()
}

#[derive(Debug, Clone)]
pub struct AlertOptions {
    pub streaming_enabled: bool,
    pub notifications_enabled: bool,
    pub topic: String,
}

impl AlertOptions {
    pub fn from_settings(settings: &MonitSettings) -> Self {
        Self {
            streaming_enabled: settings.streaming_enabled,
            notifications_enabled: settings.notifications_enabled,
            topic: settings.topics.alerts.clone(),
        }
    }
}

pub struct AlertService {
    store: Arc<dyn RecordStore>,
    bus: Arc<dyn MessageBus>,
    notifier: Arc<dyn Notifier>,
    options: AlertOptions,
}

impl AlertService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        bus: Arc<dyn MessageBus>,
        notifier: Arc<dyn Notifier>,
        options: AlertOptions,
    ) -> Self {
        Self {
            store,
            bus,
            notifier,
            options,
        }
    }

    /// Persists a new active alert, then publishes it and, for high or
    /// critical severity, notifies. Only the persistence step can fail the call.
    pub async fn create_alert(
        &self,
        patient_id: &str,
        category: &str,
        severity: AlertSeverity,
        message: &str,
        details: Value,
    ) -> Result<Alert> {
        if patient_id.trim().is_empty() {
            return Err(MonitError::InvalidInput(
                "alert requires a patient_id".to_string(),
            ));
        }

        let alert = Alert {
            alert_id: Uuid::new_v4().to_string(),
            patient_id: patient_id.trim().to_string(),
            category: category.to_string(),
            severity,
            message: message.to_string(),
            details,
            status: AlertStatus::Active,
            created_by: system_author(),
            created_at: Utc::now(),
            acknowledged_at: None,
            resolved_at: None,
        };
        let payload = serde_json::to_value(&alert)?;
        self.store.append(ALERTS, payload.clone()).await?;

        if self.options.streaming_enabled {
            if let Err(error) = self
                .bus
                .publish(&self.options.topic, &alert.patient_id, &payload)
                .await
            {
                warn!(alert_id = %alert.alert_id, error = %error, "alert publish failed");
            }
        }

        if severity.requires_notification() && self.options.notifications_enabled {
            let (subject, body) = notification_text(&alert);
            if let Err(error) = self.notifier.send(&subject, &body).await {
                warn!(alert_id = %alert.alert_id, error = %error, "alert notification failed");
            }
        }

        info!(
            alert_id = %alert.alert_id,
            patient_id = %alert.patient_id,
            severity = severity.as_str(),
            "alert created"
        );
        Ok(alert)
    }

    pub async fn get_alert(&self, alert_id: &str) -> Result<Alert> {
        let row = self
            .store
            .query(ALERTS, &[("alert_id", json!(alert_id))])
            .await?
            .into_iter()
            .next_back()
            .ok_or_else(|| MonitError::NotFound(format!("alert '{alert_id}'")))?;
        Ok(serde_json::from_value(row)?)
    }

    /// Active alerts, newest first, optionally for one patient.
    pub async fn active_alerts(&self, patient_id: Option<&str>) -> Result<Vec<Alert>> {
        let mut filters = vec![("status", json!(AlertStatus::Active.as_str()))];
        if let Some(patient_id) = patient_id {
            filters.push(("patient_id", json!(patient_id)));
        }

        let mut alerts = self
            .store
            .query(ALERTS, &filters)
            .await?
            .into_iter()
            .filter_map(|row| match serde_json::from_value::<Alert>(row) {
                Ok(alert) => Some(alert),
                Err(error) => {
                    warn!(error = %error, "skipping malformed alert row");
                    None
                }
            })
            .collect::<Vec<_>>();
        alerts.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(alerts)
    }

    /// No-op on an alert that is already acknowledged or resolved.
    pub async fn acknowledge(&self, alert_id: &str) -> Result<Alert> {
        let alert = self.get_alert(alert_id).await?;
        if alert.status != AlertStatus::Active {
            return Ok(alert);
        }
        self.transition(alert, AlertStatus::Acknowledged).await
    }

    /// No-op on an alert that is already resolved.
    pub async fn resolve(&self, alert_id: &str) -> Result<Alert> {
        let alert = self.get_alert(alert_id).await?;
        if alert.status == AlertStatus::Resolved {
            return Ok(alert);
        }
        self.transition(alert, AlertStatus::Resolved).await
    }

    async fn transition(&self, mut alert: Alert, status: AlertStatus) -> Result<Alert> {
        let now = Utc::now();
        let mut patch = Map::new();
        patch.insert("status".to_string(), json!(status.as_str()));
        match status {
            AlertStatus::Acknowledged => {
                alert.acknowledged_at = Some(now);
                patch.insert("acknowledged_at".to_string(), json!(now));
            }
            AlertStatus::Resolved => {
                alert.resolved_at = Some(now);
                patch.insert("resolved_at".to_string(), json!(now));
            }
            AlertStatus::Active => {}
        }
        alert.status = status;

        let touched = self
            .store
            .update(ALERTS, "alert_id", &alert.alert_id, patch)
            .await?;
        if touched == 0 {
            return Err(MonitError::NotFound(format!("alert '{}'", alert.alert_id)));
        }
        info!(alert_id = %alert.alert_id, status = status.as_str(), "alert status updated");
        Ok(alert)
    }
}

fn notification_text(alert: &Alert) -> (String, String) {
    let severity = alert.severity.as_str().to_uppercase();
    let subject = format!("[{severity}] Patient Alert: {}", alert.patient_id);
    let details = serde_json::to_string_pretty(&alert.details).unwrap_or_default();
    let body = format!(
        "PATIENT ALERT\n\n\
         Alert ID: {}\n\
         Patient ID: {}\n\
         Severity: {severity}\n\
         Type: {}\n\
         Time: {}\n\n\
         Message:\n{}\n\n\
         Details:\n{details}\n\n\
         Please review the patient immediately.\n",
        alert.alert_id,
        alert.patient_id,
        alert.category,
        alert.created_at.to_rfc3339(),
        alert.message,
    );
    (subject, body)
}
