use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::stream::risk::RiskLevel;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topics {
    pub vitals: String,
    pub alerts: String,
    pub agent_logs: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            vitals: "patient-vitals-stream".to_string(),
            alerts: "patient-alerts-stream".to_string(),
            agent_logs: "agent-logs-stream".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitSettings {
    #[serde(skip_serializing)]
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub default_model: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub inference_timeout_secs: u64,
    pub worker_timeout_secs: u64,
    pub team_timeout_secs: u64,
    pub database_path: PathBuf,
    pub streaming_enabled: bool,
    pub notifications_enabled: bool,
    pub notification_webhook_url: Option<String>,
    pub topics: Topics,
    pub alert_min_risk: RiskLevel,
    pub analysis_min_risk: RiskLevel,
}

impl Default for MonitSettings {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_base_url: "https://generativelanguage.googleapis.com".to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_output_tokens: 8192,
            inference_timeout_secs: 60,
            worker_timeout_secs: 30,
            team_timeout_secs: 120,
            database_path: PathBuf::from("monit.db"),
            streaming_enabled: true,
            notifications_enabled: true,
            notification_webhook_url: None,
            topics: Topics::default(),
            alert_min_risk: RiskLevel::Medium,
            analysis_min_risk: RiskLevel::High,
        }
    }
}

impl MonitSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let alert_min_risk = env_risk_level("MONIT_ALERT_MIN_RISK", defaults.alert_min_risk);
        let analysis_min_risk = env_risk_level("MONIT_ANALYSIS_MIN_RISK", defaults.analysis_min_risk);

        Self {
            gemini_api_key: env_string("GEMINI_API_KEY"),
            gemini_base_url: env_string("MONIT_GEMINI_BASE_URL")
                .unwrap_or(defaults.gemini_base_url),
            default_model: env_string("MONIT_DEFAULT_MODEL").unwrap_or(defaults.default_model),
            temperature: env_f64("MONIT_TEMPERATURE", defaults.temperature, 0.0, 2.0),
            max_output_tokens: env_u32("MONIT_MAX_OUTPUT_TOKENS", defaults.max_output_tokens, 64, 65_536),
            inference_timeout_secs: env_u64("MONIT_INFERENCE_TIMEOUT_SECONDS", defaults.inference_timeout_secs, 1, 600),
            worker_timeout_secs: env_u64("MONIT_AGENT_TIMEOUT_SECONDS", defaults.worker_timeout_secs, 1, 600),
            team_timeout_secs: env_u64("MONIT_TEAM_TIMEOUT_SECONDS", defaults.team_timeout_secs, 1, 1800),
            database_path: env_string("MONIT_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            streaming_enabled: env_bool("MONIT_ENABLE_STREAMING", defaults.streaming_enabled),
            notifications_enabled: env_bool("MONIT_ENABLE_NOTIFICATIONS", defaults.notifications_enabled),
            notification_webhook_url: env_string("MONIT_NOTIFICATION_WEBHOOK_URL"),
            topics: Topics {
                vitals: env_string("MONIT_TOPIC_VITALS").unwrap_or(defaults.topics.vitals),
                alerts: env_string("MONIT_TOPIC_ALERTS").unwrap_or(defaults.topics.alerts),
                agent_logs: env_string("MONIT_TOPIC_AGENT_LOGS")
                    .unwrap_or(defaults.topics.agent_logs),
            },
            alert_min_risk,
            // deep analysis never fires below the alert threshold
            analysis_min_risk: analysis_min_risk.max(alert_min_risk),
        }
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_secs)
    }

    pub fn team_timeout(&self) -> Duration {
        Duration::from_secs(self.team_timeout_secs)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|value| parse_bool(&value))
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64, min: f64, max: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<f64>().ok())
        .map(|value| value.clamp(min, max))
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32, min: u32, max: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .map(|value| value.clamp(min, max))
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64, min: u64, max: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(|value| value.clamp(min, max))
        .unwrap_or(default)
}

fn env_risk_level(key: &str, default: RiskLevel) -> RiskLevel {
    std::env::var(key)
        .ok()
        .and_then(|value| RiskLevel::parse(&value))
        .filter(|level| *level != RiskLevel::Unknown)
        .unwrap_or(default)
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
