use serde::{Deserialize, Serialize};

use crate::alerts::AlertSeverity;
use crate::stream::VitalReading;

/// Ordered so that `Unknown < Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Unknown => "unknown",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unknown" => Some(RiskLevel::Unknown),
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            "critical" => Some(RiskLevel::Critical),
            _ => None,
        }
    }

    pub fn from_score(score: u32) -> Self {
        match score {
            70.. => RiskLevel::Critical,
            50..=69 => RiskLevel::High,
            30..=49 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }

    pub fn severity(self) -> Option<AlertSeverity> {
        match self {
            RiskLevel::Unknown => None,
            RiskLevel::Low => Some(AlertSeverity::Low),
            RiskLevel::Medium => Some(AlertSeverity::Medium),
            RiskLevel::High => Some(AlertSeverity::High),
            RiskLevel::Critical => Some(AlertSeverity::Critical),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub patient_id: String,
    pub risk_score: u32,
    pub risk_level: RiskLevel,
    pub concerns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_vitals: Option<VitalReading>,
}

impl RiskAssessment {
    pub fn unknown(patient_id: &str) -> Self {
        Self {
            patient_id: patient_id.to_string(),
            risk_score: 0,
            risk_level: RiskLevel::Unknown,
            concerns: vec!["No vitals data".to_string()],
            latest_vitals: None,
        }
    }
}

/// Additive rule set over a single reading. Diastolic pressure contributes
/// to anomaly detection but not to the score.
pub fn score_reading(reading: &VitalReading) -> RiskAssessment {
    let mut score = 0_u32;
    let mut concerns = Vec::new();

    if reading.heart_rate > 120.0 || reading.heart_rate < 50.0 {
        score += 30;
        concerns.push(format!("Abnormal heart rate: {}", reading.heart_rate));
    }
    if reading.bp_systolic > 180.0 || reading.bp_systolic < 90.0 {
        score += 25;
        concerns.push(format!("Abnormal blood pressure: {}", reading.bp_systolic));
    }
    if reading.o2_saturation < 92.0 {
        score += 35;
        concerns.push(format!("Low oxygen saturation: {}%", reading.o2_saturation));
    }
    if reading.temperature > 38.5 || reading.temperature < 36.0 {
        score += 10;
        concerns.push(format!("Abnormal temperature: {}°C", reading.temperature));
    }

    let risk_score = score.min(100);
    RiskAssessment {
        patient_id: reading.patient_id.clone(),
        risk_score,
        risk_level: RiskLevel::from_score(risk_score),
        concerns,
        latest_vitals: Some(reading.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::reading;

    #[test]
    fn tachycardia_alone_is_medium_risk() {
        let assessment = score_reading(&reading("P001", 125.0, 120.0, 80.0, 98.0, 37.0));
        assert_eq!(assessment.risk_score, 30);
        assert_eq!(assessment.risk_level, RiskLevel::Medium);
        assert_eq!(assessment.concerns.len(), 1);
    }

    #[test]
    fn hypoxia_with_tachycardia_is_high_risk() {
        let assessment = score_reading(&reading("P001", 140.0, 120.0, 80.0, 85.0, 37.0));
        assert_eq!(assessment.risk_score, 65);
        assert_eq!(assessment.risk_level, RiskLevel::High);
    }

    #[test]
    fn all_rules_firing_is_critical() {
        let assessment = score_reading(&reading("P001", 40.0, 200.0, 80.0, 80.0, 40.0));
        assert_eq!(assessment.risk_score, 100);
        assert_eq!(assessment.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn normal_reading_is_low_risk() {
        let assessment = score_reading(&reading("P001", 80.0, 120.0, 80.0, 98.0, 37.0));
        assert_eq!(assessment.risk_score, 0);
        assert_eq!(assessment.risk_level, RiskLevel::Low);
        assert!(assessment.concerns.is_empty());
    }

    #[test]
    fn level_boundaries_follow_score_thresholds() {
        assert_eq!(RiskLevel::from_score(29), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(30), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(50), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(70), RiskLevel::Critical);
        assert!(RiskLevel::Critical > RiskLevel::High);
        assert!(RiskLevel::Low > RiskLevel::Unknown);
    }

    #[test]
    fn parse_round_trips_level_names() {
        assert_eq!(RiskLevel::parse(" HIGH "), Some(RiskLevel::High));
        assert_eq!(RiskLevel::parse("severe"), None);
    }
}
