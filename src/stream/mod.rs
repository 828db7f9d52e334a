pub mod anomaly;
pub mod consumer;
pub mod processor;
pub mod risk;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sensor sample for a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vital_id: Option<String>,
    pub patient_id: String,
    pub heart_rate: f64,
    pub bp_systolic: f64,
    pub bp_diastolic: f64,
    pub o2_saturation: f64,
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respiratory_rate: Option<f64>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl VitalReading {
    pub fn channel(&self, channel: VitalChannel) -> f64 {
        match channel {
            VitalChannel::HeartRate => self.heart_rate,
            VitalChannel::BpSystolic => self.bp_systolic,
            VitalChannel::BpDiastolic => self.bp_diastolic,
            VitalChannel::O2Saturation => self.o2_saturation,
            VitalChannel::Temperature => self.temperature,
        }
    }
}

/// The five thresholded channels, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalChannel {
    HeartRate,
    BpSystolic,
    BpDiastolic,
    O2Saturation,
    Temperature,
}

impl VitalChannel {
    pub const ALL: [VitalChannel; 5] = [
        VitalChannel::HeartRate,
        VitalChannel::BpSystolic,
        VitalChannel::BpDiastolic,
        VitalChannel::O2Saturation,
        VitalChannel::Temperature,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VitalChannel::HeartRate => "heart_rate",
            VitalChannel::BpSystolic => "bp_systolic",
            VitalChannel::BpDiastolic => "bp_diastolic",
            VitalChannel::O2Saturation => "o2_saturation",
            VitalChannel::Temperature => "temperature",
        }
    }
}

#[cfg(test)]
pub(crate) fn reading(
    patient_id: &str,
    heart_rate: f64,
    bp_systolic: f64,
    bp_diastolic: f64,
    o2_saturation: f64,
    temperature: f64,
) -> VitalReading {
    VitalReading {
        vital_id: None,
        patient_id: patient_id.to_string(),
        heart_rate,
        bp_systolic,
        bp_diastolic,
        o2_saturation,
        temperature,
        respiratory_rate: None,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_deserializes_without_optional_fields() {
        let parsed: VitalReading = serde_json::from_str(
            r#"{"patient_id":"P001","heart_rate":82,"bp_systolic":120,"bp_diastolic":80,
                "o2_saturation":98.5,"temperature":37.2}"#,
        )
        .expect("reading should parse");

        assert_eq!(parsed.patient_id, "P001");
        assert_eq!(parsed.respiratory_rate, None);
        assert_eq!(parsed.channel(VitalChannel::O2Saturation), 98.5);
    }

    #[test]
    fn reading_without_patient_id_is_rejected() {
        let parsed = serde_json::from_str::<VitalReading>(
            r#"{"heart_rate":82,"bp_systolic":120,"bp_diastolic":80,"o2_saturation":98,"temperature":37}"#,
        );
        assert!(parsed.is_err());
    }
}
