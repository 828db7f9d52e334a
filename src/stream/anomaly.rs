use crate::stream::{VitalChannel, VitalReading};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelThreshold {
    pub channel: VitalChannel,
    pub min: f64,
    pub max: f64,
}

pub const THRESHOLDS: [ChannelThreshold; 5] = [
    ChannelThreshold {
        channel: VitalChannel::HeartRate,
        min: 50.0,
        max: 120.0,
    },
    ChannelThreshold {
        channel: VitalChannel::BpSystolic,
        min: 90.0,
        max: 180.0,
    },
    ChannelThreshold {
        channel: VitalChannel::BpDiastolic,
        min: 60.0,
        max: 110.0,
    },
    ChannelThreshold {
        channel: VitalChannel::O2Saturation,
        min: 92.0,
        max: 100.0,
    },
    ChannelThreshold {
        channel: VitalChannel::Temperature,
        min: 36.0,
        max: 38.5,
    },
];

/// Human-readable anomaly list, e.g. `heart_rate too high (125)`.
/// Bounds are inclusive: a value equal to min or max is normal.
pub fn detect_anomalies(reading: &VitalReading) -> Vec<String> {
    THRESHOLDS
        .iter()
        .filter_map(|threshold| {
            let value = reading.channel(threshold.channel);
            if value < threshold.min {
                Some(format!("{} too low ({value})", threshold.channel.as_str()))
            } else if value > threshold.max {
                Some(format!("{} too high ({value})", threshold.channel.as_str()))
            } else {
                None
            }
        })
        .collect()
}
