use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::stream::processor::{Escalation, VitalsProcessor};
use crate::stream::VitalReading;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Raw vitals messages, one JSON document each.
pub fn vitals_queue(capacity: usize) -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
    mpsc::channel(capacity.max(1))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub received: usize,
    pub skipped: usize,
    pub failed: usize,
    pub alerted: usize,
    pub analyzed: usize,
}

/// Drains the queue one message at a time until every sender is dropped.
pub struct VitalsConsumer {
    processor: Arc<VitalsProcessor>,
    receiver: mpsc::Receiver<String>,
    stats: ConsumerStats,
}

impl VitalsConsumer {
    pub fn new(processor: Arc<VitalsProcessor>, receiver: mpsc::Receiver<String>) -> Self {
        Self {
            processor,
            receiver,
            stats: ConsumerStats::default(),
        }
    }

    pub async fn run(mut self) -> ConsumerStats {
        info!("vitals consumer started");
        while let Some(raw) = self.receiver.recv().await {
            self.handle(&raw).await;
        }
        info!(
            received = self.stats.received,
            skipped = self.stats.skipped,
            failed = self.stats.failed,
            "vitals consumer drained"
        );
        self.stats
    }

    async fn handle(&mut self, raw: &str) {
        self.stats.received += 1;
        let reading = match serde_json::from_str::<VitalReading>(raw) {
            Ok(reading) => reading,
            Err(err) => {
                self.stats.skipped += 1;
                warn!(error = %err, "skipping unparseable vitals message");
                return;
            }
        };

        let escalation = self.processor.process_vitals(&reading).await;
        debug!(patient_id = %reading.patient_id, escalation = ?escalation, "reading processed");
        match escalation {
            Escalation::Failed { .. } => self.stats.failed += 1,
            Escalation::Alerted { .. } => self.stats.alerted += 1,
            Escalation::Analyzed { .. } => {
                self.stats.alerted += 1;
                self.stats.analyzed += 1;
            }
            Escalation::Nominal | Escalation::Anomalous { .. } => {}
        }
    }
}
