use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub topic: String,
    pub key: String,
    pub payload: Value,
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &Value) -> Result<()>;
}

/// In-process fan-out bus. Publishing with no live subscriber is not an
/// error; the message is simply dropped.
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    sender: broadcast::Sender<BusMessage>,
}

impl BroadcastBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl MessageBus for BroadcastBus {
    async fn publish(&self, topic: &str, key: &str, payload: &Value) -> Result<()> {
        let message = BusMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.clone(),
        };
        match self.sender.send(message) {
            Ok(receivers) => {
                debug!(topic, key, receivers, "message delivered");
                Ok(())
            }
            // only fails when nobody is subscribed
            Err(_) => {
                debug!(topic, key, "no subscribers; message dropped");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_messages() {
        let bus = BroadcastBus::new(8);
        let mut receiver = bus.subscribe();

        bus.publish("patient-alerts-stream", "P001", &json!({"severity": "high"}))
            .await
            .expect("publish should succeed");

        let message = receiver.recv().await.expect("message should arrive");
        assert_eq!(message.topic, "patient-alerts-stream");
        assert_eq!(message.key, "P001");
        assert_eq!(message.payload["severity"], "high");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_not_an_error() {
        let bus = BroadcastBus::default();
        bus.publish("agent-logs-stream", "k", &json!({}))
            .await
            .expect("publish should succeed without subscribers");
    }
}
