//! Shared doubles for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::bus::{BusMessage, MessageBus};
use crate::db::run_migrations;
use crate::error::{MonitError, Result};
use crate::llm_adapter::{InferenceRequest, InferenceService};
use crate::notify::Notifier;

pub async fn setup_test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite should connect");
    run_migrations(&pool)
        .await
        .expect("migrations should run");
    pool
}

/// Inference double. Replies `scripted response #n`, failing or sleeping
/// when a registered marker appears in the system instruction or prompt.
#[derive(Default)]
pub struct ScriptedInference {
    calls: AtomicUsize,
    requests: Mutex<Vec<InferenceRequest>>,
    failures: Mutex<Vec<String>>,
    delays: Mutex<Vec<(String, Duration)>>,
}

impl ScriptedInference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(self, marker: &str) -> Self {
        self.failures
            .lock()
            .expect("failures lock")
            .push(marker.to_string());
        self
    }

    pub fn delay_on(self, marker: &str, delay: Duration) -> Self {
        self.delays
            .lock()
            .expect("delays lock")
            .push((marker.to_string(), delay));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn prompts_containing(&self, needle: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| mentions(request, needle))
            .count()
    }
}

fn mentions(request: &InferenceRequest, marker: &str) -> bool {
    request.prompt.contains(marker)
        || request
            .system_instruction
            .as_deref()
            .is_some_and(|value| value.contains(marker))
}

#[async_trait]
impl InferenceService for ScriptedInference {
    async fn generate(&self, request: InferenceRequest) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());

        let delay = self
            .delays
            .lock()
            .expect("delays lock")
            .iter()
            .find(|(marker, _)| mentions(&request, marker))
            .map(|(_, delay)| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failures
            .lock()
            .expect("failures lock")
            .iter()
            .any(|marker| mentions(&request, marker));
        if failing {
            return Err(MonitError::InferenceFailed(
                "scripted quota exhausted".to_string(),
            ));
        }

        Ok(format!("scripted response #{call}"))
    }
}

#[derive(Default)]
pub struct RecordingBus {
    messages: Mutex<Vec<BusMessage>>,
}

impl RecordingBus {
    pub fn messages(&self) -> Vec<BusMessage> {
        self.messages.lock().expect("messages lock").clone()
    }
}

#[async_trait]
impl MessageBus for RecordingBus {
    async fn publish(&self, topic: &str, key: &str, payload: &Value) -> Result<()> {
        self.messages.lock().expect("messages lock").push(BusMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: AtomicBool::new(true),
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, subject: &str, message: &str) -> Result<()> {
        self.sent
            .lock()
            .expect("sent lock")
            .push((subject.to_string(), message.to_string()));
        if self.failing.load(Ordering::SeqCst) {
            return Err(MonitError::ChildExecutionFailed(
                "smtp relay unreachable".to_string(),
            ));
        }
        Ok(())
    }
}
