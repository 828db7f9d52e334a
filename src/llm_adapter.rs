use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{MonitError, Result};
use crate::runtime_config::MonitSettings;

#[derive(Debug, Clone, Default)]
pub struct InferenceRequest {
    pub prompt: String,
    pub model: String,
    pub system_instruction: Option<String>,
    pub context: Option<Value>,
    pub use_grounding: bool,
    pub temperature: Option<f64>,
    pub max_output_tokens: Option<u32>,
}

impl InferenceRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_grounding(mut self) -> Self {
        self.use_grounding = true;
        self
    }

    /// Prompt text as sent to the model, with the context block prepended.
    pub fn full_prompt(&self) -> String {
        match &self.context {
            Some(context) if !is_empty_context(context) => format!(
                "Additional context:\n{}\n\n{}",
                serde_json::to_string_pretty(context).unwrap_or_else(|_| context.to_string()),
                self.prompt.trim()
            ),
            _ => self.prompt.trim().to_string(),
        }
    }
}

/// Opaque text-generation capability used by every tier.
#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn generate(&self, request: InferenceRequest) -> Result<String>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// `generateContent` REST adapter for Gemini models.
#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    default_model: String,
    temperature: f64,
    max_output_tokens: u32,
}

impl GeminiAdapter {
    pub fn from_settings(settings: &MonitSettings) -> Result<Self> {
        let api_key = settings
            .gemini_api_key
            .clone()
            .ok_or_else(|| MonitError::InferenceFailed("GEMINI_API_KEY is not set".to_string()))?;

        Self::new(
            &settings.gemini_base_url,
            &api_key,
            &settings.default_model,
            settings.temperature,
            settings.max_output_tokens,
            settings.inference_timeout(),
        )
    }

    pub fn new(
        base_url: &str,
        api_key: &str,
        default_model: &str,
        temperature: f64,
        max_output_tokens: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| {
                MonitError::InferenceFailed(format!("Failed to build inference HTTP client: {error}"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            default_model: default_model.trim().to_string(),
            temperature,
            max_output_tokens,
        })
    }

    fn resolve_model<'a>(&'a self, request: &'a InferenceRequest) -> &'a str {
        let requested = request.model.trim();
        if requested.is_empty() {
            &self.default_model
        } else {
            requested
        }
    }

    fn build_body(&self, request: &InferenceRequest) -> Value {
        let mut body = json!({
            "contents": [
                { "role": "user", "parts": [ { "text": request.full_prompt() } ] }
            ],
            "generationConfig": {
                "temperature": request.temperature.unwrap_or(self.temperature),
                "maxOutputTokens": request.max_output_tokens.unwrap_or(self.max_output_tokens)
            }
        });

        if let Some(instruction) = request
            .system_instruction
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            body["systemInstruction"] = json!({ "parts": [ { "text": instruction } ] });
        }
        if request.use_grounding {
            body["tools"] = json!([ { "google_search": {} } ]);
        }

        body
    }
}

#[async_trait]
impl InferenceService for GeminiAdapter {
    async fn generate(&self, request: InferenceRequest) -> Result<String> {
        let model = self.resolve_model(&request).to_string();
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        let body = self.build_body(&request);

        debug!(model = %model, grounding = request.use_grounding, "sending inference request");
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|error| MonitError::InferenceFailed(format!("Failed to call Gemini API: {error}")))?;

        let status = response.status();
        let payload: Value = response.json().await.map_err(|error| {
            MonitError::InferenceFailed(format!("Invalid Gemini response payload: {error}"))
        })?;
        if !status.is_success() {
            return Err(MonitError::InferenceFailed(format!(
                "Gemini adapter failed with status {status}: {payload}"
            )));
        }

        extract_text(payload)
    }
}

fn extract_text(payload: Value) -> Result<String> {
    let parsed: GenerateContentResponse = serde_json::from_value(payload)?;
    let text = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());

    match text {
        Some(text) => Ok(text),
        None => {
            warn!(feedback = ?parsed.prompt_feedback, "Gemini returned no usable candidates");
            Err(MonitError::InferenceFailed(
                "Gemini response did not include any candidate text".to_string(),
            ))
        }
    }
}

fn is_empty_context(context: &Value) -> bool {
    match context {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
