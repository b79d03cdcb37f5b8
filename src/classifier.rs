//! Response Classifier
//!
//! Decides whether an agent response counts as a successful answer.
//! The verdict comes from a second model call with structured output; tests
//! swap in deterministic judges through the `ResponseJudge` trait.

use crate::error::AssistantError;
use crate::gemini::GeminiClient;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::debug;

/// Structured verdict returned by the judge model
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseClassification {
    pub success: bool,
}

/// Anything that can judge a response text
#[async_trait]
pub trait ResponseJudge: Send + Sync {
    async fn classify(&self, response_text: &str) -> Result<bool>;
}

const CLASSIFICATION_PROMPT: &str = r#"
Classify the following response into a structured format.

Response: {response_text}

The classification should be as follows:
- success: true if the response is successful, false otherwise

The output should be in JSON format with the field: success.
"#;

/// Fill the fixed classification prompt with `response_text`
pub fn build_classification_prompt(response_text: &str) -> String {
    CLASSIFICATION_PROMPT.replace("{response_text}", response_text)
}

fn classification_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "success": { "type": "BOOLEAN" }
        },
        "required": ["success"]
    })
}

/// Judge backed by a Gemini structured-output call
pub struct GeminiJudge {
    client: GeminiClient,
}

impl GeminiJudge {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResponseJudge for GeminiJudge {
    async fn classify(&self, response_text: &str) -> Result<bool> {
        let prompt = build_classification_prompt(response_text);

        let verdict: ResponseClassification = self
            .client
            .generate_structured(&prompt, classification_schema())
            .await
            .map_err(|e| match e {
                AssistantError::Llm(msg) => AssistantError::Classification(msg),
                other => other,
            })?;

        debug!(
            model = %self.client.model(),
            success = verdict.success,
            "Response classified"
        );

        Ok(verdict.success)
    }
}

/// Verdicts already reached within one resolution, keyed by the SHA-256 of
/// the response text.
///
/// Opt-in: a resolver creates one per `resolve` call, so an identical
/// fallback answer is not judged twice. Nothing carries over between queries.
#[derive(Debug, Default)]
pub struct VerdictCache {
    verdicts: HashMap<String, bool>,
}

impl VerdictCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.verdicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }

    /// Classify through `judge` unless this text was already judged
    pub async fn classify(&mut self, judge: &dyn ResponseJudge, response_text: &str) -> Result<bool> {
        let key = cache_key(response_text);

        if let Some(verdict) = self.verdicts.get(&key) {
            debug!(key = %key, "Classification cache hit");
            return Ok(*verdict);
        }

        // errors are not cached
        let verdict = judge.classify(response_text).await?;
        self.verdicts.insert(key, verdict);

        Ok(verdict)
    }
}

fn cache_key(response_text: &str) -> String {
    hex::encode(Sha256::digest(response_text.as_bytes()))
}
