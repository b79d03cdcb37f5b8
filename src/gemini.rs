//! Gemini API client
//!
//! Thin wrapper over `generateContent` and `embedContent`.
//! Uses a long-lived reqwest::Client for connection pooling; every request is
//! bounded by the configured timeout.

use crate::config::AssistantConfig;
use crate::error::AssistantError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// The key travels in a header, never in the URL
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Reusable Gemini client (connection-pooled)
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()
            .map_err(|e| AssistantError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: crate::config::DEFAULT_GEMINI_BASE_URL.to_string(),
            model: model.into(),
        })
    }

    /// Client for `model` using the key, base URL and timeout from `config`
    pub fn from_config(config: &AssistantConfig, model: &str) -> Result<Self> {
        Ok(Self::new(&config.gemini_api_key, model, config.request_timeout)?
            .with_base_url(&config.gemini_base_url))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Plain text generation
    pub async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        let request = GeminiRequest {
            contents: vec![Content::user(prompt)],
            generation_config: GenerationConfig::default(),
            system_instruction: system_prompt.map(SystemInstruction::new),
            tools: None,
            tool_config: None,
        };

        let content = self.send(&request).await?;
        content.text().ok_or_else(|| {
            AssistantError::Llm("Empty response from Gemini".to_string())
        })
    }

    /// JSON-mode generation constrained by `schema`, deserialized into `T`
    pub async fn generate_structured<T: DeserializeOwned>(
        &self,
        prompt: &str,
        schema: serde_json::Value,
    ) -> Result<T> {
        let request = GeminiRequest {
            contents: vec![Content::user(prompt)],
            generation_config: GenerationConfig {
                temperature: 0.0,
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(schema),
                ..GenerationConfig::default()
            },
            system_instruction: None,
            tools: None,
            tool_config: None,
        };

        let content = self.send(&request).await?;
        let raw = content.text().ok_or_else(|| {
            AssistantError::Llm("Empty structured response from Gemini".to_string())
        })?;

        serde_json::from_str(strip_json_fence(&raw)).map_err(|e| {
            AssistantError::Llm(format!(
                "Failed to parse structured Gemini output: {} | raw={}",
                e, raw
            ))
        })
    }

    /// One model turn over a running conversation, with optional function
    /// declarations. Returns the model's content (text and/or function calls).
    ///
    /// `mode` only applies when `functions` is non-empty. A history holding
    /// `functionCall` parts still needs the declarations, so a text-only turn
    /// keeps them and passes `FunctionCallingMode::None`.
    pub async fn generate_turn(
        &self,
        contents: &[Content],
        system_prompt: Option<&str>,
        functions: &[FunctionDeclaration],
        mode: FunctionCallingMode,
    ) -> Result<Content> {
        let request = turn_request(contents, system_prompt, functions, mode);
        self.send(&request).await
    }

    /// Embed `text` with the given embedding model
    pub async fn embed(&self, text: &str, embedding_model: &str) -> Result<Vec<f32>> {
        let url = format!("{}/models/{}:embedContent", self.base_url, embedding_model);

        let request = EmbedRequest {
            content: Content {
                role: None,
                parts: vec![Part::text(text)],
            },
        };

        debug!(model = %embedding_model, "Calling Gemini embedContent");

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini embed error response: {}", error_text);
            return Err(AssistantError::Transport(format!(
                "Gemini embed error ({}): {}",
                status, error_text
            )));
        }

        let body: EmbedResponse = response.json().await.map_err(|e| {
            AssistantError::Llm(format!("Gemini embed parse error: {}", e))
        })?;

        Ok(body.embedding.values)
    }

    async fn send(&self, request: &GeminiRequest) -> Result<Content> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        debug!(model = %self.model, "Calling Gemini generateContent");

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(AssistantError::Transport(format!(
                "Gemini API error ({}): {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AssistantError::Llm(format!("Gemini parse error: {}", e))
        })?;

        if let Some(usage) = &gemini_response.usage_metadata {
            debug!(
                prompt_tokens = usage.prompt_token_count,
                candidate_tokens = usage.candidates_token_count,
                "Gemini usage"
            );
        }

        gemini_response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .ok_or_else(|| AssistantError::Llm("No response from Gemini API".to_string()))
    }
}

/// Text generation, function-calling turns and embeddings.
///
/// Agents and tools depend on this trait rather than on `GeminiClient`
/// directly so they can be driven by scripted models in tests.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String>;

    async fn complete_turn(
        &self,
        contents: &[Content],
        system_prompt: Option<&str>,
        functions: &[FunctionDeclaration],
        mode: FunctionCallingMode,
    ) -> Result<Content>;

    async fn embed(&self, text: &str, embedding_model: &str) -> Result<Vec<f32>>;
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn complete(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        self.generate(prompt, system_prompt).await
    }

    async fn complete_turn(
        &self,
        contents: &[Content],
        system_prompt: Option<&str>,
        functions: &[FunctionDeclaration],
        mode: FunctionCallingMode,
    ) -> Result<Content> {
        self.generate_turn(contents, system_prompt, functions, mode).await
    }

    async fn embed(&self, text: &str, embedding_model: &str) -> Result<Vec<f32>> {
        GeminiClient::embed(self, text, embedding_model).await
    }
}

/// reqwest errors carry the request URL; it is dropped so nothing request
/// specific reaches logs or replies.
fn transport_error(e: reqwest::Error) -> AssistantError {
    let e = e.without_url();
    error!("Gemini API request failed: {}", e);
    if e.is_timeout() {
        AssistantError::Timeout(format!("Gemini API request: {}", e))
    } else {
        AssistantError::Transport(format!("Gemini API error: {}", e))
    }
}

/// Models sometimes wrap JSON output in a ```json fence even in JSON mode
fn strip_json_fence(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

//
// ================= Wire Types =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: &str) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![Part::text(text)],
        }
    }

    /// All text parts joined, or `None` if there are none
    pub fn text(&self) -> Option<String> {
        let texts: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();

        if texts.is_empty() {
            None
        } else {
            Some(texts.concat())
        }
    }

    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.parts
            .iter()
            .filter_map(|p| p.function_call.as_ref())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

impl Part {
    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub fn function_response(name: &str, response: serde_json::Value) -> Self {
        Self {
            function_response: Some(FunctionResponse {
                name: name.to_string(),
                response,
            }),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionResponse {
    pub name: String,
    pub response: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDeclarations>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<ToolConfig>,
}

fn turn_request(
    contents: &[Content],
    system_prompt: Option<&str>,
    functions: &[FunctionDeclaration],
    mode: FunctionCallingMode,
) -> GeminiRequest {
    let (tools, tool_config) = if functions.is_empty() {
        (None, None)
    } else {
        (
            Some(vec![ToolDeclarations {
                function_declarations: functions.to_vec(),
            }]),
            Some(ToolConfig {
                function_calling_config: FunctionCallingConfig { mode },
            }),
        )
    };

    GeminiRequest {
        contents: contents.to_vec(),
        generation_config: GenerationConfig::default(),
        system_instruction: system_prompt.map(SystemInstruction::new),
        tools,
        tool_config,
    }
}

/// Whether the model may call the declared functions on a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunctionCallingMode {
    Auto,
    None,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolConfig {
    function_calling_config: FunctionCallingConfig,
}

#[derive(Debug, Serialize)]
struct FunctionCallingConfig {
    mode: FunctionCallingMode,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 2048,
            response_mime_type: None,
            response_schema: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

impl SystemInstruction {
    fn new(text: &str) -> Self {
        Self {
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: i32,
    #[serde(default)]
    candidates_token_count: i32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client_for(server: &mockito::ServerGuard) -> GeminiClient {
        GeminiClient::new("test-key", "test-model", Duration::from_secs(5))
            .unwrap()
            .with_base_url(&server.url())
    }

    fn text_body(text: &str) -> String {
        json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 4}
        })
        .to_string()
    }

    #[test]
    fn test_request_serialization() {
        let request = GeminiRequest {
            contents: vec![Content::user("What was Q3 revenue?")],
            generation_config: GenerationConfig::default(),
            system_instruction: Some(SystemInstruction::new("You are a finance assistant")),
            tools: Some(vec![ToolDeclarations {
                function_declarations: vec![FunctionDeclaration {
                    name: "sales_tool".to_string(),
                    description: "Sales data".to_string(),
                    parameters: json!({"type": "OBJECT"}),
                }],
            }]),
            tool_config: None,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["text"], "What was Q3 revenue?");
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 2048);
        assert_eq!(value["tools"][0]["functionDeclarations"][0]["name"], "sales_tool");
        assert!(value["generationConfig"].get("responseSchema").is_none());
        assert!(value["contents"][0]["parts"][0].get("functionCall").is_none());
    }

    #[tokio::test]
    async fn test_generate_returns_text() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/models/test-model:generateContent")
            .match_header("x-goog-api-key", "test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(text_body("Revenue grew 5%."))
            .create_async()
            .await;

        let client = client_for(&server);
        let answer = client.generate("How did revenue change?", None).await.unwrap();

        assert_eq!(answer, "Revenue grew 5%.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_transport_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/test-model:generateContent")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.generate("hi", None).await.unwrap_err();

        assert!(err.is_transport());
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_api_key_stays_out_of_urls_and_errors() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/models/test-model:generateContent")
            .match_query(Matcher::Missing)
            .match_header("x-goog-api-key", "test-key")
            .with_status(500)
            .with_body("internal")
            .create_async()
            .await;

        let err = client_for(&server).generate("hi", None).await.unwrap_err();
        assert!(!err.to_string().contains("test-key"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unreachable_host_error_hides_api_key() {
        let client = GeminiClient::new("SECRET-KEY-123", "m", Duration::from_secs(5))
            .unwrap()
            .with_base_url("http://127.0.0.1:1");

        let err = client.generate("hi", None).await.unwrap_err();

        assert!(err.is_transport());
        assert!(!err.to_string().contains("SECRET-KEY-123"));

        let err = client.embed("hi", "text-embedding-004").await.unwrap_err();
        assert!(!err.to_string().contains("SECRET-KEY-123"));
    }

    #[tokio::test]
    async fn test_empty_candidates_is_llm_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/test-model:generateContent")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"candidates": []}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.generate("hi", None).await.unwrap_err();
        assert!(matches!(err, AssistantError::Llm(_)));
    }

    #[derive(Debug, Deserialize)]
    struct Verdict {
        success: bool,
    }

    #[tokio::test]
    async fn test_generate_structured_sends_schema() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/test-model:generateContent")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({
                "generationConfig": {"responseMimeType": "application/json"}
            })))
            .with_status(200)
            .with_body(text_body("```json\n{\"success\": true}\n```"))
            .create_async()
            .await;

        let client = client_for(&server);
        let verdict: Verdict = client
            .generate_structured("classify", json!({"type": "OBJECT"}))
            .await
            .unwrap();
        assert!(verdict.success);
    }

    #[tokio::test]
    async fn test_generate_turn_parses_function_call() {
        let mut server = Server::new_async().await;
        let body = json!({
            "candidates": [{"content": {"role": "model", "parts": [
                {"functionCall": {"name": "sales_tool", "args": {"query": "total 2023 sales"}}}
            ]}}]
        });
        let _mock = server
            .mock("POST", "/models/test-model:generateContent")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        let content = client
            .generate_turn(&[Content::user("sales?")], None, &[], FunctionCallingMode::Auto)
            .await
            .unwrap();

        assert!(content.text().is_none());
        let calls = content.function_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "sales_tool");
        assert_eq!(calls[0].args["query"], "total 2023 sales");
    }

    fn declaration() -> FunctionDeclaration {
        FunctionDeclaration {
            name: "sales_tool".to_string(),
            description: "Sales figures".to_string(),
            parameters: json!({"type": "OBJECT"}),
        }
    }

    #[test]
    fn test_text_only_turn_keeps_declarations() {
        let history = [
            Content::user("sales?"),
            Content {
                role: Some("model".to_string()),
                parts: vec![Part {
                    function_call: Some(FunctionCall {
                        name: "sales_tool".to_string(),
                        args: json!({"query": "total"}),
                    }),
                    ..Part::default()
                }],
            },
        ];

        let request = turn_request(&history, None, &[declaration()], FunctionCallingMode::None);
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "sales_tool");
        assert_eq!(body["toolConfig"]["functionCallingConfig"]["mode"], "NONE");
    }

    #[test]
    fn test_turn_without_functions_has_no_tool_config() {
        let request = turn_request(&[Content::user("hi")], None, &[], FunctionCallingMode::Auto);
        let body = serde_json::to_value(&request).unwrap();

        assert!(body.get("tools").is_none());
        assert!(body.get("toolConfig").is_none());

        let request = turn_request(&[Content::user("hi")], None, &[declaration()], FunctionCallingMode::Auto);
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["toolConfig"]["functionCallingConfig"]["mode"], "AUTO");
    }

    #[tokio::test]
    async fn test_embed() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/text-embedding-004:embedContent")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"embedding": {"values": [0.1, 0.2, 0.3]}}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let values = client.embed("headcount", "text-embedding-004").await.unwrap();
        assert_eq!(values, vec![0.1, 0.2, 0.3]);
    }
}
