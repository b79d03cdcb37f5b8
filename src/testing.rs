//! Deterministic stand-ins for the external collaborators, shared by unit tests

use crate::agent::Agent;
use crate::classifier::ResponseJudge;
use crate::error::AssistantError;
use crate::execution::PlotExecutor;
use crate::gemini::{Content, FunctionCallingMode, FunctionDeclaration, LanguageModel};
use crate::models::{AgentResponse, Figure};
use crate::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Language model that replays queued replies and records every prompt
#[derive(Default)]
pub struct ScriptedModel {
    completions: Mutex<VecDeque<String>>,
    turns: Mutex<VecDeque<Content>>,
    embedding: Vec<f32>,
    pub prompts: Mutex<Vec<String>>,
    pub turn_requests: Mutex<Vec<Vec<Content>>>,
    /// (declared function count, mode) per turn
    pub turn_tools: Mutex<Vec<(usize, FunctionCallingMode)>>,
}

impl ScriptedModel {
    pub fn with_completions(replies: &[&str]) -> Self {
        Self {
            completions: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn with_turns(turns: Vec<Content>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            ..Self::default()
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn prompt(&self, i: usize) -> String {
        self.prompts.lock().unwrap()[i].clone()
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str, _system_prompt: Option<&str>) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.completions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AssistantError::Llm("script exhausted".to_string()))
    }

    async fn complete_turn(
        &self,
        contents: &[Content],
        _system_prompt: Option<&str>,
        functions: &[FunctionDeclaration],
        mode: FunctionCallingMode,
    ) -> Result<Content> {
        self.turn_requests.lock().unwrap().push(contents.to_vec());
        self.turn_tools.lock().unwrap().push((functions.len(), mode));
        self.turns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AssistantError::Llm("script exhausted".to_string()))
    }

    async fn embed(&self, text: &str, _embedding_model: &str) -> Result<Vec<f32>> {
        self.prompts.lock().unwrap().push(text.to_string());
        Ok(self.embedding.clone())
    }
}

/// What a stub agent does when asked
pub enum StubReply {
    Text(String),
    TransportError,
    Hang,
}

/// Agent with a fixed reply that counts its calls
pub struct StubAgent {
    name: String,
    reply: StubReply,
    calls: Arc<AtomicUsize>,
}

impl StubAgent {
    pub fn replying(name: &str, text: &str) -> Self {
        Self::new(name, StubReply::Text(text.to_string()))
    }

    pub fn new(name: &str, reply: StubReply) -> Self {
        Self {
            name: name.to_string(),
            reply,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Agent for StubAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, _query: &str) -> Result<AgentResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            StubReply::Text(text) => Ok(AgentResponse::new(text.clone())),
            StubReply::TransportError => Err(AssistantError::Transport(format!(
                "{} unreachable",
                self.name
            ))),
            StubReply::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(AgentResponse::new("too late"))
            }
        }
    }
}

/// Judge with fixed verdicts per response text; unknown texts are failures
#[derive(Default)]
pub struct StubJudge {
    verdicts: HashMap<String, bool>,
    hang: bool,
    calls: Arc<AtomicUsize>,
}

impl StubJudge {
    pub fn new(verdicts: &[(&str, bool)]) -> Self {
        Self {
            verdicts: verdicts
                .iter()
                .map(|(text, verdict)| (text.to_string(), *verdict))
                .collect(),
            ..Self::default()
        }
    }

    /// Judge that never answers
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl ResponseJudge for StubJudge {
    async fn classify(&self, response_text: &str) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Ok(self.verdicts.get(response_text).copied().unwrap_or(false))
    }
}

/// Plot executor that fails on code containing `raise` and returns the code
/// bytes as the "figure" otherwise
#[derive(Default)]
pub struct StubExecutor {
    pub executed: Mutex<Vec<String>>,
}

#[async_trait]
impl PlotExecutor for StubExecutor {
    async fn execute(&self, code: &str) -> Result<Figure> {
        self.executed.lock().unwrap().push(code.to_string());
        if code.contains("raise") {
            return Err(AssistantError::Execution(
                "NameError: name 'undefined_df' is not defined".to_string(),
            ));
        }
        Ok(Figure {
            png: code.as_bytes().to_vec(),
        })
    }
}
