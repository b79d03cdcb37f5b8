//! Tool trait and registry
//!
//! Tools are named, described callables the agents may invoke. Every tool
//! takes JSON arguments and returns text. The registry is built once at
//! startup from a pre-resolved list of datasets and an optional vector index.

use crate::error::AssistantError;
use crate::execution::PythonRunner;
use crate::gemini::{FunctionDeclaration, LanguageModel};
use crate::models::ToolDescriptor;
use crate::Result;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub mod dataset;
pub mod index;
pub mod plot;
pub mod report;

pub use dataset::{Dataset, DatasetQueryTool, DatasetSource};
pub use index::{CompanyDataTool, VectorIndex};
pub use plot::PlotCodeTool;
pub use report::MarkdownReportTool;

/// Trait for a single tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// JSON schema (Gemini dialect) of the arguments
    fn parameters(&self) -> Value {
        query_parameters()
    }

    async fn call(&self, args: &Value) -> Result<String>;
}

/// Schema for tools taking a single natural-language `query`
pub fn query_parameters() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "query": {
                "type": "STRING",
                "description": "A detailed plain text question"
            }
        },
        "required": ["query"]
    })
}

/// Tool registry for looking up and executing tools.
///
/// Keeps registration order so prompts list tools deterministically.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn ordered(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.order.iter().filter_map(|name| self.tools.get(name))
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.ordered()
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
            })
            .collect()
    }

    pub fn function_declarations(&self) -> Vec<FunctionDeclaration> {
        self.ordered()
            .map(|tool| FunctionDeclaration {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    /// Look up `name` and call it
    pub async fn call(&self, name: &str, args: &Value) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| AssistantError::ToolNotFound(name.to_string()))?;
        tool.call(args).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a required string argument.
///
/// A bare JSON string counts as the value of any single argument, and
/// `input` is accepted for `query` since ReAct models often use it.
pub fn require_str(args: &Value, key: &str) -> Result<String> {
    if let Some(s) = args.as_str() {
        return Ok(s.to_string());
    }

    let value = args
        .get(key)
        .or_else(|| if key == "query" { args.get("input") } else { None })
        .and_then(|v| v.as_str());

    match value {
        Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
        _ => Err(AssistantError::InvalidToolInput(format!(
            "Expected '{}' in tool arguments, got {}",
            key, args
        ))),
    }
}

/// Shared collaborators handed to every tool
#[derive(Clone)]
pub struct ToolContext {
    pub llm: Arc<dyn LanguageModel>,
    pub runner: PythonRunner,
    pub embedding_model: String,
    pub similarity_top_k: usize,
}

/// Build the tool list: one query tool per dataset, the report and plot
/// tools, and the company data tool when an index is available.
pub fn build_registry(
    datasets: Vec<Dataset>,
    index: Option<VectorIndex>,
    context: &ToolContext,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    for dataset in datasets {
        registry.register(Arc::new(DatasetQueryTool::new(
            dataset,
            context.llm.clone(),
            context.runner.clone(),
        )));
    }

    registry.register(Arc::new(MarkdownReportTool));
    registry.register(Arc::new(PlotCodeTool::new(context.llm.clone())));

    if let Some(index) = index {
        registry.register(Arc::new(CompanyDataTool::new(
            index,
            context.llm.clone(),
            context.embedding_model.clone(),
            context.similarity_top_k,
        )));
    }

    info!(tools = ?registry.list(), "Tool registry built");

    registry
}
