//! Agents
//!
//! An agent takes a natural-language question and returns free text,
//! possibly after calling tools. Two implementations share one tool registry:
//! - `ReActAgent`: text protocol (Thought / Action / Observation / Answer)
//! - `FunctionCallingAgent`: Gemini native function calling

use crate::models::AgentResponse;
use crate::Result;
use async_trait::async_trait;

pub mod function_calling;
pub mod react;

pub use function_calling::FunctionCallingAgent;
pub use react::ReActAgent;

/// Anything that can answer a query
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    async fn chat(&self, query: &str) -> Result<AgentResponse>;
}

/// Persona shared by both agents
pub const FINANCE_SYSTEM_PROMPT: &str = r#"You are a professional finance assistant.

Guidelines:
- Answer from the available tools and datasets; do not invent figures
- Be structured and concise, and use markdown for tables and lists
- When the user asks for a chart or plot, include the plotting code as a single ```python block in your final answer
- If the data needed is not available, say so plainly"#;
