//! ReAct agent
//!
//! Drives the model through a plain-text reasoning protocol:
//!
//! ```text
//! Thought: ...
//! Action: <tool name>
//! Action Input: {"query": "..."}
//! Observation: <tool output, appended by the agent>
//! ...
//! Answer: <final answer>
//! ```
//!
//! Each model turn is bounded; running out of iterations is an error.

use crate::agent::{Agent, FINANCE_SYSTEM_PROMPT};
use crate::error::AssistantError;
use crate::gemini::LanguageModel;
use crate::models::{AgentResponse, ToolSource};
use crate::tools::ToolRegistry;
use crate::Result;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

lazy_static! {
    static ref ACTION: Regex =
        Regex::new(r"(?s)Action:\s*([A-Za-z0-9_\-]+).*?Action Input:\s*(.*)$").unwrap();
    static ref ANSWER: Regex = Regex::new(r"(?s)Answer:\s*(.*)$").unwrap();
    static ref THOUGHT: Regex = Regex::new(r"(?s)Thought:\s*(.*?)\s*(?:Action:|Answer:|$)").unwrap();
}

/// One parsed model turn
#[derive(Debug, Clone, PartialEq)]
pub enum ReActStep {
    Action {
        thought: Option<String>,
        tool: String,
        input: Value,
    },
    Answer {
        thought: Option<String>,
        answer: String,
    },
}

/// Drop anything from the first `Observation:` on; the model must not
/// invent tool output.
fn truncate_at_observation(output: &str) -> &str {
    match output.find("Observation:") {
        Some(pos) => &output[..pos],
        None => output,
    }
}

fn parse_action_input(raw: &str) -> Value {
    let raw = raw.trim();
    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&raw[start..=end]) {
                return value;
            }
        }
    }
    // not JSON: treat the first line as the query itself
    Value::String(raw.lines().next().unwrap_or("").trim().to_string())
}

/// Parse one model turn. Output with neither an action nor an `Answer:` is
/// taken as the answer itself.
pub fn parse_react_output(output: &str) -> Result<ReActStep> {
    let text = truncate_at_observation(output).trim();
    if text.is_empty() {
        return Err(AssistantError::Agent("Empty model output".to_string()));
    }

    let thought = THOUGHT
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty());

    let action = ACTION.captures(text);
    let answer = ANSWER.captures(text);

    let action_first = match (&action, &answer) {
        (Some(a), Some(b)) => a.get(0).map(|m| m.start()) < b.get(0).map(|m| m.start()),
        (Some(_), None) => true,
        _ => false,
    };

    if action_first {
        if let Some(caps) = action {
            return Ok(ReActStep::Action {
                thought,
                tool: caps[1].trim().to_string(),
                input: parse_action_input(&caps[2]),
            });
        }
    }

    if let Some(caps) = answer {
        return Ok(ReActStep::Answer {
            thought,
            answer: caps[1].trim().to_string(),
        });
    }

    Ok(ReActStep::Answer {
        thought: None,
        answer: text.to_string(),
    })
}

pub struct ReActAgent {
    llm: Arc<dyn LanguageModel>,
    tools: Arc<ToolRegistry>,
    max_iterations: usize,
    system_prompt: String,
}

impl ReActAgent {
    pub fn new(llm: Arc<dyn LanguageModel>, tools: Arc<ToolRegistry>, max_iterations: usize) -> Self {
        let system_prompt = build_system_prompt(&tools);
        Self {
            llm,
            tools,
            max_iterations: max_iterations.max(1),
            system_prompt,
        }
    }
}

fn build_system_prompt(tools: &ToolRegistry) -> String {
    let mut prompt = String::from(FINANCE_SYSTEM_PROMPT);
    prompt.push_str("\n\n## Tools\nYou have access to the following tools:\n");

    for declaration in tools.function_declarations() {
        prompt.push_str(&format!(
            "> Tool Name: {}\nTool Description: {}\nTool Args: {}\n\n",
            declaration.name, declaration.description, declaration.parameters
        ));
    }

    prompt.push_str(&format!(
        r#"## Output Format
To answer the question, use the following format:

Thought: I need to use a tool to help me answer the question.
Action: tool name (one of {})
Action Input: the input to the tool, in a JSON format representing the kwargs (e.g. {{"query": "hello world"}})

Stop after Action Input. You will then receive:

Observation: tool response

Repeat as needed. When you have enough information, reply with:

Thought: I can answer without using any more tools.
Answer: your answer here
"#,
        tools.list().join(", ")
    ));

    prompt
}

#[async_trait]
impl Agent for ReActAgent {
    fn name(&self) -> &str {
        "react"
    }

    async fn chat(&self, query: &str) -> Result<AgentResponse> {
        let mut transcript = format!("Query: {}\n", query);
        let mut sources = Vec::new();

        for iteration in 0..self.max_iterations {
            let output = self
                .llm
                .complete(&transcript, Some(&self.system_prompt))
                .await?;

            match parse_react_output(&output)? {
                ReActStep::Answer { answer, .. } => {
                    info!(iterations = iteration + 1, tool_calls = sources.len(), "ReAct agent answered");
                    return Ok(AgentResponse {
                        response: answer,
                        sources,
                    });
                }
                ReActStep::Action { tool, input, .. } => {
                    debug!(iteration, tool = %tool, "ReAct action");

                    let observation = match self.tools.call(&tool, &input).await {
                        Ok(content) => {
                            sources.push(ToolSource {
                                tool_name: tool.clone(),
                                raw_input: input.clone(),
                                content: content.clone(),
                            });
                            content
                        }
                        Err(e) => {
                            warn!(tool = %tool, error = %e, "Tool call failed");
                            format!("Error: {}", e)
                        }
                    };

                    transcript.push_str(truncate_at_observation(&output).trim_end());
                    transcript.push_str(&format!("\nObservation: {}\n", observation));
                }
            }
        }

        warn!(max_iterations = self.max_iterations, "ReAct agent ran out of iterations");
        Err(AssistantError::MaxIterations(self.max_iterations))
    }
}
