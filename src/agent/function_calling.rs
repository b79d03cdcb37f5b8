//! Function-calling agent
//!
//! Declares every registered tool as a Gemini function and lets the model
//! request calls natively. Requested calls are executed and their results fed
//! back as `functionResponse` parts until the model answers in text.

use crate::agent::{Agent, FINANCE_SYSTEM_PROMPT};
use crate::error::AssistantError;
use crate::gemini::{Content, FunctionCallingMode, FunctionDeclaration, LanguageModel, Part};
use crate::models::{AgentResponse, ToolSource};
use crate::tools::ToolRegistry;
use crate::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Rounds of function calls before the model is made to answer
pub const DEFAULT_MAX_FUNCTION_CALLS: usize = 5;

pub struct FunctionCallingAgent {
    llm: Arc<dyn LanguageModel>,
    tools: Arc<ToolRegistry>,
    declarations: Vec<FunctionDeclaration>,
    max_function_calls: usize,
}

impl FunctionCallingAgent {
    pub fn new(llm: Arc<dyn LanguageModel>, tools: Arc<ToolRegistry>) -> Self {
        let declarations = tools.function_declarations();
        Self {
            llm,
            tools,
            declarations,
            max_function_calls: DEFAULT_MAX_FUNCTION_CALLS,
        }
    }

    pub fn with_max_function_calls(mut self, max_function_calls: usize) -> Self {
        self.max_function_calls = max_function_calls;
        self
    }
}

#[async_trait]
impl Agent for FunctionCallingAgent {
    fn name(&self) -> &str {
        "function_calling"
    }

    async fn chat(&self, query: &str) -> Result<AgentResponse> {
        let mut contents = vec![Content::user(query)];
        let mut sources = Vec::new();

        for round in 0..self.max_function_calls {
            let turn = self
                .llm
                .complete_turn(
                    &contents,
                    Some(FINANCE_SYSTEM_PROMPT),
                    &self.declarations,
                    FunctionCallingMode::Auto,
                )
                .await?;

            let calls: Vec<_> = turn.function_calls().into_iter().cloned().collect();
            if calls.is_empty() {
                info!(rounds = round, tool_calls = sources.len(), "Function-calling agent answered");
                return turn
                    .text()
                    .map(|response| AgentResponse { response, sources })
                    .ok_or_else(|| AssistantError::Agent("Model returned no text".to_string()));
            }

            let mut responses = Vec::with_capacity(calls.len());
            for call in calls {
                debug!(round, tool = %call.name, "Function call requested");

                let part = match self.tools.call(&call.name, &call.args).await {
                    Ok(content) => {
                        let part = Part::function_response(&call.name, json!({ "content": content }));
                        sources.push(ToolSource {
                            tool_name: call.name.clone(),
                            raw_input: call.args.clone(),
                            content,
                        });
                        part
                    }
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "Function call failed");
                        Part::function_response(&call.name, json!({ "error": e.to_string() }))
                    }
                };
                responses.push(part);
            }

            contents.push(Content {
                role: Some("model".to_string()),
                ..turn
            });
            contents.push(Content {
                role: Some("user".to_string()),
                parts: responses,
            });
        }

        // out of function-call budget: the history holds functionCall parts,
        // so the declarations stay and calling is switched off
        let turn = self
            .llm
            .complete_turn(
                &contents,
                Some(FINANCE_SYSTEM_PROMPT),
                &self.declarations,
                FunctionCallingMode::None,
            )
            .await?;

        turn.text()
            .map(|response| AgentResponse { response, sources })
            .ok_or_else(|| AssistantError::Agent("Model returned no text".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::FunctionCall;
    use crate::testing::ScriptedModel;
    use crate::tools::MarkdownReportTool;

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(MarkdownReportTool));
        Arc::new(registry)
    }

    fn call_turn(name: &str, args: serde_json::Value) -> Content {
        Content {
            role: Some("model".to_string()),
            parts: vec![Part {
                function_call: Some(FunctionCall {
                    name: name.to_string(),
                    args,
                }),
                ..Part::default()
            }],
        }
    }

    fn text_turn(text: &str) -> Content {
        Content {
            role: Some("model".to_string()),
            parts: vec![Part::text(text)],
        }
    }

    #[tokio::test]
    async fn test_direct_answer() {
        let model = Arc::new(ScriptedModel::with_turns(vec![text_turn("Revenue grew 5%.")]));
        let agent = FunctionCallingAgent::new(model, registry());

        let response = agent.chat("How did revenue change?").await.unwrap();
        assert_eq!(response.response, "Revenue grew 5%.");
        assert!(response.sources.is_empty());
    }

    #[tokio::test]
    async fn test_executes_call_and_feeds_result_back() {
        let model = Arc::new(ScriptedModel::with_turns(vec![
            call_turn("GenerateMarkdownReport", json!({"query": "Q3"})),
            text_turn("Report attached."),
        ]));
        let agent = FunctionCallingAgent::new(model.clone(), registry());

        let response = agent.chat("Report on Q3").await.unwrap();

        assert_eq!(response.response, "Report attached.");
        assert_eq!(response.sources.len(), 1);
        assert_eq!(response.sources[0].raw_input, json!({"query": "Q3"}));

        let requests = model.turn_requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let second = &requests[1];
        assert_eq!(second.len(), 3);
        assert_eq!(second[1].role.as_deref(), Some("model"));
        let reply = second[2].parts[0].function_response.as_ref().unwrap();
        assert_eq!(reply.name, "GenerateMarkdownReport");
        assert!(reply.response["content"].as_str().unwrap().starts_with("# Report"));
    }

    #[tokio::test]
    async fn test_tool_error_is_returned_to_model() {
        let model = Arc::new(ScriptedModel::with_turns(vec![
            call_turn("missing_tool", json!({})),
            text_turn("That tool is unavailable."),
        ]));
        let agent = FunctionCallingAgent::new(model.clone(), registry());

        let response = agent.chat("q").await.unwrap();
        assert_eq!(response.response, "That tool is unavailable.");

        let requests = model.turn_requests.lock().unwrap();
        let reply = requests[1][2].parts[0].function_response.as_ref().unwrap();
        assert!(reply.response["error"].as_str().unwrap().contains("missing_tool"));
    }

    #[tokio::test]
    async fn test_call_budget_forces_text_answer() {
        let model = Arc::new(ScriptedModel::with_turns(vec![
            call_turn("GenerateMarkdownReport", json!({"query": "a"})),
            call_turn("GenerateMarkdownReport", json!({"query": "b"})),
            text_turn("Done after budget."),
        ]));
        let agent = FunctionCallingAgent::new(model.clone(), registry()).with_max_function_calls(2);

        let response = agent.chat("q").await.unwrap();

        assert_eq!(response.response, "Done after budget.");
        assert_eq!(response.sources.len(), 2);
        assert_eq!(model.turn_requests.lock().unwrap().len(), 3);

        let declared = agent.declarations.len();
        assert!(declared > 0);
        assert_eq!(
            *model.turn_tools.lock().unwrap(),
            vec![
                (declared, FunctionCallingMode::Auto),
                (declared, FunctionCallingMode::Auto),
                (declared, FunctionCallingMode::None),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_turn_is_agent_error() {
        let model = Arc::new(ScriptedModel::with_turns(vec![Content {
            role: Some("model".to_string()),
            parts: vec![],
        }]));
        let agent = FunctionCallingAgent::new(model, registry());

        let err = agent.chat("q").await.unwrap_err();
        assert!(matches!(err, AssistantError::Agent(_)));
    }
}
