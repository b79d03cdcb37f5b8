//! Plot code generation tool
//!
//! Asks the model for matplotlib code and returns it as a fenced python block,
//! which the presentation layer later extracts and executes.

use crate::extract::first_code_block;
use crate::gemini::LanguageModel;
use crate::tools::{require_str, Tool};
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;

const PLOT_SYSTEM_PROMPT: &str = r#"You write Python plotting code.

Rules:
- Use matplotlib.pyplot imported as plt (pandas is available as pd)
- Embed any data you need directly in the code; no file or network access
- Build exactly one figure; do not call plt.show() or plt.savefig()
- Reply with a single ```python code block and nothing else"#;

pub struct PlotCodeTool {
    llm: Arc<dyn LanguageModel>,
}

impl PlotCodeTool {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait::async_trait]
impl Tool for PlotCodeTool {
    fn name(&self) -> &str {
        "generate_custom_plot_code"
    }

    fn description(&self) -> &str {
        "Generates Python code for plotting using Matplotlib based on the user's query"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "context_str": {
                    "type": "STRING",
                    "description": "Data and context the plot should be based on"
                },
                "query_str": {
                    "type": "STRING",
                    "description": "The user's query requesting a plot or graph"
                }
            },
            "required": ["context_str", "query_str"]
        })
    }

    async fn call(&self, args: &Value) -> Result<String> {
        let context_str = require_str(args, "context_str")?;
        let query_str = require_str(args, "query_str")?;

        let complete_query = format!(
            "Given the following context:\n{}\n\n{}",
            context_str, query_str
        );

        let raw = self
            .llm
            .complete(&complete_query, Some(PLOT_SYSTEM_PROMPT))
            .await?;

        let code = first_code_block(&raw).unwrap_or_else(|| {
            raw.trim()
                .trim_start_matches("```")
                .trim_end_matches("```")
                .trim()
                .to_string()
        });

        Ok(format!("```python\n{}\n```", code))
    }
}
