//! Markdown report tool

use crate::tools::{require_str, Tool};
use crate::Result;
use serde_json::Value;

/// Skeleton report for the user's query
pub fn generate_markdown_report(query: &str) -> String {
    format!(
        "# Report\n\n## Query\n\n{}\n\n## Analysis\n\nThis section contains the analysis of the query.",
        query
    )
}

pub struct MarkdownReportTool;

#[async_trait::async_trait]
impl Tool for MarkdownReportTool {
    fn name(&self) -> &str {
        "GenerateMarkdownReport"
    }

    fn description(&self) -> &str {
        "Generates a markdown report based on the user's query."
    }

    async fn call(&self, args: &Value) -> Result<String> {
        let query = require_str(args, "query")?;
        Ok(generate_markdown_report(&query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_report_layout() {
        let report = assert_ok!(
            MarkdownReportTool
                .call(&serde_json::json!({"query": "Summarise Q3 cash flow"}))
                .await
        );

        assert!(report.starts_with("# Report\n\n## Query\n\nSummarise Q3 cash flow\n\n## Analysis"));
    }

    #[tokio::test]
    async fn test_missing_query() {
        let result = MarkdownReportTool.call(&serde_json::json!({})).await;
        assert!(result.is_err());
    }
}
