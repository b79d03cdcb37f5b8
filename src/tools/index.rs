//! Company data tool over a pre-built vector index
//!
//! The index is produced offline and stored as `index.json`. Only querying
//! lives here: embed the question, rank nodes by cosine similarity, and let
//! the model answer from the top matches.

use crate::error::AssistantError;
use crate::gemini::LanguageModel;
use crate::tools::{require_str, Tool};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const INDEX_FILE: &str = "index.json";

const COMPANY_DATA_DESCRIPTION: &str = "Provides detailed information about company data including financials, operations, and organizational structure. Use this tool to query specific details or generate comprehensive reports based on the company's dataset.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexNode {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VectorIndex {
    pub nodes: Vec<IndexNode>,
}

impl VectorIndex {
    /// Load `index.json` from `dir`; `Ok(None)` when there is no index
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(INDEX_FILE);
        if !path.exists() {
            warn!(path = %path.display(), "No vector index found");
            return Ok(None);
        }

        let raw = std::fs::read_to_string(&path)?;
        let index: VectorIndex = serde_json::from_str(&raw).map_err(|e| {
            AssistantError::Index(format!("Invalid index at {}: {}", path.display(), e))
        })?;

        info!(nodes = index.nodes.len(), "Vector index loaded");

        Ok(Some(index))
    }

    /// The `k` nodes most similar to `query`, best first
    pub fn top_k(&self, query: &[f32], k: usize) -> Vec<(f32, &IndexNode)> {
        let mut scored: Vec<(f32, &IndexNode)> = self
            .nodes
            .iter()
            .map(|node| (cosine_similarity(query, &node.embedding), node))
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(k);
        scored
    }
}

/// Cosine similarity; 0.0 for mismatched or zero-length vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

pub fn build_answer_prompt(context: &[&str], query: &str) -> String {
    format!(
        "Context information is below.\n\
---------------------\n\
{}\n\
---------------------\n\
Given the context information and not prior knowledge, answer the query.\n\
Query: {}\n\
Answer: ",
        context.join("\n\n"),
        query
    )
}

pub struct CompanyDataTool {
    index: VectorIndex,
    llm: Arc<dyn LanguageModel>,
    embedding_model: String,
    top_k: usize,
}

impl CompanyDataTool {
    pub fn new(
        index: VectorIndex,
        llm: Arc<dyn LanguageModel>,
        embedding_model: String,
        top_k: usize,
    ) -> Self {
        Self {
            index,
            llm,
            embedding_model,
            top_k: top_k.max(1),
        }
    }
}

#[async_trait::async_trait]
impl Tool for CompanyDataTool {
    fn name(&self) -> &str {
        "company_data_tool"
    }

    fn description(&self) -> &str {
        COMPANY_DATA_DESCRIPTION
    }

    async fn call(&self, args: &Value) -> Result<String> {
        let query = require_str(args, "query")?;

        let embedding = self.llm.embed(&query, &self.embedding_model).await?;
        let matches = self.index.top_k(&embedding, self.top_k);

        if matches.is_empty() {
            return Ok("No relevant company data found.".to_string());
        }

        debug!(
            best_score = matches[0].0,
            ids = ?matches.iter().map(|(_, n)| n.id.as_str()).collect::<Vec<_>>(),
            "Company data retrieved"
        );

        let context: Vec<&str> = matches.iter().map(|(_, node)| node.text.as_str()).collect();
        self.llm.complete(&build_answer_prompt(&context, &query), None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;

    fn node(id: &str, text: &str, embedding: Vec<f32>) -> IndexNode {
        IndexNode {
            id: id.to_string(),
            text: text.to_string(),
            embedding,
        }
    }

    fn sample_index() -> VectorIndex {
        VectorIndex {
            nodes: vec![
                node("ops", "Operations span 12 countries.", vec![0.0, 1.0, 0.0]),
                node("fin", "FY2023 revenue was $4.2B.", vec![1.0, 0.0, 0.0]),
                node("org", "The CFO reports to the CEO.", vec![0.7, 0.7, 0.0]),
            ],
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_top_k_orders_by_similarity() {
        let index = sample_index();
        let top = index.top_k(&[1.0, 0.1, 0.0], 2);

        let ids: Vec<&str> = top.iter().map(|(_, n)| n.id.as_str()).collect();
        assert_eq!(ids, vec!["fin", "org"]);
        assert!(top[0].0 >= top[1].0);
    }

    #[test]
    fn test_load_missing_and_present() {
        let dir = tempfile::tempdir().unwrap();
        assert!(VectorIndex::load(dir.path()).unwrap().is_none());

        let index = sample_index();
        std::fs::write(
            dir.path().join(INDEX_FILE),
            serde_json::to_string(&index).unwrap(),
        )
        .unwrap();

        let loaded = VectorIndex::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn test_load_invalid_is_index_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(INDEX_FILE), "{not json").unwrap();

        let err = VectorIndex::load(dir.path()).unwrap_err();
        assert!(matches!(err, AssistantError::Index(_)));
    }

    #[tokio::test]
    async fn test_call_answers_from_top_nodes() {
        let model = Arc::new(
            ScriptedModel::with_completions(&["Revenue was $4.2B in FY2023."])
                .with_embedding(vec![1.0, 0.0, 0.0]),
        );
        let tool = CompanyDataTool::new(sample_index(), model.clone(), "text-embedding-004".to_string(), 1);

        let answer = tool
            .call(&serde_json::json!({"query": "What was revenue?"}))
            .await
            .unwrap();

        assert_eq!(answer, "Revenue was $4.2B in FY2023.");
        // prompt 0 is the embedded query, prompt 1 the answer prompt
        let prompt = model.prompt(1);
        assert!(prompt.contains("FY2023 revenue was $4.2B."));
        assert!(!prompt.contains("Operations span"));
        assert!(prompt.contains("Query: What was revenue?"));
    }

    #[tokio::test]
    async fn test_call_with_empty_index() {
        let model = Arc::new(ScriptedModel::default().with_embedding(vec![1.0]));
        let tool = CompanyDataTool::new(VectorIndex::default(), model, "m".to_string(), 3);

        let answer = tool.call(&serde_json::json!({"query": "anything"})).await.unwrap();
        assert_eq!(answer, "No relevant company data found.");
    }
}
