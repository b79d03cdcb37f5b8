//! Finance assistant pipeline
//!
//! QUERY → RESOLVE (primary / judge / fallback) → EXTRACT CODE → RENDER
//!
//! `answer` never fails: every outcome, errors included, becomes an
//! `AssistantReply` the caller can show as-is.

use crate::agent::{Agent, FunctionCallingAgent, ReActAgent};
use crate::classifier::{GeminiJudge, ResponseJudge};
use crate::config::AssistantConfig;
use crate::execution::{MatplotlibExecutor, PythonRunner};
use crate::extract::extract_and_clean_code;
use crate::gemini::{GeminiClient, LanguageModel};
use crate::models::{AgentRole, AssistantReply, RenderedSegment, ReplyStatus, Resolution, ToolDescriptor};
use crate::presentation::PresentationAdapter;
use crate::resolver::{DualAgentResolver, ResolverPolicy};
use crate::tools::{build_registry, Dataset, DatasetSource, ToolContext, VectorIndex};
use crate::Result;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const FALLBACK_NOTICE: &str = "Primary agent failed. Trying fallback agent...";
pub const BOTH_FAILED_MESSAGE: &str = "Both agents failed to provide a valid response.";

pub struct FinanceAssistant {
    resolver: DualAgentResolver,
    presenter: PresentationAdapter,
    tools: Vec<ToolDescriptor>,
}

impl FinanceAssistant {
    pub fn new(
        resolver: DualAgentResolver,
        presenter: PresentationAdapter,
        tools: Vec<ToolDescriptor>,
    ) -> Self {
        Self {
            resolver,
            presenter,
            tools,
        }
    }

    /// Wire up the full pipeline from configuration.
    ///
    /// Datasets and the vector index are resolved here, once. A missing data
    /// directory or index only shrinks the tool list.
    pub fn from_config(config: &AssistantConfig) -> Result<Self> {
        let client = GeminiClient::from_config(config, &config.model_name)?;
        let llm: Arc<dyn LanguageModel> = Arc::new(client);
        let runner = PythonRunner::new(&config.python_bin, config.plot_timeout);

        let sources = match DatasetSource::discover(&config.context_path) {
            Ok(sources) => sources,
            Err(e) => {
                warn!(
                    path = %config.context_path.display(),
                    error = %e,
                    "Dataset directory unavailable, continuing without dataset tools"
                );
                Vec::new()
            }
        };
        let datasets = Dataset::load_all(sources);

        // no index means no company_data_tool
        let index = VectorIndex::load(&config.contextdb_path)?;

        let context = ToolContext {
            llm: llm.clone(),
            runner: runner.clone(),
            embedding_model: config.embedding_model.clone(),
            similarity_top_k: config.similarity_top_k,
        };
        let registry = Arc::new(build_registry(datasets, index, &context));
        let tools = registry.descriptors();

        let primary: Arc<dyn Agent> = Arc::new(ReActAgent::new(
            llm.clone(),
            registry.clone(),
            config.max_agent_iterations,
        ));
        let fallback: Arc<dyn Agent> = Arc::new(FunctionCallingAgent::new(llm, registry));

        let judge_client = GeminiClient::from_config(config, &config.judge_model_name)?;
        let judge: Arc<dyn ResponseJudge> = Arc::new(GeminiJudge::new(judge_client));

        let resolver = DualAgentResolver::new(primary, fallback, judge)
            .with_policy(ResolverPolicy {
                fallback_on_primary_error: config.fallback_on_primary_error,
                cache_classifications: config.cache_classifications,
            })
            .with_timeouts(config.agent_timeout, config.request_timeout);

        let presenter = PresentationAdapter::new(Arc::new(MatplotlibExecutor::new(runner)));

        info!(
            model = %config.model_name,
            judge_model = %config.judge_model_name,
            tools = tools.len(),
            cache_classifications = config.cache_classifications,
            fallback_on_primary_error = config.fallback_on_primary_error,
            "Finance assistant initialized"
        );

        Ok(Self::new(resolver, presenter, tools))
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Run one query through the whole pipeline
    pub async fn answer(&self, query: &str) -> AssistantReply {
        let query_id = Uuid::new_v4();
        info!(query_id = %query_id, query = %query, "Handling query");

        let mut reply = AssistantReply {
            query_id,
            status: ReplyStatus::Answered,
            answered_by: None,
            notices: Vec::new(),
            segments: Vec::new(),
        };

        match self.resolver.resolve(query).await {
            Ok(Resolution::Resolved {
                response,
                answered_by,
            }) => {
                if answered_by == AgentRole::Fallback {
                    reply.notices.push(FALLBACK_NOTICE.to_string());
                }

                let extracted = extract_and_clean_code(&response.response);
                reply.segments = self.presenter.render(&extracted).await;
                reply.answered_by = Some(answered_by);

                info!(
                    query_id = %query_id,
                    answered_by = %answered_by,
                    code_blocks = extracted.code_blocks.len(),
                    tool_calls = response.sources.len(),
                    "Query answered"
                );
            }
            Ok(Resolution::BothFailed) => {
                warn!(query_id = %query_id, "Both agents failed");
                reply.status = ReplyStatus::BothFailed;
                reply.notices.push(FALLBACK_NOTICE.to_string());
                reply.segments.push(RenderedSegment::Error {
                    message: BOTH_FAILED_MESSAGE.to_string(),
                });
            }
            Err(e) => {
                error!(query_id = %query_id, error = %e, "Error handling response");
                reply.status = ReplyStatus::Error;
                reply.segments.push(RenderedSegment::Error {
                    message: format!("Error handling response: {}", e),
                });
            }
        }

        reply
    }
}
