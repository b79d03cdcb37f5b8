//! Dual-agent resolution
//!
//! START → primary.chat → classify ─ success → Resolved(primary)
//!                                  └ failure → fallback.chat → classify ─ success → Resolved(fallback)
//!                                                                        └ failure → BothFailed
//!
//! A primary chat error ends the resolution immediately unless the policy
//! allows falling back on errors. At most two chat calls and two judge calls
//! are made per query.

use crate::agent::Agent;
use crate::classifier::{ResponseJudge, VerdictCache};
use crate::error::AssistantError;
use crate::models::{AgentResponse, AgentRole, Resolution};
use crate::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverPolicy {
    /// Try the fallback agent when the primary agent errors (not just when
    /// its answer is rejected). Off by default.
    pub fallback_on_primary_error: bool,
    /// Judge an identical response text once per resolution. Off by default.
    pub cache_classifications: bool,
}

pub struct DualAgentResolver {
    primary: Arc<dyn Agent>,
    fallback: Arc<dyn Agent>,
    judge: Arc<dyn ResponseJudge>,
    policy: ResolverPolicy,
    chat_timeout: Option<Duration>,
    judge_timeout: Option<Duration>,
}

impl DualAgentResolver {
    pub fn new(
        primary: Arc<dyn Agent>,
        fallback: Arc<dyn Agent>,
        judge: Arc<dyn ResponseJudge>,
    ) -> Self {
        Self {
            primary,
            fallback,
            judge,
            policy: ResolverPolicy::default(),
            chat_timeout: None,
            judge_timeout: None,
        }
    }

    pub fn with_policy(mut self, policy: ResolverPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeouts(mut self, chat_timeout: Duration, judge_timeout: Duration) -> Self {
        self.chat_timeout = Some(chat_timeout);
        self.judge_timeout = Some(judge_timeout);
        self
    }

    /// Resolve `query` to a validated response or `BothFailed`.
    ///
    /// Judge errors always propagate with their original kind; only primary
    /// chat errors are subject to the fallback policy.
    pub async fn resolve(&self, query: &str) -> Result<Resolution> {
        let mut cache = self.policy.cache_classifications.then(VerdictCache::new);

        match self.chat(AgentRole::Primary, query).await {
            Ok(response) => {
                if self.judge(&mut cache, AgentRole::Primary, &response).await? {
                    return Ok(Resolution::Resolved {
                        response,
                        answered_by: AgentRole::Primary,
                    });
                }
                warn!("Primary agent failed. Trying fallback agent...");
            }
            Err(e) if self.policy.fallback_on_primary_error => {
                warn!(error = %e, "Primary agent errored. Trying fallback agent...");
            }
            Err(e) => return Err(e),
        }

        let response = self.chat(AgentRole::Fallback, query).await?;
        if self.judge(&mut cache, AgentRole::Fallback, &response).await? {
            return Ok(Resolution::Resolved {
                response,
                answered_by: AgentRole::Fallback,
            });
        }

        warn!("Both agents failed to provide a valid response.");
        Ok(Resolution::BothFailed)
    }

    async fn chat(&self, role: AgentRole, query: &str) -> Result<AgentResponse> {
        let agent = match role {
            AgentRole::Primary => &self.primary,
            AgentRole::Fallback => &self.fallback,
        };

        bounded(
            self.chat_timeout,
            format!("{} agent '{}'", role, agent.name()),
            agent.chat(query),
        )
        .await
    }

    async fn judge(
        &self,
        cache: &mut Option<VerdictCache>,
        role: AgentRole,
        response: &AgentResponse,
    ) -> Result<bool> {
        let what = "response classification".to_string();
        let text = response.response.as_str();

        let success = match cache {
            Some(cache) => {
                bounded(self.judge_timeout, what, cache.classify(self.judge.as_ref(), text)).await?
            }
            None => bounded(self.judge_timeout, what, self.judge.classify(text)).await?,
        };

        info!(role = %role, success, "Agent response classified");

        Ok(success)
    }
}

async fn bounded<T, F>(limit: Option<Duration>, what: String, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            warn!(call = %what, timeout = ?limit, "External call timed out");
            AssistantError::Timeout(format!("{} exceeded {}ms", what, limit.as_millis()))
        })?,
        None => fut.await,
    }
}
