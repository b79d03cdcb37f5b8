//! Core data models for the finance assistant

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//
// ================= Enums =================
//

/// Which side of the primary/fallback pair produced an answer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Primary,
    Fallback,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Answered,
    BothFailed,
    Error,
}

//
// ================= Agent Output =================
//

/// A tool invocation made by an agent while answering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSource {
    pub tool_name: String,
    pub raw_input: serde_json::Value,
    pub content: String,
}

/// Raw text returned by an agent, plus the tool calls behind it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub response: String,
    #[serde(default)]
    pub sources: Vec<ToolSource>,
}

impl AgentResponse {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            sources: Vec::new(),
        }
    }
}

/// Outcome of running a query through the primary/fallback pair.
///
/// `BothFailed` is a value, not an error: both agents answered but the judge
/// rejected both answers.
#[derive(Debug, Clone)]
pub enum Resolution {
    Resolved {
        response: AgentResponse,
        answered_by: AgentRole,
    },
    BothFailed,
}

impl Resolution {
    pub fn response(&self) -> Option<&AgentResponse> {
        match self {
            Resolution::Resolved { response, .. } => Some(response),
            Resolution::BothFailed => None,
        }
    }
}

//
// ================= Extraction =================
//

/// A fenced code snippet lifted out of a response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeBlock {
    /// Position among the response's code blocks
    pub index: usize,
    pub language: String,
    pub source: String,
}

//
// ================= Presentation =================
//

/// A PNG figure captured from one plotting run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Figure {
    pub png: Vec<u8>,
}

/// One renderable piece of an answer, in display order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RenderedSegment {
    Markdown { content: String },
    Figure { mime_type: String, data: String },
    Error { message: String },
}

/// Final, user-facing reply for one query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantReply {
    pub query_id: Uuid,
    pub status: ReplyStatus,
    pub answered_by: Option<AgentRole>,
    pub notices: Vec<String>,
    pub segments: Vec<RenderedSegment>,
}

//
// ================= Tools =================
//

/// Name and description of a registered tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentRole::Primary => "primary",
            AgentRole::Fallback => "fallback",
        };
        write!(f, "{}", s)
    }
}
