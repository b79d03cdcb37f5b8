//! Finance Assistant
//!
//! Answers financial questions over local datasets and a company-data index:
//! - A primary ReAct agent answers first; a judge validates the answer
//! - A function-calling fallback agent gets one chance when it is rejected
//! - Python code blocks in the answer are executed and rendered as figures
//!
//! PIPELINE:
//! QUERY → PRIMARY → JUDGE → FALLBACK? → JUDGE → EXTRACT → RENDER

pub mod agent;
pub mod api;
pub mod assistant;
pub mod classifier;
pub mod config;
pub mod error;
pub mod execution;
pub mod extract;
pub mod gemini;
pub mod models;
pub mod presentation;
pub mod resolver;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use error::Result;

// Re-export common types
pub use assistant::FinanceAssistant;
pub use models::*;
pub use resolver::{DualAgentResolver, ResolverPolicy};
