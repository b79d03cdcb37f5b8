//! Out-of-process Python execution
//!
//! Generated code (pandas expressions, matplotlib plots) never runs inside the
//! service. Each run gets a fresh interpreter, so no plotting state survives
//! from one block to the next.

use crate::error::AssistantError;
use crate::models::Figure;
use crate::Result;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Captured result of one script run
#[derive(Debug, Clone)]
pub struct ScriptOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl ScriptOutput {
    /// Last non-empty stderr line, usually the exception message
    pub fn error_summary(&self) -> String {
        self.stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("script failed without output")
            .trim()
            .to_string()
    }
}

/// Runs Python scripts fed through stdin
#[derive(Debug, Clone)]
pub struct PythonRunner {
    python_bin: String,
    timeout: Duration,
}

impl PythonRunner {
    pub fn new(python_bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            python_bin: python_bin.into(),
            timeout,
        }
    }

    pub async fn run(&self, script: &str) -> Result<ScriptOutput> {
        let mut child = Command::new(&self.python_bin)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AssistantError::Execution(format!(
                    "Failed to start {}: {}",
                    self.python_bin, e
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(script.as_bytes()).await?;
            // closing stdin lets the interpreter start
            drop(stdin);
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                warn!(timeout = ?self.timeout, "Python script timed out");
                AssistantError::Timeout(format!(
                    "Python script exceeded {}s",
                    self.timeout.as_secs()
                ))
            })??;

        let result = ScriptOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
        };

        debug!(success = result.success, "Python script finished");

        Ok(result)
    }
}

/// Quote a string as a Python literal. JSON string syntax is a subset of
/// Python's.
pub fn python_literal(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Executes plotting code and hands back the resulting figure
#[async_trait]
pub trait PlotExecutor: Send + Sync {
    async fn execute(&self, code: &str) -> Result<Figure>;
}

/// Runs code under matplotlib's Agg backend and captures the current figure
pub struct MatplotlibExecutor {
    runner: PythonRunner,
}

impl MatplotlibExecutor {
    pub fn new(runner: PythonRunner) -> Self {
        Self { runner }
    }
}

/// Harness around user code: run it with `plt` (and `matplotlib`, and `pd`
/// when pandas is installed) already in scope, save the current figure, close
/// everything
pub fn build_plot_script(code: &str, output_path: &str) -> String {
    format!(
        r#"import matplotlib
matplotlib.use("Agg")
import matplotlib.pyplot as plt

namespace = {{"__name__": "__main__", "matplotlib": matplotlib, "plt": plt}}
try:
    import pandas as pd
    namespace["pd"] = pd
except ImportError:
    pass

exec(compile({code}, "<plot>", "exec"), namespace)

fig = plt.gcf()
fig.savefig({path}, format="png")
plt.close("all")
"#,
        code = python_literal(code),
        path = python_literal(output_path),
    )
}

#[async_trait]
impl PlotExecutor for MatplotlibExecutor {
    async fn execute(&self, code: &str) -> Result<Figure> {
        let target = tempfile::Builder::new()
            .prefix("figure-")
            .suffix(".png")
            .tempfile()?;
        let output_path = target.path().to_string_lossy().into_owned();

        let output = self.runner.run(&build_plot_script(code, &output_path)).await?;

        if !output.success {
            return Err(AssistantError::Execution(output.error_summary()));
        }

        let png = tokio::fs::read(target.path()).await?;
        if png.is_empty() {
            return Err(AssistantError::Execution(
                "plot code did not produce a figure".to_string(),
            ));
        }

        Ok(Figure { png })
    }
}
