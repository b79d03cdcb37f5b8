//! Per-file dataset query tools
//!
//! Each CSV file in the data directory becomes one tool. A query is answered
//! in three steps: the model writes a pandas expression over `df`, the
//! expression is evaluated out of process, and the model turns the raw
//! output into an answer.

use crate::error::AssistantError;
use crate::execution::{python_literal, PythonRunner};
use crate::gemini::LanguageModel;
use crate::tools::{require_str, Tool};
use crate::Result;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const HEAD_ROWS: usize = 5;

const PANDAS_INSTRUCTIONS: &str = "\
1. Convert the query to executable Python code using Pandas.
2. The final line of code should be a Python expression that can be called with the `eval()` function.
3. The code should represent a solution to the query.
4. PRINT ONLY THE EXPRESSION.
5. Do not quote the expression.
6. Ensure to handle possible errors gracefully using try-except blocks.
7. If an error occurs, print a meaningful error message instead of the result.
";

/// A CSV file found in the data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSource {
    pub path: PathBuf,
    pub file_name: String,
    /// File stem with spaces replaced by underscores
    pub engine_name: String,
}

impl DatasetSource {
    pub fn from_path(path: &Path) -> Option<Self> {
        let is_csv = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if !is_csv {
            return None;
        }

        let file_name = path.file_name()?.to_string_lossy().into_owned();
        let stem = path.file_stem()?.to_string_lossy().into_owned();

        Some(Self {
            path: path.to_path_buf(),
            file_name,
            engine_name: stem.replace(' ', "_"),
        })
    }

    /// All CSV files directly inside `dir`, sorted by file name
    pub fn discover(dir: &Path) -> Result<Vec<Self>> {
        let mut sources: Vec<Self> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter_map(|path| Self::from_path(&path))
            .collect();

        sources.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        info!(dir = %dir.display(), count = sources.len(), "Discovered datasets");

        Ok(sources)
    }
}

/// Column type as pandas would infer it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    Int64,
    Float64,
    Bool,
    Object,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::Int64 => "int64",
            DType::Float64 => "float64",
            DType::Bool => "bool",
            DType::Object => "object",
        };
        write!(f, "{}", s)
    }
}

fn infer_dtype<'a>(values: impl Iterator<Item = &'a str>) -> DType {
    let mut seen = 0;
    let mut missing = false;
    let (mut ints, mut floats, mut bools) = (true, true, true);

    for raw in values {
        let value = raw.trim();
        if value.is_empty() {
            missing = true;
            continue;
        }
        seen += 1;
        ints &= value.parse::<i64>().is_ok();
        floats &= value.parse::<f64>().is_ok();
        bools &= value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false");
    }

    if seen == 0 {
        return DType::Object;
    }

    match (ints, floats, bools) {
        // missing values turn an integer column into floats
        (true, _, _) if missing => DType::Float64,
        (true, _, _) => DType::Int64,
        (_, true, _) => DType::Float64,
        (_, _, true) if !missing => DType::Bool,
        _ => DType::Object,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub dtype: DType,
}

/// Loaded dataset metadata plus the first few rows
#[derive(Debug, Clone)]
pub struct Dataset {
    pub source: DatasetSource,
    pub columns: Vec<Column>,
    pub head: Vec<Vec<String>>,
    pub row_count: usize,
}

impl Dataset {
    pub fn load(source: DatasetSource) -> Result<Self> {
        let mut reader = csv::Reader::from_path(&source.path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(|v| v.to_string()).collect::<Vec<_>>());
        }

        if headers.is_empty() {
            return Err(AssistantError::Dataset(format!(
                "{} has no header row",
                source.file_name
            )));
        }

        let columns = headers
            .iter()
            .enumerate()
            .map(|(i, name)| Column {
                name: name.clone(),
                dtype: infer_dtype(rows.iter().map(|row| row.get(i).map(String::as_str).unwrap_or(""))),
            })
            .collect();

        let row_count = rows.len();
        rows.truncate(HEAD_ROWS);

        debug!(file = %source.file_name, rows = row_count, "Dataset loaded");

        Ok(Self {
            source,
            columns,
            head: rows,
            row_count,
        })
    }

    /// Load every source, skipping files that fail to parse
    pub fn load_all(sources: Vec<DatasetSource>) -> Vec<Self> {
        sources
            .into_iter()
            .filter_map(|source| {
                let file_name = source.file_name.clone();
                match Self::load(source) {
                    Ok(dataset) => Some(dataset),
                    Err(e) => {
                        warn!(file = %file_name, error = %e, "Skipping unreadable dataset");
                        None
                    }
                }
            })
            .collect()
    }

    /// `col (dtype), ...`
    pub fn column_info(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("{} ({})", c.name, c.dtype))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Rough rendering of `print(df.head())`
    pub fn head_string(&self) -> String {
        let mut lines = Vec::with_capacity(self.head.len() + 1);
        let header: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        lines.push(format!("   {}", header.join("  ")));

        for (i, row) in self.head.iter().enumerate() {
            lines.push(format!("{}  {}", i, row.join("  ")));
        }

        lines.join("\n")
    }
}

pub fn build_pandas_prompt(dataset: &Dataset, query: &str) -> String {
    format!(
        "You are working with a pandas dataframe in Python.\n\
The name of the dataframe is `df`.\n\
The dataframe is loaded from the file '{file}'.\n\
This is the result of `print(df.head())`:\n\
{head}\n\
\n\
Follow these instructions:\n\
{instructions}\n\
Query: {query}\n\
\n\
Expression: ",
        file = dataset.source.file_name,
        head = dataset.head_string(),
        instructions = PANDAS_INSTRUCTIONS,
        query = query,
    )
}

pub fn build_synthesis_prompt(query: &str, instructions: &str, output: &str) -> String {
    format!(
        "Given an input question, synthesize a response from the query results.\n\
Query: {}\n\
\n\
Pandas Instructions (optional):\n\
{}\n\
\n\
Pandas Output: {}\n\
\n\
Response: ",
        query, instructions, output
    )
}

/// Strip fences, an `Expression:` prefix and surrounding quotes from model output
pub fn clean_expression(raw: &str) -> String {
    let mut expr = raw.trim();
    for prefix in ["```python", "```py", "```"] {
        if let Some(rest) = expr.strip_prefix(prefix) {
            expr = rest;
            break;
        }
    }
    expr = expr.trim_end_matches("```").trim();
    if let Some(rest) = expr.strip_prefix("Expression:") {
        expr = rest.trim();
    }
    expr.trim_matches('`').trim().to_string()
}

/// Script that runs every statement of `expression` but the last, then
/// prints the value of the last one when it is an expression
pub fn build_eval_script(csv_path: &str, expression: &str) -> String {
    format!(
        r#"import ast
import pandas as pd

df = pd.read_csv({path})
namespace = {{"df": df, "pd": pd}}

tree = ast.parse({expr}, mode="exec")
last = tree.body[-1] if tree.body else None
if isinstance(last, ast.Expr):
    head = ast.Module(body=tree.body[:-1], type_ignores=[])
    exec(compile(head, "<pandas>", "exec"), namespace)
    print(eval(compile(ast.Expression(body=last.value), "<pandas>", "eval"), namespace))
else:
    exec(compile(tree, "<pandas>", "exec"), namespace)
"#,
        path = python_literal(csv_path),
        expr = python_literal(expression),
    )
}

/// Tool answering questions about one dataset
pub struct DatasetQueryTool {
    dataset: Dataset,
    name: String,
    description: String,
    llm: Arc<dyn LanguageModel>,
    runner: PythonRunner,
}

impl DatasetQueryTool {
    pub fn new(dataset: Dataset, llm: Arc<dyn LanguageModel>, runner: PythonRunner) -> Self {
        let engine_name = &dataset.source.engine_name;
        let name = format!("{}_tool", engine_name);
        let description = format!(
            "Provides information from the {} dataset loaded from the file '{}'. \
Columns: {}. Use a detailed plain text question as input to the tool.",
            engine_name.replace('_', " "),
            dataset.source.file_name,
            dataset.column_info(),
        );

        Self {
            dataset,
            name,
            description,
            llm,
            runner,
        }
    }

    async fn evaluate(&self, expression: &str) -> String {
        let path = self.dataset.source.path.to_string_lossy();
        let script = build_eval_script(&path, expression);

        match self.runner.run(&script).await {
            Ok(output) if output.success => output.stdout.trim().to_string(),
            Ok(output) => format!(
                "There was an error running the output as Python code. Error message: {}",
                output.error_summary()
            ),
            Err(e) => format!(
                "There was an error running the output as Python code. Error message: {}",
                e
            ),
        }
    }
}

#[async_trait::async_trait]
impl Tool for DatasetQueryTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn call(&self, args: &Value) -> Result<String> {
        let query = require_str(args, "query")?;

        let raw = self
            .llm
            .complete(&build_pandas_prompt(&self.dataset, &query), None)
            .await?;
        let expression = clean_expression(&raw);
        debug!(tool = %self.name, expression = %expression, "Pandas expression generated");

        let output = self.evaluate(&expression).await;

        self.llm
            .complete(&build_synthesis_prompt(&query, &expression, &output), None)
            .await
    }
}
