//! Model gateway abstraction.
//!
//! The [`ModelGateway`] trait decouples the task runner from the LLM
//! backend (currently an OpenAI-compatible HTTP API). Tests use scripted
//! gateways that return predetermined operations without network access.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use jsonschema::Draft;
use minijinja::{Environment, context};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::core::types::{Operation, Task};

const OPERATIONS_SCHEMA: &str = include_str!("../schemas/operations.schema.json");
const TASK_TEMPLATE: &str = include_str!("prompts/task.md");

/// Parameters for one gateway invocation.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub task: Task,
    /// Project root the operations will be applied under; forwarded so
    /// backends can scope their work.
    pub project_root: PathBuf,
    /// Optional prior context (e.g. notes from earlier tasks).
    pub prior_context: Option<String>,
}

/// Ordered operations plus a human-readable summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    pub operations: Vec<Operation>,
    pub notes: String,
}

/// Abstraction over model backends.
pub trait ModelGateway {
    /// Translate a task into file operations. Errors are contained by
    /// the runner: the task is marked failed and the run continues.
    fn propose(&self, request: &GatewayRequest) -> Result<GatewayResponse>;
}

/// Render the user prompt for a task.
pub fn render_prompt(request: &GatewayRequest) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("task", TASK_TEMPLATE)
        .context("task template should be valid")?;
    let template = env.get_template("task")?;
    let rendered = template.render(context! {
        id => request.task.id,
        title => request.task.title,
        description => request.task.description,
        kind => request.task.kind,
        prior_context => request.prior_context.as_deref().map(str::trim).filter(|s| !s.is_empty()),
    })?;
    Ok(rendered)
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    operations: Vec<Operation>,
    #[serde(default)]
    notes: String,
}

/// Parse and validate a model reply body.
///
/// The payload is checked against the embedded JSON Schema before being
/// deserialized, so malformed shapes produce one actionable error
/// instead of a partial parse.
pub fn parse_response(text: &str) -> Result<GatewayResponse> {
    let instance: Value = serde_json::from_str(text).context("parse model output as JSON")?;
    validate_schema(&instance)?;
    let raw: RawResponse =
        serde_json::from_value(instance).context("parse model output as operations")?;
    debug!(operations = raw.operations.len(), "gateway response parsed");
    Ok(GatewayResponse {
        operations: raw.operations,
        notes: raw.notes,
    })
}

fn validate_schema(instance: &Value) -> Result<()> {
    let schema: Value =
        serde_json::from_str(OPERATIONS_SCHEMA).context("parse operations schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile operations schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("model output failed validation:\n- {}", messages.join("\n- "));
    }
    Ok(())
}
