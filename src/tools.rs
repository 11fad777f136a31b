//! Tool trait, registry, and the built-in retrieval tools.
//!
//! Every retrieval operation is exposed as a [`Tool`]: a name, a
//! description, a JSON Schema for its parameters, and an async `execute`.
//! The HTTP server lists and dispatches whatever is in the
//! [`ToolRegistry`]; custom tools register alongside the built-ins.
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  ToolRegistry                    │
//! │  semantic_search  lexical_search  regex_search   │
//! │  get_content      (custom tools ...)             │
//! └──────────────────────┬───────────────────────────┘
//!                        ▼
//!        ToolContext → Services → ChunkStore / Embedder
//! ```
//!
//! Parameter errors are raised as
//! [`RetrievalError::InvalidArgument`] so callers can tell them apart from
//! backend failures by downcasting the returned `anyhow::Error`.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};

use chunkseek_core::search::ContentParams;
use chunkseek_core::store::Operator;
use chunkseek_core::RetrievalError;

use crate::services::Services;

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

/// A tool that agents can discover and call.
///
/// Registered tools appear in `GET /tools/list` and are invoked with
/// `POST /tools/{name}`.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use serde_json::{json, Value};
/// use chunkseek::tools::{Tool, ToolContext};
///
/// pub struct IndexInfoTool;
///
/// #[async_trait]
/// impl Tool for IndexInfoTool {
///     fn name(&self) -> &str { "index_info" }
///     fn description(&self) -> &str { "Report the configured index" }
///
///     fn parameters_schema(&self) -> Value {
///         json!({ "type": "object", "properties": {} })
///     }
///
///     async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
///         Ok(json!({ "index": ctx.services().config().store.index }))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Route name: lowercase with underscores.
    fn name(&self) -> &str;

    /// One-line description for agent discovery.
    fn description(&self) -> &str;

    /// Whether this is one of the built-in retrieval tools.
    fn is_builtin(&self) -> bool {
        false
    }

    /// JSON Schema (`type: "object"`) for the parameters.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. The value is wrapped in `{ "result": ... }` by the server.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Entry in the `GET /tools/list` response.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub builtin: bool,
    pub parameters: Value,
}

impl ToolInfo {
    pub fn of(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            builtin: tool.is_builtin(),
            parameters: tool.parameters_schema(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// ToolContext
// ═══════════════════════════════════════════════════════════════════════

/// What a tool can reach while executing. Created per invocation.
pub struct ToolContext {
    services: Arc<Services>,
}

impl ToolContext {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Parameter extraction
// ═══════════════════════════════════════════════════════════════════════

fn as_object(params: &Value) -> Result<&Map<String, Value>, RetrievalError> {
    params
        .as_object()
        .ok_or_else(|| RetrievalError::invalid("params", "must be a JSON object"))
}

fn required_str<'a>(
    params: &'a Map<String, Value>,
    name: &'static str,
) -> Result<&'a str, RetrievalError> {
    match params.get(name) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(RetrievalError::invalid(name, "must be a string")),
        None => Err(RetrievalError::invalid(name, "is required")),
    }
}

fn optional<'a>(params: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    params.get(name).filter(|v| !v.is_null())
}

fn optional_i64(params: &Map<String, Value>, name: &'static str) -> Result<Option<i64>, RetrievalError> {
    optional(params, name)
        .map(|v| {
            v.as_i64()
                .ok_or_else(|| RetrievalError::invalid(name, "must be an integer"))
        })
        .transpose()
}

fn optional_usize(
    params: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<usize>, RetrievalError> {
    optional(params, name)
        .map(|v| {
            v.as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| RetrievalError::invalid(name, "must be a non-negative integer"))
        })
        .transpose()
}

fn optional_f64(params: &Map<String, Value>, name: &'static str) -> Result<Option<f64>, RetrievalError> {
    optional(params, name)
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| RetrievalError::invalid(name, "must be a number"))
        })
        .transpose()
}

fn optional_bool(params: &Map<String, Value>, name: &'static str) -> Result<Option<bool>, RetrievalError> {
    optional(params, name)
        .map(|v| {
            v.as_bool()
                .ok_or_else(|| RetrievalError::invalid(name, "must be a boolean"))
        })
        .transpose()
}

fn optional_strings(
    params: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<Vec<String>>, RetrievalError> {
    let Some(value) = optional(params, name) else {
        return Ok(None);
    };
    let items = value
        .as_array()
        .ok_or_else(|| RetrievalError::invalid(name, "must be an array of strings"))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| RetrievalError::invalid(name, "must be an array of strings"))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in Tool Implementations
// ═══════════════════════════════════════════════════════════════════════

/// Embedding-similarity search over chunks.
pub struct SemanticSearchTool;

#[async_trait]
impl Tool for SemanticSearchTool {
    fn name(&self) -> &str {
        "semantic_search"
    }

    fn description(&self) -> &str {
        "Find chunks semantically similar to a natural-language query"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Natural-language query" },
                "top_k": { "type": "integer", "description": "Maximum results", "default": 10 },
                "min_score": { "type": "number", "description": "Score floor in [0, 1]", "default": 0.0 },
                "file_types": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Restrict to these file extensions (e.g. [\"rs\", \"md\"])"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let params = as_object(&params)?;
        let services = ctx.services();
        let mut request = services.semantic_params(required_str(params, "query")?);
        if let Some(top_k) = optional_i64(params, "top_k")? {
            request.top_k = top_k;
        }
        if let Some(min_score) = optional_f64(params, "min_score")? {
            request.min_score = min_score;
        }
        if let Some(file_types) = optional_strings(params, "file_types")? {
            request.file_types = file_types;
        }
        let response = services.semantic(&request).await?;
        Ok(serde_json::to_value(&response)?)
    }
}

/// Term search with boosted fields and highlighting.
pub struct LexicalSearchTool;

#[async_trait]
impl Tool for LexicalSearchTool {
    fn name(&self) -> &str {
        "lexical_search"
    }

    fn description(&self) -> &str {
        "Keyword search over chunk content and file names"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Space-delimited search terms" },
                "fields": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Fields to search, optionally boosted (\"content^2\")",
                    "default": ["content^2", "file_name"]
                },
                "operator": { "type": "string", "enum": ["AND", "OR"], "default": "OR" },
                "top_k": { "type": "integer", "description": "Maximum results", "default": 10 },
                "fuzzy": { "type": "boolean", "description": "Tolerate small typos", "default": false }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let params = as_object(&params)?;
        let services = ctx.services();
        let mut request = services.lexical_params(required_str(params, "query")?);
        if let Some(fields) = optional_strings(params, "fields")? {
            request.fields = fields;
        }
        if let Some(operator) = optional(params, "operator") {
            let operator = operator
                .as_str()
                .ok_or_else(|| RetrievalError::invalid("operator", "must be a string"))?;
            request.operator = operator.parse::<Operator>()?;
        }
        if let Some(top_k) = optional_i64(params, "top_k")? {
            request.top_k = top_k;
        }
        if let Some(fuzzy) = optional_bool(params, "fuzzy")? {
            request.fuzzy = fuzzy;
        }
        let response = services.lexical(&request).await?;
        Ok(serde_json::to_value(&response)?)
    }
}

/// Line-level regular-expression search.
pub struct RegexSearchTool;

#[async_trait]
impl Tool for RegexSearchTool {
    fn name(&self) -> &str {
        "regex_search"
    }

    fn description(&self) -> &str {
        "Find lines matching a regular expression, with surrounding context"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Rust regex syntax, matched per line. The index prefilter uses a Lucene translation where \\d, \\w and \\s are ASCII-only and anchors are ignored."
                },
                "file_types": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Restrict to these file extensions"
                },
                "case_sensitive": { "type": "boolean", "default": true },
                "max_matches_per_file": { "type": "integer", "minimum": 1, "maximum": 1000, "default": 10 },
                "context_lines": { "type": "integer", "minimum": 0, "maximum": 20, "default": 2 }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let params = as_object(&params)?;
        let services = ctx.services();
        let mut request = services.regex_params(required_str(params, "pattern")?);
        if let Some(file_types) = optional_strings(params, "file_types")? {
            request.file_types = file_types;
        }
        if let Some(case_sensitive) = optional_bool(params, "case_sensitive")? {
            request.case_sensitive = case_sensitive;
        }
        if let Some(max) = optional_usize(params, "max_matches_per_file")? {
            request.max_matches_per_file = max;
        }
        if let Some(lines) = optional_usize(params, "context_lines")? {
            request.context_lines = lines;
        }
        let response = services.regex(&request).await?;
        Ok(serde_json::to_value(&response)?)
    }
}

/// Full-file reconstruction.
pub struct GetContentTool;

#[async_trait]
impl Tool for GetContentTool {
    fn name(&self) -> &str {
        "get_content"
    }

    fn description(&self) -> &str {
        "Retrieve the full reconstructed text of a file"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_name": { "type": "string", "description": "Exact file name as indexed" },
                "include_metadata": { "type": "boolean", "default": false }
            },
            "required": ["file_name"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let params = as_object(&params)?;
        let mut request = ContentParams::new(required_str(params, "file_name")?);
        if let Some(include) = optional_bool(params, "include_metadata")? {
            request.include_metadata = include;
        }
        let response = ctx.services().content(&request).await?;
        Ok(serde_json::to_value(&response)?)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Registry of callable tools.
///
/// ```rust
/// use chunkseek::tools::ToolRegistry;
///
/// let tools = ToolRegistry::with_builtins();
/// assert_eq!(tools.len(), 4);
/// // tools.register(Box::new(MyTool));
/// ```
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry holding the four retrieval tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SemanticSearchTool));
        registry.register(Box::new(LexicalSearchTool));
        registry.register(Box::new(RegexSearchTool));
        registry.register(Box::new(GetContentTool));
        registry
    }

    /// Register a tool. A later tool with the same name shadows an earlier one.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .rev()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
