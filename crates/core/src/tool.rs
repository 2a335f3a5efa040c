//! Tool trait — the abstraction over specialist capabilities.
//!
//! Tools let a specialist act outside the LLM: list announcements on the
//! department site, read one announcement, fetch a document, or search the
//! regulation index. The registry validates arguments against each tool's
//! schema, bounds execution with a timeout, and turns every failure into a
//! structured payload so the calling agent can recover.

use crate::error::ToolError;
use crate::message::MessageToolCall;
use crate::provider::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// The department site a turn is about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteContext {
    /// Base URL of the department site (no trailing slash)
    pub url: String,
    pub school: String,
    pub department: String,
}

/// Per-turn state handed to every tool invocation.
///
/// `scratch` is merged into the session when the turn commits.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub site: SiteContext,
    pub course_id: Option<String>,
    pub scratch: Map<String, Value>,
}

impl ToolContext {
    pub fn new(site: SiteContext) -> Self {
        Self {
            site,
            course_id: None,
            scratch: Map::new(),
        }
    }

    pub fn with_course_id(mut self, course_id: impl Into<String>) -> Self {
        self.course_id = Some(course_id.into());
        self
    }
}

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl TryFrom<&MessageToolCall> for ToolCall {
    type Error = ToolError;

    fn try_from(call: &MessageToolCall) -> std::result::Result<Self, Self::Error> {
        let arguments = if call.arguments.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_str(&call.arguments).map_err(|e| {
                ToolError::InvalidArguments(format!("{}: arguments are not JSON: {e}", call.name))
            })?
        };
        Ok(Self {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments,
        })
    }
}

/// The result of a tool execution, ready to be fed back to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,
    pub name: String,
    pub success: bool,

    /// JSON text for structured results, raw text otherwise
    pub output: String,
}

impl ToolResult {
    fn from_value(call: &ToolCall, value: Value) -> Self {
        let output = match value {
            Value::String(text) => text,
            other => other.to_string(),
        };
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            success: true,
            output,
        }
    }

    fn from_error(call: &ToolCall, error: &ToolError) -> Self {
        let payload = serde_json::json!({
            "error": error.to_string(),
            "tool": call.name,
        });
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            success: false,
            output: payload.to_string(),
        }
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "list_announcements").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool. Arguments have already been validated against
    /// `parameters_schema()`.
    async fn execute(
        &self,
        arguments: Value,
        ctx: &mut ToolContext,
    ) -> std::result::Result<Value, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Check `arguments` against the subset of JSON Schema tools declare:
/// an object with `required` keys, primitive `type`s and string `enum`s.
pub fn validate_arguments(schema: &Value, arguments: &Value) -> std::result::Result<(), ToolError> {
    let Some(args) = arguments.as_object() else {
        return Err(ToolError::InvalidArguments(
            "arguments must be a JSON object".into(),
        ));
    };

    if let Some(required) = schema["required"].as_array() {
        for key in required.iter().filter_map(Value::as_str) {
            if args.get(key).is_none_or(Value::is_null) {
                return Err(ToolError::InvalidArguments(format!(
                    "missing required argument '{key}'"
                )));
            }
        }
    }

    let Some(properties) = schema["properties"].as_object() else {
        return Ok(());
    };

    for (key, value) in args {
        let Some(prop) = properties.get(key) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        if let Some(expected) = prop["type"].as_str()
            && !matches_type(expected, value)
        {
            return Err(ToolError::InvalidArguments(format!(
                "argument '{key}' must be of type {expected}"
            )));
        }
        if let Some(allowed) = prop["enum"].as_array()
            && !allowed.contains(value)
        {
            return Err(ToolError::InvalidArguments(format!(
                "argument '{key}' must be one of {}",
                Value::Array(allowed.clone())
            )));
        }
    }

    Ok(())
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

/// A registry of available tools.
///
/// The agent loop uses this to:
/// 1. Get tool definitions to send to the LLM
/// 2. Look up and execute tools when the LLM requests them
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Set the per-call execution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Tool definitions for the given names, in the order requested.
    /// Unknown names are skipped.
    pub fn definitions_for(&self, names: &[&str]) -> Vec<ToolDefinition> {
        names
            .iter()
            .filter_map(|n| self.tools.get(*n))
            .map(|t| t.to_definition())
            .collect()
    }

    /// Execute a tool call. Never fails: unknown tools, invalid arguments,
    /// execution errors and timeouts all come back as an unsuccessful
    /// result carrying a JSON `{"error", "tool"}` payload.
    pub async fn execute(&self, call: &ToolCall, ctx: &mut ToolContext) -> ToolResult {
        match self.try_execute(call, ctx).await {
            Ok(value) => {
                debug!(tool = %call.name, call_id = %call.id, "Tool succeeded");
                ToolResult::from_value(call, value)
            }
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool failed");
                ToolResult::from_error(call, &e)
            }
        }
    }

    async fn try_execute(
        &self,
        call: &ToolCall,
        ctx: &mut ToolContext,
    ) -> std::result::Result<Value, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        validate_arguments(&tool.parameters_schema(), &call.arguments)?;

        match tokio::time::timeout(self.timeout, tool.execute(call.arguments.clone(), ctx)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                tool_name: call.name.clone(),
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
