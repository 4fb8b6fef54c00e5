//! Tool System
//!
//! Descriptors, invocations and results shared by every tool provider.
//! In-process tools implement [`Tool`]; whole providers implement
//! [`ToolSession`](crate::registry::ToolSession).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::Result;

/// Tool call request emitted by the LLM
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Tool identifier
    #[serde(alias = "tool")]
    pub name: String,

    /// Arguments, expected to be a JSON object
    #[serde(default = "empty_arguments")]
    pub arguments: Value,
}

fn empty_arguments() -> Value {
    Value::Object(Map::new())
}

/// A routed tool call, created by the agent loop from a [`ToolCallRequest`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Unique invocation ID
    pub id: String,

    /// Tool identifier
    pub name: String,

    /// Arguments as a JSON object
    pub arguments: Value,

    /// Position of the assistant turn that requested this call
    pub origin: usize,
}

impl ToolInvocation {
    pub fn new(request: ToolCallRequest, origin: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: request.name,
            arguments: request.arguments,
            origin,
        }
    }

    /// Look up a string argument
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }

    /// Look up an integer argument
    pub fn i64_arg(&self, key: &str) -> Option<i64> {
        self.arguments.get(key).and_then(Value::as_i64)
    }

    /// Look up a boolean argument
    pub fn bool_arg(&self, key: &str) -> Option<bool> {
        self.arguments.get(key).and_then(Value::as_bool)
    }
}

/// Why an invocation did not succeed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolFailure {
    /// The tool name is not in the catalog
    UnknownTool,
    /// Arguments did not match the descriptor
    InvalidArguments,
    /// The provider (backend, auth, network) failed
    ProviderFailure,
    /// The invocation was abandoned because the turn was cancelled
    Cancelled,
}

impl std::fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownTool => write!(f, "unknown_tool"),
            Self::InvalidArguments => write!(f, "invalid_arguments"),
            Self::ProviderFailure => write!(f, "provider_failure"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Successful output of a tool
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Human-readable text shown to the LLM
    pub text: String,

    /// Structured data (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Result of exactly one invocation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Invocation this result answers
    pub invocation_id: String,

    /// Tool that was called
    pub name: String,

    /// `None` on success
    pub failure: Option<ToolFailure>,

    /// Output (success payload or error detail)
    pub output: String,

    /// Structured data (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn success(invocation: &ToolInvocation, output: ToolOutput) -> Self {
        Self {
            invocation_id: invocation.id.clone(),
            name: invocation.name.clone(),
            failure: None,
            output: output.text,
            data: output.data,
        }
    }

    pub fn failure(
        invocation: &ToolInvocation,
        failure: ToolFailure,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            invocation_id: invocation.id.clone(),
            name: invocation.name.clone(),
            failure: Some(failure),
            output: detail.into(),
            data: None,
        }
    }

    pub const fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, integer, number, boolean, object, array, any)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParameterSchema {
    pub fn required(name: &str, param_type: &str, description: &str) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: true,
            enum_values: None,
        }
    }

    pub fn optional(name: &str, param_type: &str, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self.param_type.as_str() {
            "string" => value.is_string(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "object" => value.is_object(),
            "array" => value.is_array(),
            _ => true,
        }
    }
}

/// Tool definition (for LLM function calling)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,
}

impl ToolDescriptor {
    /// Validate call arguments against the parameter list
    pub fn validate(&self, arguments: &Value) -> std::result::Result<(), String> {
        let Some(args) = arguments.as_object() else {
            return Err(format!("arguments must be a JSON object, got {arguments}"));
        };

        for param in &self.parameters {
            match args.get(&param.name) {
                None if param.required => {
                    return Err(format!("Missing required parameter: {}", param.name));
                }
                None => {}
                Some(Value::Null) if !param.required => {}
                Some(value) => {
                    if !param.accepts(value) {
                        return Err(format!(
                            "Parameter '{}' must be of type {}, got {value}",
                            param.name, param.param_type
                        ));
                    }
                    if let Some(allowed) = &param.enum_values {
                        if !allowed.contains(value) {
                            return Err(format!(
                                "Parameter '{}' must be one of {}",
                                param.name,
                                Value::Array(allowed.clone())
                            ));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Build a descriptor from a JSON Schema object (`inputSchema` on the wire)
    pub fn from_json_schema(name: &str, description: &str, schema: &Value) -> Self {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let parameters = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(key, prop)| ParameterSchema {
                        name: key.clone(),
                        param_type: json_type_of(prop),
                        description: prop
                            .get("description")
                            .or_else(|| prop.get("title"))
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        required: required.contains(&key.as_str()),
                        enum_values: prop.get("enum").and_then(Value::as_array).cloned(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Render the parameter list as a JSON Schema object
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.parameters {
            let mut prop = Map::new();
            if param.param_type != "any" {
                prop.insert("type".into(), json!(param.param_type));
            }
            prop.insert("description".into(), json!(param.description));
            if let Some(values) = &param.enum_values {
                prop.insert("enum".into(), Value::Array(values.clone()));
            }
            properties.insert(param.name.clone(), Value::Object(prop));
        }

        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Resolve the JSON type of a property, unwrapping `anyOf: [{type: T}, {type: null}]`
fn json_type_of(prop: &Value) -> String {
    if let Some(t) = prop.get("type").and_then(Value::as_str) {
        return t.to_string();
    }
    prop.get("anyOf")
        .and_then(Value::as_array)
        .and_then(|variants| {
            variants
                .iter()
                .filter_map(|v| v.get("type").and_then(Value::as_str))
                .find(|t| *t != "null")
        })
        .unwrap_or("any")
        .to_string()
}

/// Generate system prompt section describing available tools
pub fn render_catalog(catalog: &[ToolDescriptor]) -> String {
    let mut prompt = String::from("## Available Tools\n\n");
    prompt.push_str("You can use the following tools by responding with a JSON block:\n\n");
    prompt.push_str(
        "```tool\n{\"tool\": \"tool_name\", \"arguments\": {\"arg\": \"value\"}}\n```\n\n",
    );

    for descriptor in catalog {
        prompt.push_str(&format!("### {}\n", descriptor.name));
        prompt.push_str(&format!("{}\n", descriptor.description));

        if !descriptor.parameters.is_empty() {
            prompt.push_str("**Parameters:**\n");
            for param in &descriptor.parameters {
                let required = if param.required { " (required)" } else { "" };
                prompt.push_str(&format!(
                    "- `{}` ({}){}: {}\n",
                    param.name, param.param_type, required, param.description
                ));
            }
        }
        prompt.push('\n');
    }

    prompt
}

/// Tool trait - implement to add an in-process capability
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's descriptor for LLM function calling
    fn descriptor(&self) -> ToolDescriptor;

    /// Execute the tool. Arguments have already been validated.
    ///
    /// Return `Err(AgentError::ToolProvider(..))` for backend failures.
    async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_task_descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: "add_task_for_user".into(),
            description: "Create a task".into(),
            parameters: vec![
                ParameterSchema::required("title", "string", "Task title"),
                ParameterSchema::optional("due_date", "string", "Due date"),
                ParameterSchema {
                    enum_values: Some(vec![json!("low"), json!("high")]),
                    ..ParameterSchema::optional("priority", "string", "Priority")
                },
            ],
        }
    }

    #[test]
    fn test_validate_accepts_minimal_arguments() {
        let descriptor = add_task_descriptor();
        assert!(descriptor.validate(&json!({"title": "Groceries"})).is_ok());
        assert!(
            descriptor
                .validate(&json!({"title": "Groceries", "due_date": null}))
                .is_ok()
        );
    }

    #[test]
    fn test_validate_rejects_bad_arguments() {
        let descriptor = add_task_descriptor();

        let missing = descriptor.validate(&json!({})).unwrap_err();
        assert!(missing.contains("title"));

        let wrong_type = descriptor.validate(&json!({"title": 42})).unwrap_err();
        assert!(wrong_type.contains("string"));

        assert!(
            descriptor
                .validate(&json!({"title": "x", "priority": "urgent"}))
                .is_err()
        );
        assert!(descriptor.validate(&json!(["title"])).is_err());
    }

    #[test]
    fn test_json_schema_conversion_handles_optional_unions() {
        let schema = json!({
            "type": "object",
            "properties": {
                "username": {"type": "string", "title": "Username"},
                "task_id": {"type": "integer"},
                "completed": {"anyOf": [{"type": "boolean"}, {"type": "null"}], "default": null}
            },
            "required": ["username", "task_id"]
        });

        let descriptor = ToolDescriptor::from_json_schema("update", "Update a task", &schema);
        let completed = descriptor
            .parameters
            .iter()
            .find(|p| p.name == "completed")
            .unwrap();
        assert_eq!(completed.param_type, "boolean");
        assert!(!completed.required);

        let task_id = descriptor
            .parameters
            .iter()
            .find(|p| p.name == "task_id")
            .unwrap();
        assert!(task_id.required);

        let back = ToolDescriptor::from_json_schema("update", "Update a task", &descriptor.to_json_schema());
        assert_eq!(back.parameters.len(), 3);
        assert!(descriptor.validate(&json!({"username": "a", "task_id": 3})).is_ok());
    }

    #[test]
    fn test_tool_call_request_accepts_tool_alias() {
        let request: ToolCallRequest =
            serde_json::from_str(r#"{"tool": "get_tasks_for_user"}"#).unwrap();
        assert_eq!(request.name, "get_tasks_for_user");
        assert_eq!(request.arguments, json!({}));
    }

    #[test]
    fn test_render_catalog_lists_parameters() {
        let prompt = render_catalog(&[add_task_descriptor()]);
        assert!(prompt.contains("### add_task_for_user"));
        assert!(prompt.contains("`title` (string) (required)"));
    }
}
