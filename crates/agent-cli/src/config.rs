//! Environment-driven configuration for the chat binary

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use agent_core::{AgentError, GenerationOptions, Result};
use agent_runtime::{McpServerConfig, OllamaConfig};
use serde::Deserialize;

const DEFAULT_MAX_STEPS: usize = 15;
const DEFAULT_TASK_API_URL: &str = "http://localhost:8000/api";

/// Everything the binary needs to start a chat
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub generation: GenerationOptions,
    pub max_steps: usize,
    pub ollama: OllamaConfig,
    pub task_api_url: String,
    pub task_api_timeout: Duration,
    /// Host the task tools in-process
    pub builtin_tools: bool,
    /// Child-process tool providers, keyed by session id
    pub tool_servers: BTreeMap<String, McpServerConfig>,
}

/// `{"mcpServers": {"<id>": {...}}}`
#[derive(Debug, Deserialize)]
struct ToolServersFile {
    #[serde(rename = "mcpServers", default)]
    mcp_servers: BTreeMap<String, McpServerConfig>,
}

impl CliConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut generation = GenerationOptions::default();
        if let Some(model) = get("AGENT_MODEL").filter(|m| !m.trim().is_empty()) {
            generation.model = model;
        }

        let max_steps = parse_number(&get, "AGENT_MAX_STEPS")?.unwrap_or(DEFAULT_MAX_STEPS);
        if max_steps == 0 {
            return Err(AgentError::Config("AGENT_MAX_STEPS must be at least 1".into()));
        }

        let ollama = OllamaConfig::from_lookup(&get)?;

        let tool_servers = match get("AGENT_TOOL_SERVERS") {
            Some(path) if !path.trim().is_empty() => load_tool_servers(Path::new(path.trim()))?,
            _ => BTreeMap::new(),
        };

        Ok(Self {
            generation,
            max_steps,
            ollama,
            task_api_url: get("TASK_API_URL").unwrap_or_else(|| DEFAULT_TASK_API_URL.into()),
            task_api_timeout: Duration::from_secs(30),
            builtin_tools: parse_flag(&get, "AGENT_BUILTIN_TOOLS")?.unwrap_or(true),
            tool_servers,
        })
    }
}

fn parse_number<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    get(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| AgentError::Config(format!("{key} must be a number, got '{raw}'")))
        })
        .transpose()
}

fn parse_flag(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>> {
    get(key)
        .map(|raw| match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(AgentError::Config(format!(
                "{key} must be true or false, got '{raw}'"
            ))),
        })
        .transpose()
}

/// Load child-process tool providers from a JSON file
pub fn load_tool_servers(path: &Path) -> Result<BTreeMap<String, McpServerConfig>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        AgentError::Config(format!("cannot read tool server file {}: {e}", path.display()))
    })?;
    parse_tool_servers(&raw)
}

fn parse_tool_servers(raw: &str) -> Result<BTreeMap<String, McpServerConfig>> {
    let file: ToolServersFile = serde_json::from_str(raw)
        .map_err(|e| AgentError::Config(format!("invalid tool server file: {e}")))?;
    Ok(file.mcp_servers)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<CliConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        CliConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.max_steps, 15);
        assert_eq!(config.generation.model, "llama3.2");
        assert_eq!(config.ollama.port, 11434);
        assert_eq!(config.task_api_url, "http://localhost:8000/api");
        assert!(config.builtin_tools);
        assert!(config.tool_servers.is_empty());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("AGENT_MODEL", "qwen2.5"),
            ("AGENT_MAX_STEPS", "4"),
            ("OLLAMA_PORT", "9999"),
            ("AGENT_BUILTIN_TOOLS", "off"),
        ])
        .unwrap();
        assert_eq!(config.generation.model, "qwen2.5");
        assert_eq!(config.max_steps, 4);
        assert_eq!(config.ollama.port, 9999);
        assert!(!config.builtin_tools);
    }

    #[test]
    fn test_invalid_numbers_are_errors() {
        assert!(matches!(
            config(&[("AGENT_MAX_STEPS", "many")]),
            Err(AgentError::Config(_))
        ));
        assert!(matches!(
            config(&[("AGENT_MAX_STEPS", "0")]),
            Err(AgentError::Config(_))
        ));
        assert!(matches!(
            config(&[("OLLAMA_PORT", "70000")]),
            Err(AgentError::Config(_))
        ));
        assert!(matches!(
            config(&[("AGENT_BUILTIN_TOOLS", "maybe")]),
            Err(AgentError::Config(_))
        ));
    }

    #[test]
    fn test_tool_server_file() {
        let servers = parse_tool_servers(
            r#"{
                "mcpServers": {
                    "todo": {
                        "command": "task-mcp-server",
                        "env": {"TASK_API_URL": "http://tasks.local/api"}
                    },
                    "notes": {"command": "notes-server", "args": ["--stdio"]}
                }
            }"#,
        )
        .unwrap();

        let ids: Vec<&str> = servers.keys().map(String::as_str).collect();
        assert_eq!(ids, ["notes", "todo"]);
        assert_eq!(servers["notes"].args, ["--stdio"]);
        assert_eq!(servers["todo"].env["TASK_API_URL"], "http://tasks.local/api");
        assert!(parse_tool_servers("not json").is_err());
    }
}
