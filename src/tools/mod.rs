//! Tools agents can call while working on a task.

mod word_counter;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;

use crate::llm_client::{ToolCall, ToolSchema};

pub use word_counter::WordCounterTool;

pub type SharedTool = Arc<dyn Tool>;

const MAX_FUNCTION_NAME_LEN: usize = 64;

/// Function name accepted by the providers: `[a-zA-Z0-9_-]`, 1 to 64 characters.
pub fn safe_function_name(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            name.push(c);
        } else if !name.ends_with('_') {
            name.push('_');
        }
    }

    let name: String = name
        .trim_matches('_')
        .chars()
        .take(MAX_FUNCTION_NAME_LEN)
        .collect();
    if name.is_empty() {
        "function".to_string()
    } else {
        name
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    /// Human-readable label, e.g. "Word Counter Tool".
    fn name(&self) -> &str;

    /// Name sent to the model and used for dispatch.
    fn function_name(&self) -> String {
        safe_function_name(&self.name().to_lowercase())
    }

    fn description(&self) -> &str;

    /// JSON Schema describing the arguments object.
    fn parameters_schema(&self) -> serde_json::Value;

    async fn execute(&self, arguments: serde_json::Value) -> anyhow::Result<String>;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.function_name(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Name-indexed set of tools handed to one agent.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, SharedTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, tool: SharedTool) -> Self {
        self.tools.insert(tool.function_name(), tool);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|tool| tool.schema()).collect()
    }

    pub async fn execute(&self, call: &ToolCall) -> anyhow::Result<String> {
        let tool = self
            .tools
            .get(&call.name)
            .with_context(|| format!("Unknown tool '{}'", call.name))?;
        // Some models send the bare text instead of an arguments object.
        let arguments = call
            .arguments_json()
            .unwrap_or_else(|_| serde_json::Value::String(call.arguments.clone()));
        tool.execute(arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    #[tokio::test]
    async fn registry_dispatches_by_name() {
        let registry = ToolRegistry::new().with_tool(Arc::new(WordCounterTool));
        let output = registry
            .execute(&call("word_counter_tool", r#"{"text":"one two three"}"#))
            .await
            .expect("word count");
        assert_eq!(output, "3");
    }

    #[tokio::test]
    async fn registry_rejects_unknown_tools() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute(&call("missing", "{}"))
            .await
            .expect_err("unknown tool");
        assert!(err.to_string().contains("Unknown tool 'missing'"));
    }

    #[tokio::test]
    async fn non_json_arguments_are_passed_as_text() {
        let registry = ToolRegistry::new().with_tool(Arc::new(WordCounterTool));
        let output = registry
            .execute(&call("word_counter_tool", "just four plain words"))
            .await
            .expect("word count");
        assert_eq!(output, "4");
    }

    #[test]
    fn schema_names_are_accepted_by_providers() {
        let pattern = regex::Regex::new(r"^[a-zA-Z0-9_-]{1,64}$").expect("pattern");
        let registry = ToolRegistry::new().with_tool(Arc::new(WordCounterTool));
        for schema in registry.schemas() {
            assert!(pattern.is_match(&schema.name), "rejected name {:?}", schema.name);
        }
        assert_eq!(registry.schemas()[0].name, "word_counter_tool");
    }

    #[test]
    fn function_names_are_sanitized() {
        assert_eq!(safe_function_name("Word Counter Tool"), "Word_Counter_Tool");
        assert_eq!(safe_function_name("  Pitch Crew!  "), "Pitch_Crew");
        assert_eq!(safe_function_name("TwinCrew"), "TwinCrew");
        assert_eq!(safe_function_name("a--b__c"), "a--b__c");
        assert_eq!(safe_function_name("???"), "function");
        assert_eq!(safe_function_name(&"x".repeat(100)).len(), 64);
    }

    #[tokio::test]
    async fn display_label_is_not_a_dispatch_name() {
        let registry = ToolRegistry::new().with_tool(Arc::new(WordCounterTool));
        assert!(registry
            .execute(&call("Word Counter Tool", r#"{"text":"a b"}"#))
            .await
            .is_err());
    }

    #[test]
    fn schemas_expose_every_tool() {
        let registry = ToolRegistry::new().with_tool(Arc::new(WordCounterTool));
        let schemas = registry.schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].parameters["required"][0], "text");
    }
}
