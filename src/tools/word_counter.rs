use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::Tool;

/// Counts whitespace-separated words.
pub struct WordCounterTool;

#[derive(Deserialize)]
struct WordCounterInput {
    text: String,
}

impl WordCounterTool {
    pub const NAME: &'static str = "Word Counter Tool";

    pub fn count(text: &str) -> usize {
        unwrap_double_encoded(text)
            .as_deref()
            .unwrap_or(text)
            .split_whitespace()
            .count()
    }
}

/// Models sometimes pass `{"text": "..."}` as the text itself.
fn unwrap_double_encoded(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if !(trimmed.starts_with(r#"{"text": ""#) && trimmed.ends_with("\"}")) {
        return None;
    }
    serde_json::from_str::<WordCounterInput>(trimmed)
        .ok()
        .map(|input| input.text)
}

#[async_trait]
impl Tool for WordCounterTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Counts the number of words in a given text. Pass the raw text directly, not as JSON."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The text to count words in."
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: Value) -> anyhow::Result<String> {
        let text = match arguments {
            Value::String(raw) => raw,
            other => {
                serde_json::from_value::<WordCounterInput>(other)
                    .context("Word Counter Tool expects a 'text' argument")?
                    .text
            }
        };
        Ok(Self::count(&text).to_string())
    }
}
