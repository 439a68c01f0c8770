mod anthropic;
mod openai;

use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Settings;

pub use anthropic::AnthropicLlmClient;
pub use openai::OpenAiLlmClient;

pub type SharedLlmClient = Arc<dyn LlmClient>;

/// Model used for chat when neither the manager agent nor the crew names one.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON text as produced by the model.
    pub arguments: String,
}

impl ToolCall {
    /// Decode the arguments into a JSON object; empty text counts as `{}`.
    pub fn arguments_json(&self) -> anyhow::Result<serde_json::Value> {
        if self.arguments.trim().is_empty() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&self.arguments)
            .with_context(|| format!("Tool call '{}' carried invalid JSON arguments", self.name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// A function the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LlmReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl LlmReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model(&self) -> &str;

    async fn chat(&self, messages: &[ChatMessage], tools: &[ToolSchema])
        -> anyhow::Result<LlmReply>;

    /// Plain completion without tools; the reply must carry text.
    async fn call(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        let reply = self.chat(messages, &[]).await?;
        reply
            .content
            .filter(|text| !text.trim().is_empty())
            .context("LLM response did not contain any text")
    }
}

/// Offline stand-in that echoes the latest user message.
#[derive(Debug, Default, Clone)]
pub struct EchoLlmClient;

#[async_trait]
impl LlmClient for EchoLlmClient {
    fn model(&self) -> &str {
        "echo"
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolSchema],
    ) -> anyhow::Result<LlmReply> {
        let last_user = messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.as_str())
            .unwrap_or("(no user message yet)");
        Ok(LlmReply::text(format!(
            "[echo response]\nI received: {last_user}"
        )))
    }
}

impl EchoLlmClient {
    pub fn shared() -> SharedLlmClient {
        Arc::new(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Anthropic,
    OpenAi,
    Echo,
}

fn resolve_backend(model: &str) -> (Backend, &str) {
    if model.eq_ignore_ascii_case("echo") {
        return (Backend::Echo, model);
    }
    if let Some(stripped) = model.strip_prefix("anthropic/") {
        return (Backend::Anthropic, stripped);
    }
    if model.starts_with("claude") {
        return (Backend::Anthropic, model);
    }
    if let Some(stripped) = model.strip_prefix("openai/") {
        return (Backend::OpenAi, stripped);
    }
    (Backend::OpenAi, model)
}

/// Build a client for a model identifier such as `gpt-4o` or `claude-3-haiku-20240307`.
pub fn create_llm(model: &str, settings: &Settings) -> anyhow::Result<SharedLlmClient> {
    let model = model.trim();
    if model.is_empty() {
        bail!("An empty model name cannot be used to build an LLM client");
    }

    let (backend, model_name) = resolve_backend(model);
    tracing::debug!(model = model_name, ?backend, "Building LLM client");

    match backend {
        Backend::Echo => Ok(EchoLlmClient::shared()),
        Backend::Anthropic => {
            let api_key = settings
                .anthropic_api_key
                .clone()
                .context("Set ANTHROPIC_API_KEY to use an Anthropic model")?;
            Ok(Arc::new(AnthropicLlmClient::new(api_key, model_name)?))
        }
        Backend::OpenAi => {
            let api_key = settings
                .openai_api_key
                .clone()
                .context("Set OPENAI_API_KEY to use an OpenAI model")?;
            Ok(Arc::new(OpenAiLlmClient::new(
                api_key,
                settings.openai_base_url.clone(),
                model_name,
            )))
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use anyhow::anyhow;

    use super::*;

    /// One recorded invocation of [`ScriptedLlmClient::chat`].
    #[derive(Debug, Clone)]
    pub struct RecordedCall {
        pub messages: Vec<ChatMessage>,
        pub tools: Vec<ToolSchema>,
    }

    /// Replays queued replies in order and records every request it sees.
    #[derive(Default)]
    pub struct ScriptedLlmClient {
        replies: Mutex<VecDeque<anyhow::Result<LlmReply>>>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl ScriptedLlmClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_text(self, text: &str) -> Self {
            self.push(Ok(LlmReply::text(text)));
            self
        }

        pub fn with_tool_call(self, name: &str, arguments: serde_json::Value) -> Self {
            let call_index = self.replies.lock().expect("lock poisoned").len();
            self.push(Ok(LlmReply {
                content: None,
                tool_calls: vec![ToolCall {
                    id: format!("call_{call_index}"),
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                }],
            }));
            self
        }

        pub fn with_error(self, message: &str) -> Self {
            self.push(Err(anyhow!(message.to_string())));
            self
        }

        fn push(&self, reply: anyhow::Result<LlmReply>) {
            self.replies
                .lock()
                .expect("lock poisoned")
                .push_back(reply);
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().expect("lock poisoned").clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlmClient {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn chat(
            &self,
            messages: &[ChatMessage],
            tools: &[ToolSchema],
        ) -> anyhow::Result<LlmReply> {
            self.calls
                .lock()
                .expect("lock poisoned")
                .push(RecordedCall {
                    messages: messages.to_vec(),
                    tools: tools.to_vec(),
                });
            self.replies
                .lock()
                .expect("lock poisoned")
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("scripted client ran out of replies")))
        }
    }
}
