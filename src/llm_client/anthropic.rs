use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use super::{ChatMessage, LlmClient, LlmReply, Role, ToolCall, ToolSchema};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const OPENING_TURN: &str = "Please begin.";

/// Client for Anthropic's native Messages API.
pub struct AnthropicLlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicLlmClient {
    const TEMPERATURE: f32 = 0.2;

    pub fn new(api_key: String, model: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("Failed to build HTTP client for Anthropic")?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            model: model.into(),
        })
    }

    #[allow(dead_code)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_body(&self, messages: &[ChatMessage], tools: &[ToolSchema]) -> MessagesRequest {
        let (system, rest) = split_system(messages);
        MessagesRequest {
            model: self.model.clone(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: Self::TEMPERATURE,
            system,
            messages: to_api_messages(&rest),
            tools: tools
                .iter()
                .map(|tool| ApiTool {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    input_schema: tool.parameters.clone(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicLlmClient {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(level = "debug", skip_all, fields(model = %self.model, tools = tools.len()))]
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> anyhow::Result<LlmReply> {
        let body = self.build_body(messages, tools);
        let url = format!("{}/v1/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(%status, body = %error_body, "Anthropic API error");
            bail!("Anthropic API returned {status}: {error_body}");
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .context("Failed to parse Anthropic response")?;
        Ok(parsed.into_reply())
    }
}

/// System messages become the top-level `system` field, joined in order.
fn split_system(messages: &[ChatMessage]) -> (Option<String>, Vec<&ChatMessage>) {
    let mut system_parts = Vec::new();
    let mut rest = Vec::new();
    for message in messages {
        match message.role {
            Role::System => system_parts.push(message.content.as_str()),
            _ => rest.push(message),
        }
    }

    let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));
    (system, rest)
}

fn to_api_messages(messages: &[&ChatMessage]) -> Vec<ApiMessage> {
    let mut result: Vec<ApiMessage> = Vec::new();

    for message in messages {
        match message.role {
            Role::User => result.push(ApiMessage {
                role: "user",
                content: vec![ContentBlock::Text {
                    text: message.content.clone(),
                }],
            }),
            Role::Assistant => {
                let mut blocks = Vec::new();
                if !message.content.is_empty() {
                    blocks.push(ContentBlock::Text {
                        text: message.content.clone(),
                    });
                }
                for call in &message.tool_calls {
                    blocks.push(ContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.arguments_json().unwrap_or_default(),
                    });
                }
                result.push(ApiMessage {
                    role: "assistant",
                    content: blocks,
                });
            }
            Role::Tool => {
                let block = ContentBlock::ToolResult {
                    tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
                    content: message.content.clone(),
                };
                // Consecutive tool results share one user turn.
                match result.last_mut() {
                    Some(last)
                        if last.role == "user"
                            && last
                                .content
                                .iter()
                                .all(|b| matches!(b, ContentBlock::ToolResult { .. })) =>
                    {
                        last.content.push(block)
                    }
                    _ => result.push(ApiMessage {
                        role: "user",
                        content: vec![block],
                    }),
                }
            }
            Role::System => {}
        }
    }

    // The Messages API needs at least one turn and the first must be the user's.
    if result.first().map_or(true, |first| first.role != "user") {
        result.insert(
            0,
            ApiMessage {
                role: "user",
                content: vec![ContentBlock::Text {
                    text: OPENING_TURN.to_string(),
                }],
            },
        );
    }

    result
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

impl MessagesResponse {
    fn into_reply(self) -> LlmReply {
        let mut texts = Vec::new();
        let mut tool_calls = Vec::new();

        for block in self.content {
            match block {
                ContentBlock::Text { text } => texts.push(text),
                ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: input.to_string(),
                }),
                ContentBlock::ToolResult { .. } | ContentBlock::Unknown => {}
            }
        }

        LlmReply {
            content: (!texts.is_empty()).then(|| texts.join("")),
            tool_calls,
        }
    }
}
