use anyhow::Context;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolType,
    CreateChatCompletionRequestArgs, FunctionCall, FunctionObjectArgs,
};
use async_openai::{config::OpenAIConfig, Client as AsyncOpenAiClient};
use async_trait::async_trait;
use tracing::instrument;

use super::{ChatMessage, LlmClient, LlmReply, Role, ToolCall, ToolSchema};

/// OpenAI-compatible client that can point at OpenAI, vLLM, or any HTTP-compatible backend.
pub struct OpenAiLlmClient {
    client: AsyncOpenAiClient<OpenAIConfig>,
    model: String,
}

impl OpenAiLlmClient {
    const TEMPERATURE: f32 = 0.2;

    pub fn new(api_key: String, base_url: Option<String>, model: impl Into<String>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = base_url {
            config = config.with_api_base(base_url);
        }

        Self {
            client: AsyncOpenAiClient::with_config(config),
            model: model.into(),
        }
    }

    fn to_request_message(message: &ChatMessage) -> anyhow::Result<ChatCompletionRequestMessage> {
        let converted = match message.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(message.content.clone())
                .build()?
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(message.content.clone())
                .build()?
                .into(),
            Role::Assistant => {
                let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                if !message.content.is_empty() {
                    builder.content(message.content.clone());
                }
                if !message.tool_calls.is_empty() {
                    builder.tool_calls(
                        message
                            .tool_calls
                            .iter()
                            .map(|call| ChatCompletionMessageToolCall {
                                id: call.id.clone(),
                                r#type: ChatCompletionToolType::Function,
                                function: FunctionCall {
                                    name: call.name.clone(),
                                    arguments: call.arguments.clone(),
                                },
                            })
                            .collect::<Vec<_>>(),
                    );
                }
                builder.build()?.into()
            }
            Role::Tool => ChatCompletionRequestToolMessageArgs::default()
                .content(message.content.clone())
                .tool_call_id(message.tool_call_id.clone().unwrap_or_default())
                .build()?
                .into(),
        };
        Ok(converted)
    }

    fn to_request_tool(tool: &ToolSchema) -> anyhow::Result<ChatCompletionTool> {
        let function = FunctionObjectArgs::default()
            .name(tool.name.clone())
            .description(tool.description.clone())
            .parameters(tool.parameters.clone())
            .build()?;

        Ok(ChatCompletionToolArgs::default()
            .r#type(ChatCompletionToolType::Function)
            .function(function)
            .build()?)
    }
}

#[async_trait]
impl LlmClient for OpenAiLlmClient {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(level = "debug", skip_all, fields(model = %self.model, tools = tools.len()))]
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> anyhow::Result<LlmReply> {
        let request_messages = messages
            .iter()
            .map(Self::to_request_message)
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.model)
            .temperature(Self::TEMPERATURE)
            .messages(request_messages);
        if !tools.is_empty() {
            builder.tools(
                tools
                    .iter()
                    .map(Self::to_request_tool)
                    .collect::<anyhow::Result<Vec<_>>>()?,
            );
        }
        let request = builder.build()?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .context("OpenAI chat completion failed")?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .context("LLM response did not contain any choices")?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        Ok(LlmReply {
            content: choice.message.content,
            tool_calls,
        })
    }
}
