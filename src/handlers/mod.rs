//! Message handlers an agent-network adapter can bind to incoming messages.

mod persona;
mod sarcastic;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

pub use persona::PersonaHandler;
pub use sarcastic::SarcasticHandler;

/// A message addressed to a handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRequest {
    pub input: String,
}

impl MessageRequest {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub output: String,
    pub metadata: Option<serde_json::Value>,
}

impl MessageResponse {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(output: impl Into<String>, metadata: serde_json::Value) -> Self {
        Self {
            output: output.into(),
            metadata: Some(metadata),
        }
    }
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, request: MessageRequest) -> anyhow::Result<MessageResponse>;
}

type HandlerHandle = Arc<dyn MessageHandler>;

/// Handlers by name, as the adapter would register them.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, HandlerHandle>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler<H>(mut self, name: impl Into<String>, handler: H) -> Self
    where
        H: MessageHandler + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    #[instrument(skip(self, request), fields(input_len = request.input.len()))]
    pub async fn dispatch(
        &self,
        name: &str,
        request: MessageRequest,
    ) -> anyhow::Result<MessageResponse> {
        let handler = self.handlers.get(name).with_context(|| {
            let known = self.names().collect::<Vec<_>>().join(", ");
            format!("Unknown handler '{name}' (available: {known})")
        })?;
        handler.handle(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Shout;

    #[async_trait]
    impl MessageHandler for Shout {
        async fn handle(&self, request: MessageRequest) -> anyhow::Result<MessageResponse> {
            Ok(MessageResponse::new(request.input.to_uppercase()))
        }
    }

    #[tokio::test]
    async fn dispatch_routes_by_name() {
        let registry = HandlerRegistry::new().with_handler("shout", Shout);
        let response = registry
            .dispatch("shout", MessageRequest::new("hey"))
            .await
            .expect("dispatch");
        assert_eq!(response.output, "HEY");
        assert!(response.metadata.is_none());
    }

    #[tokio::test]
    async fn unknown_handler_lists_the_known_ones() {
        let registry = HandlerRegistry::new()
            .with_handler("shout", Shout)
            .with_handler("echo", Shout);
        let err = registry
            .dispatch("whisper", MessageRequest::new("hey"))
            .await
            .expect_err("unknown");
        assert_eq!(
            err.to_string(),
            "Unknown handler 'whisper' (available: echo, shout)"
        );
    }
}
