use anyhow::anyhow;
use async_trait::async_trait;
use tracing::instrument;

use super::{MessageHandler, MessageRequest, MessageResponse};
use crate::crew::{Agent, AgentConfig, Crew, CrewInputs, CrewRunner, Task, TaskConfig};

const MESSAGE_INPUT: &str = "message";

/// Rewrites a message as a witty, sarcastic version of itself.
pub struct SarcasticHandler {
    agent: Agent,
    runner: CrewRunner,
}

impl SarcasticHandler {
    pub const NAME: &'static str = "SarcasticCrew";

    pub fn new(model: impl Into<String>, runner: CrewRunner) -> Self {
        let agent = Agent::new(
            "sarcastic_transformer",
            AgentConfig {
                name: None,
                role: "Sarcastic Message Transformer".into(),
                goal: "Transform messages into witty, sarcastic responses while maintaining the core meaning".into(),
                backstory: "You are a master of sarcasm and wit. You excel at taking ordinary messages \
                    and transforming them into clever, sarcastic versions that are humorous but not mean-spirited. \
                    You use techniques like irony, exaggeration, and dry humor to make messages more entertaining."
                    .into(),
                llm: Some(model.into()),
                allow_delegation: false,
                verbose: true,
            },
        );
        Self { agent, runner }
    }

    fn crew(&self) -> Crew {
        let task = Task::new(
            "sarcastic_transformation",
            TaskConfig {
                description: format!(
                    "Transform the following message into a sarcastic, witty version.\n\
                     Use sarcasm, irony, and dry humor while keeping the core meaning intact.\n\
                     Make it entertaining but not offensive or mean-spirited.\n\n\
                     Original message: {{{MESSAGE_INPUT}}}\n\n\
                     Provide only the sarcastic transformation, no explanations."
                ),
                expected_output: "A sarcastic, witty version of the original message".into(),
                agent: Some(self.agent.key.clone()),
            },
        );
        Crew::new(Self::NAME, vec![self.agent.clone()], vec![task])
    }
}

#[async_trait]
impl MessageHandler for SarcasticHandler {
    #[instrument(skip_all)]
    async fn handle(&self, request: MessageRequest) -> anyhow::Result<MessageResponse> {
        let inputs: CrewInputs = [(MESSAGE_INPUT.to_string(), request.input)]
            .into_iter()
            .collect();

        let output = self
            .runner
            .kickoff(&self.crew(), &inputs)
            .await
            .map_err(|err| anyhow!("Failed to process sarcastic transformation: {err:#}"))?;
        Ok(MessageResponse::new(output.raw.trim()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::llm_client::testing::ScriptedLlmClient;

    const MODEL: &str = "claude-3-haiku-20240307";

    fn handler(llm: Arc<ScriptedLlmClient>) -> SarcasticHandler {
        let runner = CrewRunner::new(Arc::new(ScriptedLlmClient::new())).with_model(MODEL, llm);
        SarcasticHandler::new(MODEL, runner)
    }

    #[tokio::test]
    async fn message_is_wrapped_in_the_task() {
        let llm = Arc::new(ScriptedLlmClient::new().with_text("Oh, a meeting. How thrilling."));
        let response = handler(llm.clone())
            .handle(MessageRequest::new("We have a meeting at {time}"))
            .await
            .expect("handle");

        assert_eq!(response.output, "Oh, a meeting. How thrilling.");
        let call = &llm.calls()[0];
        assert!(call.messages[0]
            .content
            .starts_with("You are Sarcastic Message Transformer."));
        assert!(call.messages[1]
            .content
            .contains("Original message: We have a meeting at {time}\n\n"));
    }

    #[tokio::test]
    async fn failure_is_an_error() {
        let llm = Arc::new(ScriptedLlmClient::new().with_error("quota exceeded"));
        let err = handler(llm)
            .handle(MessageRequest::new("hi"))
            .await
            .expect_err("failure");
        let message = err.to_string();
        assert!(message.starts_with("Failed to process sarcastic transformation: "));
        assert!(message.contains("quota exceeded"), "{message}");
    }
}
