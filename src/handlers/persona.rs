use async_trait::async_trait;
use serde_json::json;
use tracing::{instrument, warn};

use super::{MessageHandler, MessageRequest, MessageResponse};
use crate::crew::{Crew, CrewInputs, CrewRunner, PersonaCrew};

/// Answers a message in the manager persona's voice.
pub struct PersonaHandler {
    crew: Crew,
    runner: CrewRunner,
}

impl PersonaHandler {
    pub fn new(persona: &PersonaCrew, runner: CrewRunner) -> anyhow::Result<Self> {
        Ok(Self {
            crew: persona.crew()?,
            runner,
        })
    }
}

#[async_trait]
impl MessageHandler for PersonaHandler {
    /// Failures are reported in the reply text rather than as errors.
    #[instrument(skip_all, fields(crew = %self.crew.name))]
    async fn handle(&self, request: MessageRequest) -> anyhow::Result<MessageResponse> {
        let inputs: CrewInputs = [(PersonaCrew::INPUT_KEY.to_string(), request.input)]
            .into_iter()
            .collect();

        match self.runner.kickoff(&self.crew, &inputs).await {
            Ok(output) => Ok(MessageResponse::with_metadata(
                output.raw.trim(),
                json!({ "crew": self.crew.name, "tasks": output.tasks_output.len() }),
            )),
            Err(err) => {
                warn!(?err, "Persona crew failed");
                Ok(MessageResponse::new(format!("An error occurred: {err:#}")))
            }
        }
    }
}
