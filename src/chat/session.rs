use std::io::{BufRead, Write};

use anyhow::{bail, Context};
use chrono::Local;
use colored::Colorize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::inputs::{generate_crew_chat_inputs, ChatInputs};
use super::loading::LoadingIndicator;
use super::prompt::{build_system_message, presenter_message, speaker_label};
use super::schema::crew_tool;
use crate::crew::{Crew, CrewInputs, CrewRunner, NamedAgent};
use crate::llm_client::{ChatMessage, LlmClient, SharedLlmClient, ToolCall, ToolSchema};

const LOADING_MESSAGE: &str =
    "Analyzing crew and required inputs - this may take a few seconds depending on complexity.";
const CHAT_MESSAGES_INPUT: &str = "crew_chat_messages";

/// A crew run started from the chat failed; the chat cannot continue.
#[derive(Debug, Error)]
#[error("{0:#}")]
pub struct CrewToolError(anyhow::Error);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatExit {
    /// The user typed `exit`.
    UserExit,
    EndOfInput,
    Failed,
}

enum UserInput {
    Message(String),
    Exit,
    EndOfInput,
}

/// Interactive chat between a local user and the chat model, with the crew as its only tool.
pub struct ChatSession<R, W> {
    llm: SharedLlmClient,
    crew: Crew,
    runner: CrewRunner,
    speaker: String,
    tool: ToolSchema,
    messages: Vec<ChatMessage>,
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> ChatSession<R, W> {
    /// Analyze the crew, greet the user, and return a session ready to [`run`](Self::run).
    #[instrument(skip_all, fields(crew = %crew.name))]
    pub async fn start(
        crew: Crew,
        runner: CrewRunner,
        llm: SharedLlmClient,
        manager: Option<&NamedAgent>,
        input: R,
        mut output: W,
        show_loading: bool,
    ) -> anyhow::Result<Self> {
        let indicator = if show_loading {
            LoadingIndicator::start(LOADING_MESSAGE)
        } else {
            LoadingIndicator::disabled()
        };
        let analysis = analyze_crew(&crew, llm.as_ref(), manager).await;
        indicator.finish().await;
        let (inputs, system_message, introduction) = analysis?;

        let speaker = speaker_label(manager).to_string();
        writeln!(
            output,
            "{}",
            format!("\n{speaker}: {introduction}\n").green()
        )?;
        info!(inputs = inputs.inputs.len(), "Chat ready");

        Ok(Self {
            llm,
            tool: crew_tool(&inputs),
            crew,
            runner,
            speaker,
            messages: vec![
                ChatMessage::system(system_message),
                ChatMessage::assistant(introduction),
            ],
            input,
            output,
        })
    }

    #[cfg(test)]
    pub fn transcript(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub async fn run(&mut self) -> anyhow::Result<ChatExit> {
        loop {
            let text = match self.read_user_input() {
                Ok(UserInput::Message(text)) => text,
                Ok(UserInput::Exit) => {
                    writeln!(self.output, "Exiting chat. Goodbye!")?;
                    return Ok(ChatExit::UserExit);
                }
                Ok(UserInput::EndOfInput) => {
                    writeln!(self.output, "\nExiting chat. Goodbye!")?;
                    return Ok(ChatExit::EndOfInput);
                }
                Err(err) => {
                    writeln!(self.output, "{}", format!("An error occurred: {err:#}").red())?;
                    return Ok(ChatExit::Failed);
                }
            };

            if let Err(err) = self.handle_user_input(&text).await {
                match err.downcast_ref::<CrewToolError>() {
                    Some(crew_err) => {
                        writeln!(
                            self.output,
                            "{}",
                            "An error occurred while running the crew:".red()
                        )?;
                        writeln!(self.output, "{}", crew_err.to_string().red())?;
                    }
                    None => {
                        writeln!(self.output, "{}", format!("An error occurred: {err:#}").red())?;
                    }
                }
                warn!(?err, "Chat turn failed");
                return Ok(ChatExit::Failed);
            }
        }
    }

    /// Multi-line input ended by an empty line; `exit` on its own line quits.
    fn read_user_input(&mut self) -> anyhow::Result<UserInput> {
        writeln!(
            self.output,
            "{}",
            "\nYou (type your message below. Press 'Enter' twice when you're done, or type 'exit' to quit):"
                .blue()
        )?;
        self.output.flush()?;

        let mut lines: Vec<String> = Vec::new();
        loop {
            let mut buffer = String::new();
            let read = self
                .input
                .read_line(&mut buffer)
                .context("Failed to read from stdin")?;
            if read == 0 {
                return Ok(if lines.is_empty() {
                    UserInput::EndOfInput
                } else {
                    UserInput::Message(lines.join("\n"))
                });
            }

            let line = buffer.trim_end_matches(['\n', '\r']);
            if line.trim().eq_ignore_ascii_case("exit") {
                return Ok(UserInput::Exit);
            }
            if line.is_empty() {
                break;
            }
            lines.push(line.to_string());
        }

        Ok(UserInput::Message(lines.join("\n")))
    }

    async fn handle_user_input(&mut self, text: &str) -> anyhow::Result<()> {
        if text.trim().is_empty() {
            writeln!(
                self.output,
                "Empty message. Please provide input or type 'exit' to quit."
            )?;
            return Ok(());
        }

        self.messages.push(ChatMessage::user(text));
        writeln!(self.output)?;
        writeln!(
            self.output,
            "{}",
            format!("{} is thinking... 🤔", self.speaker).cyan()
        )?;
        self.output.flush()?;

        let reply = self
            .llm
            .chat(&self.messages, std::slice::from_ref(&self.tool))
            .await?;

        let crew_call = reply
            .tool_calls
            .iter()
            .find(|call| call.name == self.tool.name)
            .cloned();

        let response = match crew_call {
            Some(call) => {
                let crew_output = self.call_crew(&call).await?;
                let mut presenter = self.messages.clone();
                presenter.push(ChatMessage::system(presenter_message(&crew_output)));
                self.llm.call(&presenter).await?
            }
            None => match reply.content.filter(|text| !text.trim().is_empty()) {
                Some(text) => text,
                None => bail!("The chat model returned neither text nor a crew call"),
            },
        };

        self.messages.push(ChatMessage::assistant(response.clone()));
        writeln!(
            self.output,
            "{}",
            format!("\n{}: {response}\n", self.speaker).green()
        )?;
        Ok(())
    }

    /// Run the crew for a tool call, leaving hidden state notes in the transcript.
    async fn call_crew(&mut self, call: &ToolCall) -> Result<String, CrewToolError> {
        self.messages.push(ChatMessage::system(format!(
            "[state] About to call crew '{}' at {}. Next assistant message (message I send) will be the output received.",
            self.crew.name,
            timestamp()
        )));

        let inputs = crew_inputs_from_call(call, &self.messages).map_err(CrewToolError)?;
        info!(crew = %self.crew.name, inputs = inputs.len(), "Chat model called the crew");
        let output = self
            .runner
            .kickoff(&self.crew, &inputs)
            .await
            .map_err(CrewToolError)?;

        self.messages.push(ChatMessage::system(format!(
            "[state] Crew '{}' was called successfully at {}.",
            self.crew.name,
            timestamp()
        )));
        Ok(output.raw)
    }
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Tool-call arguments as crew inputs, plus the serialized transcript.
fn crew_inputs_from_call(
    call: &ToolCall,
    transcript: &[ChatMessage],
) -> anyhow::Result<CrewInputs> {
    let arguments = call.arguments_json()?;
    let object = arguments
        .as_object()
        .context("Crew function arguments must be a JSON object")?;

    let mut inputs: CrewInputs = object
        .iter()
        .map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            (key.clone(), text)
        })
        .collect();
    inputs.insert(
        CHAT_MESSAGES_INPUT.to_string(),
        serde_json::to_string(transcript)?,
    );
    Ok(inputs)
}

async fn analyze_crew(
    crew: &Crew,
    llm: &dyn LlmClient,
    manager: Option<&NamedAgent>,
) -> anyhow::Result<(ChatInputs, String, String)> {
    let inputs = generate_crew_chat_inputs(crew, llm).await?;
    let system_message = build_system_message(&inputs, manager);
    let introduction = llm
        .call(&[ChatMessage::system(system_message.clone())])
        .await
        .context("Failed to generate the introductory message")?;
    Ok((inputs, system_message, introduction))
}
