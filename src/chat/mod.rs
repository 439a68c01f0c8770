//! Interactive chat that lets a model gather crew inputs and call the crew as a function.

pub mod inputs;
pub mod loading;
pub mod prompt;
pub mod schema;
pub mod session;

use std::io::{self, BufRead, Write};

use colored::Colorize;
use tracing::{info, warn};

use crate::crew::{Crew, CrewRunner, NamedAgent};
use crate::llm_client::{SharedLlmClient, DEFAULT_CHAT_MODEL};

pub use inputs::generate_crew_chat_inputs;
pub use schema::generate_crew_tool_schema;
pub use session::{ChatExit, ChatSession};

/// Chat model priority: the manager's model, then the crew's chat model, then the default.
pub fn chat_model<'a>(crew: &'a Crew, manager: Option<&'a NamedAgent>) -> &'a str {
    manager
        .and_then(NamedAgent::llm)
        .or(crew.chat_llm.as_deref())
        .unwrap_or(DEFAULT_CHAT_MODEL)
}

pub fn initialize_chat_llm<F>(
    crew: &Crew,
    manager: Option<&NamedAgent>,
    build: F,
) -> anyhow::Result<SharedLlmClient>
where
    F: FnOnce(&str) -> anyhow::Result<SharedLlmClient>,
{
    let model = chat_model(crew, manager);
    info!(model, crew = %crew.name, "Initializing chat LLM");
    build(model)
}

/// Run the chat on stdin/stdout until the user leaves or something fails.
pub async fn run_custom_chat<F>(
    crew: Crew,
    runner: CrewRunner,
    manager: Option<NamedAgent>,
    build: F,
) -> anyhow::Result<ChatExit>
where
    F: FnOnce(&str) -> anyhow::Result<SharedLlmClient>,
{
    let stdin = io::stdin().lock();
    let stdout = io::stdout();
    run_chat_with_io(crew, runner, manager, build, stdin, stdout, true).await
}

pub async fn run_chat_with_io<F, R, W>(
    crew: Crew,
    runner: CrewRunner,
    manager: Option<NamedAgent>,
    build: F,
    input: R,
    mut output: W,
    show_loading: bool,
) -> anyhow::Result<ChatExit>
where
    F: FnOnce(&str) -> anyhow::Result<SharedLlmClient>,
    R: BufRead,
    W: Write,
{
    let llm = match initialize_chat_llm(&crew, manager.as_ref(), build) {
        Ok(llm) => llm,
        Err(err) => {
            warn!(?err, "Chat LLM unavailable");
            writeln!(
                output,
                "{}",
                format!("Unable to initialize chat LLM: {err:#}").red()
            )?;
            return Ok(ChatExit::Failed);
        }
    };

    let mut session = ChatSession::start(
        crew,
        runner,
        llm,
        manager.as_ref(),
        input,
        output,
        show_loading,
    )
    .await?;
    session.run().await
}
