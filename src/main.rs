mod chat;
mod config;
mod crew;
mod handlers;
mod llm_client;
mod tools;

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chat::{generate_crew_chat_inputs, generate_crew_tool_schema, ChatExit};
use config::Settings;
use crew::{Crew, CrewDefinitions, CrewInputs, CrewRunner, PersonaCrew, TwinCrew};
use handlers::{HandlerRegistry, MessageRequest, PersonaHandler, SarcasticHandler};
use llm_client::{create_llm, EchoLlmClient, SharedLlmClient, DEFAULT_CHAT_MODEL};
use tools::WordCounterTool;

const DEFAULT_BRAIN_DUMP: &str = "\
I would like to write a newsletter around \"why does it feel so hard to get a new AI software job or land AI clients\". \
It really comes down to a few ideas. People are competing the same way everyone else is, by updating their LinkedIn bio and sending out \
hundreds of resumes to the same 100 companies that are receiving thousands of applicants, which makes them a needle in the haystack. \
They aren't opening themselves up to luck by posting their work on YouTube and LinkedIn. Software is one of the only jobs where you can \
actively demo what you're capable of in a very public setting. Take advantage of that.";

const BRAIN_DUMP_INPUT: &str = "brain_dump";
const BACKGROUND_INPUT: &str = "enrique_background";

#[derive(Parser, Debug)]
#[command(
    name = "twin_crew",
    about = "Pitch-writing agent crew with an interactive persona chat"
)]
struct Cli {
    /// Directory holding agents.yaml and tasks.yaml; the built-in definitions are used otherwise.
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Answer with the offline echo model instead of calling a provider.
    #[arg(long, global = true, default_value_t = false)]
    offline: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Kick off the pitch crew once and print its final output (default).
    Run {
        /// Crew input as key=value; repeat for several inputs.
        #[arg(short, long = "input", value_parser = parse_key_value)]
        inputs: Vec<(String, String)>,
        /// Read the brain dump from a file instead of the built-in sample.
        #[arg(long)]
        brain_dump_file: Option<PathBuf>,
    },
    /// Chat with the manager persona, who calls the crew once it has every input.
    Chat,
    /// Send one message to a named handler.
    Handle {
        /// Handler name: persona or sarcastic.
        handler: String,
        message: String,
    },
    /// Count the words of the given text, or of stdin when omitted.
    CountWords { text: Option<String> },
    /// List the inputs the pitch crew needs.
    Inputs {
        /// Also ask the chat model to describe them and print the function schema.
        #[arg(long, default_value_t = false)]
        describe: bool,
    },
    /// Print the resolved settings with secrets masked.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let (cli, settings) = match startup(std::env::args_os(), Settings::from_env) {
        Ok(started) => started,
        Err(err) => match err.downcast::<clap::Error>() {
            Ok(clap_err) => clap_err.exit(),
            Err(err) => return Err(err),
        },
    };
    init_tracing(settings.debug_mode);
    info!(
        environment = %settings.environment,
        production = settings.environment.is_production(),
        "Settings loaded"
    );

    let command = cli.command.unwrap_or(Commands::Run {
        inputs: Vec::new(),
        brain_dump_file: None,
    });
    let config_dir = cli.config_dir.as_deref();

    match command {
        Commands::Run {
            inputs,
            brain_dump_file,
        } => {
            let output = run_crew(&settings, config_dir, cli.offline, inputs, brain_dump_file)
                .await
                .context("An error occurred while running the crew")?;
            println!("{output}");
        }
        Commands::Chat => {
            let exit = run_chat(&settings, config_dir, cli.offline)
                .await
                .context("An error occurred while starting chat")?;
            if exit == ChatExit::Failed {
                std::process::exit(1);
            }
        }
        Commands::Handle { handler, message } => {
            let registry = build_handlers(&settings, config_dir, cli.offline)?;
            let response = registry
                .dispatch(&handler, MessageRequest::new(message))
                .await
                .map_err(|err| {
                    error!(?err, handler = %handler, "Handler failed");
                    err
                })?;
            println!("{}", response.output);
        }
        Commands::CountWords { text } => {
            let text = match text {
                Some(text) => text,
                None => {
                    let mut buffer = String::new();
                    io::stdin()
                        .read_to_string(&mut buffer)
                        .context("Failed to read text from stdin")?;
                    buffer
                }
            };
            println!("{}", WordCounterTool::count(&text));
        }
        Commands::Inputs { describe } => {
            print_inputs(&settings, config_dir, cli.offline, describe).await?;
        }
        Commands::Config => {
            println!("{}", settings.describe());
        }
    }

    Ok(())
}

/// Arguments are parsed before settings are read, so `--help` works with a broken environment.
fn startup<I, T, F>(args: I, load_settings: F) -> anyhow::Result<(Cli, Settings)>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
    F: FnOnce() -> anyhow::Result<Settings>,
{
    let cli = Cli::try_parse_from(args)?;
    let settings = load_settings().context("Failed to load settings")?;
    Ok((cli, settings))
}

fn init_tracing(debug_mode: bool) {
    let default_level = if debug_mode { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Client for `model`, or the echo client when offline.
fn llm_for(model: &str, settings: &Settings, offline: bool) -> anyhow::Result<SharedLlmClient> {
    if offline {
        return Ok(EchoLlmClient::shared());
    }
    create_llm(model, settings)
}

/// Runner whose default client is `default_model`, with one client per model the crew's agents name.
fn build_runner(
    crew: &Crew,
    default_model: &str,
    settings: &Settings,
    offline: bool,
) -> anyhow::Result<CrewRunner> {
    let mut runner = CrewRunner::new(llm_for(default_model, settings, offline)?);
    let models: BTreeSet<&str> = crew
        .agents
        .iter()
        .filter_map(|agent| agent.config.llm.as_deref())
        .collect();
    for model in models {
        runner = runner.with_model(model, llm_for(model, settings, offline)?);
    }
    Ok(runner)
}

/// Inputs for a one-off crew run; the manager's backstory stands in for a missing background.
fn run_inputs(
    twin: &TwinCrew,
    pairs: Vec<(String, String)>,
    brain_dump_file: Option<&Path>,
) -> anyhow::Result<CrewInputs> {
    let mut inputs = CrewInputs::new();
    inputs.insert(BRAIN_DUMP_INPUT.to_string(), DEFAULT_BRAIN_DUMP.to_string());
    if let Some(path) = brain_dump_file {
        let brain_dump = fs::read_to_string(path)
            .with_context(|| format!("Failed to read brain dump from {}", path.display()))?;
        inputs.insert(BRAIN_DUMP_INPUT.to_string(), brain_dump.trim().to_string());
    }
    inputs.extend(pairs);

    if !inputs.contains_key(BACKGROUND_INPUT) {
        let manager = twin.chat_manager()?;
        inputs.insert(BACKGROUND_INPUT.to_string(), manager.backstory().to_string());
    }
    Ok(inputs)
}

async fn run_crew(
    settings: &Settings,
    config_dir: Option<&Path>,
    offline: bool,
    pairs: Vec<(String, String)>,
    brain_dump_file: Option<PathBuf>,
) -> anyhow::Result<String> {
    let twin = TwinCrew::new(CrewDefinitions::load(config_dir)?);
    let crew = twin.crew()?;
    let inputs = run_inputs(&twin, pairs, brain_dump_file.as_deref())?;
    let runner = build_runner(&crew, DEFAULT_CHAT_MODEL, settings, offline)?;

    info!(crew = %crew.name, inputs = inputs.len(), "Running crew");
    let output = runner.kickoff(&crew, &inputs).await?;
    Ok(output.raw)
}

async fn run_chat(
    settings: &Settings,
    config_dir: Option<&Path>,
    offline: bool,
) -> anyhow::Result<ChatExit> {
    let twin = TwinCrew::new(CrewDefinitions::load(config_dir)?);
    let manager = twin.chat_manager()?;
    let crew = twin.crew()?;
    let runner = build_runner(&crew, DEFAULT_CHAT_MODEL, settings, offline)?;

    chat::run_custom_chat(crew, runner, Some(manager), |model| {
        llm_for(model, settings, offline)
    })
    .await
}

fn build_handlers(
    settings: &Settings,
    config_dir: Option<&Path>,
    offline: bool,
) -> anyhow::Result<HandlerRegistry> {
    let model = settings.claude_model.as_str();
    let persona = PersonaCrew::new(CrewDefinitions::load(config_dir)?, model);
    let persona_runner = build_runner(&persona.crew()?, model, settings, offline)?;
    let sarcastic_runner = CrewRunner::new(llm_for(model, settings, offline)?);

    Ok(HandlerRegistry::new()
        .with_handler("persona", PersonaHandler::new(&persona, persona_runner)?)
        .with_handler("sarcastic", SarcasticHandler::new(model, sarcastic_runner)))
}

async fn print_inputs(
    settings: &Settings,
    config_dir: Option<&Path>,
    offline: bool,
    describe: bool,
) -> anyhow::Result<()> {
    let twin = TwinCrew::new(CrewDefinitions::load(config_dir)?);
    let crew = twin.crew()?;

    if !describe {
        for name in crew.required_inputs() {
            println!("{name}");
        }
        return Ok(());
    }

    let manager = twin.chat_manager()?;
    let llm = chat::initialize_chat_llm(&crew, Some(&manager), |model| {
        llm_for(model, settings, offline)
    })?;
    let inputs = generate_crew_chat_inputs(&crew, llm.as_ref())
        .await
        .context("Failed to describe crew inputs")?;
    for field in &inputs.inputs {
        println!(
            "{}: {}",
            field.name,
            field.description.as_deref().unwrap_or("n/a")
        );
    }
    println!(
        "\n{}",
        serde_json::to_string_pretty(&generate_crew_tool_schema(&inputs))?
    );
    Ok(())
}
