use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use indexmap::IndexMap;
use tracing::debug;

use super::{Agent, AgentConfig, Crew, NamedAgent, Task, TaskConfig};
use crate::tools::{ToolRegistry, WordCounterTool};

const EMBEDDED_AGENTS: &str = include_str!("config/agents.yaml");
const EMBEDDED_TASKS: &str = include_str!("config/tasks.yaml");

/// Agent and task configs keyed by name, in file order.
#[derive(Debug, Clone)]
pub struct CrewDefinitions {
    pub agents: IndexMap<String, AgentConfig>,
    pub tasks: IndexMap<String, TaskConfig>,
}

impl CrewDefinitions {
    pub fn embedded() -> anyhow::Result<Self> {
        Self::from_yaml(EMBEDDED_AGENTS, EMBEDDED_TASKS)
    }

    /// Read `agents.yaml` and `tasks.yaml` from `dir`, or use the built-in configs.
    pub fn load(dir: Option<&Path>) -> anyhow::Result<Self> {
        let Some(dir) = dir else {
            return Self::embedded();
        };

        let agents_path = dir.join("agents.yaml");
        let tasks_path = dir.join("tasks.yaml");
        debug!(dir = %dir.display(), "Loading crew definitions");

        let agents = fs::read_to_string(&agents_path)
            .with_context(|| format!("Failed to read {}", agents_path.display()))?;
        let tasks = fs::read_to_string(&tasks_path)
            .with_context(|| format!("Failed to read {}", tasks_path.display()))?;
        Self::from_yaml(&agents, &tasks)
    }

    pub fn from_yaml(agents: &str, tasks: &str) -> anyhow::Result<Self> {
        Ok(Self {
            agents: serde_yaml::from_str(agents).context("Failed to parse agents.yaml")?,
            tasks: serde_yaml::from_str(tasks).context("Failed to parse tasks.yaml")?,
        })
    }

    fn agent(&self, key: &str) -> anyhow::Result<Agent> {
        let config = self
            .agents
            .get(key)
            .with_context(|| format!("Agent '{key}' is missing from agents.yaml"))?;
        Ok(Agent::new(key, config.clone()))
    }

    fn task(&self, key: &str) -> anyhow::Result<Task> {
        let config = self
            .tasks
            .get(key)
            .with_context(|| format!("Task '{key}' is missing from tasks.yaml"))?;
        Ok(Task::new(key, config.clone()))
    }
}

fn word_counter_tools() -> ToolRegistry {
    ToolRegistry::new().with_tool(Arc::new(WordCounterTool))
}

/// The pitch-writing crew fronted by the chat manager persona.
pub struct TwinCrew {
    definitions: CrewDefinitions,
}

impl TwinCrew {
    pub const NAME: &'static str = "TwinCrew";
    const CHAT_LLM: &'static str = "gpt-4o";
    const WORKERS: [&'static str; 3] = ["pitch_strategist", "pitch_writer", "pitch_refiner"];
    const TASKS: [&'static str; 3] = [
        "develop_pitch_outline_task",
        "write_pitch_draft_task",
        "refine_pitch_for_fit_task",
    ];

    pub fn new(definitions: CrewDefinitions) -> Self {
        Self { definitions }
    }

    pub fn chat_manager(&self) -> anyhow::Result<NamedAgent> {
        NamedAgent::from_agent(self.definitions.agent("chat_manager")?)
    }

    pub fn crew(&self) -> anyhow::Result<Crew> {
        let agents = Self::WORKERS
            .iter()
            .map(|key| {
                let agent = self.definitions.agent(key)?;
                Ok(match *key {
                    "pitch_writer" | "pitch_refiner" => agent.with_tools(word_counter_tools()),
                    _ => agent,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        let tasks = Self::TASKS
            .iter()
            .map(|key| self.definitions.task(key))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Crew::new(Self::NAME, agents, tasks).with_chat_llm(Self::CHAT_LLM))
    }
}

/// Single-agent crew answering one message in the manager's voice.
pub struct PersonaCrew {
    definitions: CrewDefinitions,
    model: String,
}

impl PersonaCrew {
    pub const NAME: &'static str = "PersonaCrew";
    pub const INPUT_KEY: &'static str = "user_input";

    pub fn new(definitions: CrewDefinitions, model: impl Into<String>) -> Self {
        Self {
            definitions,
            model: model.into(),
        }
    }

    pub fn crew(&self) -> anyhow::Result<Crew> {
        let mut manager = self.definitions.agent("chat_manager")?;
        manager.config.llm = Some(self.model.clone());
        manager.config.allow_delegation = false;
        let task = self.definitions.task("greet_and_explain_purpose")?;

        Ok(Crew::new(Self::NAME, vec![manager], vec![task]))
    }
}
