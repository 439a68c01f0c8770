//! Crew definitions: persona agents, the tasks they work on, and the sequential runner.

pub mod definitions;
pub mod runner;
pub mod template;

use std::collections::BTreeSet;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::tools::ToolRegistry;

pub use definitions::{CrewDefinitions, PersonaCrew, TwinCrew};
pub use runner::{CrewOutput, CrewRunner};
pub use template::CrewInputs;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub role: String,
    pub goal: String,
    pub backstory: String,
    /// Model identifier overriding the crew's default client.
    #[serde(default)]
    pub llm: Option<String>,
    #[serde(default)]
    pub allow_delegation: bool,
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub description: String,
    pub expected_output: String,
    /// Key of the agent that owns this task.
    #[serde(default)]
    pub agent: Option<String>,
}

#[derive(Clone)]
pub struct Agent {
    pub key: String,
    pub config: AgentConfig,
    pub tools: ToolRegistry,
}

impl Agent {
    pub fn new(key: impl Into<String>, config: AgentConfig) -> Self {
        Self {
            key: key.into(),
            config,
            tools: ToolRegistry::new(),
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn texts(&self) -> [&str; 3] {
        [
            self.config.role.as_str(),
            self.config.goal.as_str(),
            self.config.backstory.as_str(),
        ]
    }

    pub fn system_prompt(&self) -> String {
        format!(
            "You are {}. {}\nYour personal goal is: {}",
            self.config.role.trim(),
            self.config.backstory.trim(),
            self.config.goal.trim()
        )
    }

    fn interpolated(&self, inputs: &CrewInputs) -> anyhow::Result<Self> {
        let fill = |text: &str| {
            template::interpolate(text, inputs)
                .with_context(|| format!("Cannot prepare agent '{}'", self.key))
        };
        Ok(Self {
            key: self.key.clone(),
            config: AgentConfig {
                role: fill(&self.config.role)?,
                goal: fill(&self.config.goal)?,
                backstory: fill(&self.config.backstory)?,
                ..self.config.clone()
            },
            tools: self.tools.clone(),
        })
    }
}

/// Agent with a display name, used as the chat persona.
#[derive(Clone)]
pub struct NamedAgent {
    pub name: String,
    pub agent: Agent,
}

impl NamedAgent {
    pub fn from_agent(agent: Agent) -> anyhow::Result<Self> {
        let name = agent
            .config
            .name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .with_context(|| format!("Agent '{}' needs a name to act as a persona", agent.key))?;
        Ok(Self { name, agent })
    }

    pub fn role(&self) -> &str {
        self.agent.config.role.trim()
    }

    pub fn goal(&self) -> &str {
        self.agent.config.goal.trim()
    }

    pub fn backstory(&self) -> &str {
        self.agent.config.backstory.trim()
    }

    pub fn llm(&self) -> Option<&str> {
        self.agent.config.llm.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub key: String,
    pub config: TaskConfig,
}

impl Task {
    pub fn new(key: impl Into<String>, config: TaskConfig) -> Self {
        Self {
            key: key.into(),
            config,
        }
    }

    pub fn texts(&self) -> [&str; 2] {
        [
            self.config.description.as_str(),
            self.config.expected_output.as_str(),
        ]
    }

    fn interpolated(&self, inputs: &CrewInputs) -> anyhow::Result<Self> {
        let fill = |text: &str| {
            template::interpolate(text, inputs)
                .with_context(|| format!("Cannot prepare task '{}'", self.key))
        };
        Ok(Self {
            key: self.key.clone(),
            config: TaskConfig {
                description: fill(&self.config.description)?,
                expected_output: fill(&self.config.expected_output)?,
                agent: self.config.agent.clone(),
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Process {
    #[default]
    Sequential,
}

#[derive(Clone)]
pub struct Crew {
    pub name: String,
    pub agents: Vec<Agent>,
    pub tasks: Vec<Task>,
    pub process: Process,
    /// Model used for the interactive chat when no manager model is set.
    pub chat_llm: Option<String>,
}

impl Crew {
    pub fn new(name: impl Into<String>, agents: Vec<Agent>, tasks: Vec<Task>) -> Self {
        Self {
            name: name.into(),
            agents,
            tasks,
            process: Process::Sequential,
            chat_llm: None,
        }
    }

    pub fn with_chat_llm(mut self, model: impl Into<String>) -> Self {
        self.chat_llm = Some(model.into());
        self
    }

    /// Every placeholder that must be supplied to kick the crew off.
    pub fn required_inputs(&self) -> BTreeSet<String> {
        let task_texts = self.tasks.iter().flat_map(|task| task.texts());
        let agent_texts = self.agents.iter().flat_map(|agent| agent.texts());
        task_texts
            .chain(agent_texts)
            .flat_map(template::placeholders)
            .collect()
    }

    /// The task's assigned agent, falling back to the first agent of the crew.
    pub fn agent_for(&self, task: &Task) -> Option<&Agent> {
        match task.config.agent.as_deref() {
            Some(key) => self.agents.iter().find(|agent| agent.key == key),
            None => self.agents.first(),
        }
    }

    pub fn interpolated(&self, inputs: &CrewInputs) -> anyhow::Result<Self> {
        Ok(Self {
            name: self.name.clone(),
            agents: self
                .agents
                .iter()
                .map(|agent| agent.interpolated(inputs))
                .collect::<anyhow::Result<_>>()?,
            tasks: self
                .tasks
                .iter()
                .map(|task| task.interpolated(inputs))
                .collect::<anyhow::Result<_>>()?,
            process: self.process,
            chat_llm: self.chat_llm.clone(),
        })
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn agent(key: &str, role: &str, goal: &str, backstory: &str) -> Agent {
        Agent::new(
            key,
            AgentConfig {
                name: None,
                role: role.into(),
                goal: goal.into(),
                backstory: backstory.into(),
                llm: None,
                allow_delegation: false,
                verbose: false,
            },
        )
    }

    pub fn task(key: &str, description: &str, expected_output: &str, agent: &str) -> Task {
        Task::new(
            key,
            TaskConfig {
                description: description.into(),
                expected_output: expected_output.into(),
                agent: Some(agent.into()),
            },
        )
    }

    /// Two-step crew with placeholders in both tasks and agents.
    pub fn newsletter_crew() -> Crew {
        Crew::new(
            "NewsletterCrew",
            vec![
                agent(
                    "outliner",
                    "Outliner",
                    "Outline ideas about {topic}",
                    "Knows the {audience} well",
                ),
                agent("writer", "Writer", "Write crisp drafts", "Former journalist"),
            ],
            vec![
                task(
                    "outline",
                    "Outline a post about {topic}",
                    "Three bullet points",
                    "outliner",
                ),
                task("draft", "Write the post", "A short draft", "writer"),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn required_inputs_cover_tasks_and_agents() {
        let crew = newsletter_crew();
        let required: Vec<String> = crew.required_inputs().into_iter().collect();
        assert_eq!(required, vec!["audience", "topic"]);
    }

    #[test]
    fn agent_lookup_falls_back_to_first_agent() {
        let crew = newsletter_crew();
        let draft = &crew.tasks[1];
        assert_eq!(crew.agent_for(draft).map(|a| a.key.as_str()), Some("writer"));

        let orphan = Task::new(
            "orphan",
            TaskConfig {
                description: "d".into(),
                expected_output: "e".into(),
                agent: None,
            },
        );
        assert_eq!(
            crew.agent_for(&orphan).map(|a| a.key.as_str()),
            Some("outliner")
        );

        let dangling = task("x", "d", "e", "nobody");
        assert!(crew.agent_for(&dangling).is_none());
    }

    #[test]
    fn interpolation_fills_every_text() {
        let inputs: CrewInputs = [("topic", "Rust"), ("audience", "engineers")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let filled = newsletter_crew().interpolated(&inputs).expect("interpolate");
        assert_eq!(filled.tasks[0].config.description, "Outline a post about Rust");
        assert_eq!(filled.agents[0].config.backstory, "Knows the engineers well");
        assert!(filled.required_inputs().is_empty());
    }

    #[test]
    fn interpolation_names_the_failing_agent() {
        let inputs: CrewInputs = [("topic".to_string(), "Rust".to_string())]
            .into_iter()
            .collect();
        let err = newsletter_crew()
            .interpolated(&inputs)
            .err()
            .expect("audience missing");
        let rendered = format!("{err:#}");
        assert!(rendered.contains("agent 'outliner'"));
        assert!(rendered.contains("'audience'"));
    }

    #[test]
    fn named_agent_requires_name() {
        let unnamed = agent("a", "Role", "Goal", "Story");
        assert!(NamedAgent::from_agent(unnamed.clone()).is_err());

        let mut named = unnamed;
        named.config.name = Some("Enrique".into());
        let persona = NamedAgent::from_agent(named).expect("named");
        assert_eq!(persona.name, "Enrique");
        assert_eq!(persona.role(), "Role");
    }
}
