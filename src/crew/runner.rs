use std::collections::HashMap;
use std::fmt;

use anyhow::{bail, Context};
use tracing::{debug, info, instrument, warn};

use super::{Agent, Crew, CrewInputs, Task};
use crate::llm_client::{ChatMessage, SharedLlmClient};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutput {
    pub task: String,
    pub agent: String,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrewOutput {
    /// Output of the final task.
    pub raw: String,
    pub tasks_output: Vec<TaskOutput>,
}

impl fmt::Display for CrewOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Runs a crew's tasks one after another, each with its assigned agent.
#[derive(Clone)]
pub struct CrewRunner {
    default_llm: SharedLlmClient,
    model_overrides: HashMap<String, SharedLlmClient>,
    max_tool_rounds: usize,
}

impl CrewRunner {
    const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

    pub fn new(default_llm: SharedLlmClient) -> Self {
        Self {
            default_llm,
            model_overrides: HashMap::new(),
            max_tool_rounds: Self::DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    /// Client used for agents whose config names `model`.
    pub fn with_model(mut self, model: impl Into<String>, client: SharedLlmClient) -> Self {
        self.model_overrides.insert(model.into(), client);
        self
    }

    #[allow(dead_code)]
    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    fn client_for(&self, agent: &Agent) -> &SharedLlmClient {
        agent
            .config
            .llm
            .as_ref()
            .and_then(|model| self.model_overrides.get(model))
            .unwrap_or(&self.default_llm)
    }

    #[instrument(skip_all, fields(crew = %crew.name, tasks = crew.tasks.len()))]
    pub async fn kickoff(&self, crew: &Crew, inputs: &CrewInputs) -> anyhow::Result<CrewOutput> {
        if crew.tasks.is_empty() {
            bail!("Crew '{}' has no tasks to run", crew.name);
        }

        let prepared = crew.interpolated(inputs)?;
        let mut outputs: Vec<TaskOutput> = Vec::with_capacity(prepared.tasks.len());

        for task in &prepared.tasks {
            let agent = prepared
                .agent_for(task)
                .with_context(|| format!("Task '{}' has no agent in the crew", task.key))?;
            info!(
                task = %task.key,
                agent = %agent.key,
                tools = !agent.tools.is_empty(),
                "Starting task"
            );
            if agent.config.allow_delegation {
                debug!(agent = %agent.key, "Delegation is not supported; the agent works alone");
            }

            let raw = self
                .execute_task(agent, task, &outputs)
                .await
                .with_context(|| format!("Task '{}' failed", task.key))?;
            if agent.config.verbose {
                info!(task = %task.key, agent = %agent.key, output = %raw, "Task finished");
            }

            outputs.push(TaskOutput {
                task: task.key.clone(),
                agent: agent.key.clone(),
                raw,
            });
        }

        let raw = outputs
            .last()
            .map(|output| output.raw.clone())
            .unwrap_or_default();
        info!(crew = %crew.name, "Crew finished");

        Ok(CrewOutput {
            raw,
            tasks_output: outputs,
        })
    }

    async fn execute_task(
        &self,
        agent: &Agent,
        task: &Task,
        previous: &[TaskOutput],
    ) -> anyhow::Result<String> {
        let llm = self.client_for(agent);
        let tools = agent.tools.schemas();
        let mut messages = vec![
            ChatMessage::system(agent.system_prompt()),
            ChatMessage::user(compose_task_prompt(task, previous)),
        ];

        for round in 0..self.max_tool_rounds {
            let reply = llm.chat(&messages, &tools).await?;
            if !reply.has_tool_calls() {
                return reply
                    .content
                    .map(|text| text.trim().to_string())
                    .filter(|text| !text.is_empty())
                    .context("Agent returned an empty answer");
            }

            debug!(round, calls = reply.tool_calls.len(), agent = %agent.key, "Agent requested tools");
            messages.push(ChatMessage::assistant_tool_calls(
                reply.content.unwrap_or_default(),
                reply.tool_calls.clone(),
            ));
            for call in &reply.tool_calls {
                let result = match agent.tools.execute(call).await {
                    Ok(output) => output,
                    Err(err) => {
                        warn!(?err, tool = %call.name, "Tool call failed");
                        format!("Tool error: {err:#}")
                    }
                };
                messages.push(ChatMessage::tool_result(call.id.clone(), result));
            }
        }

        warn!(agent = %agent.key, "Tool round limit reached; asking for a final answer");
        messages.push(ChatMessage::user(
            "You have used all available tool calls. Give your final answer now.",
        ));
        Ok(llm.call(&messages).await?.trim().to_string())
    }
}

fn compose_task_prompt(task: &Task, previous: &[TaskOutput]) -> String {
    let mut prompt = String::from(task.config.description.trim());

    if !previous.is_empty() {
        prompt.push_str("\n\nContext from earlier tasks:");
        for output in previous {
            prompt.push_str(&format!("\n\n[{}]\n{}", output.task, output.raw.trim()));
        }
    }

    prompt.push_str("\n\nThis is the expected criteria for your final answer: ");
    prompt.push_str(task.config.expected_output.trim());
    prompt.push_str(
        "\nYou MUST return the actual complete content as the final answer, not a summary.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::crew::fixtures::newsletter_crew;
    use crate::llm_client::testing::ScriptedLlmClient;
    use crate::llm_client::Role;
    use crate::tools::{ToolRegistry, WordCounterTool};

    fn inputs() -> CrewInputs {
        [("topic", "Rust"), ("audience", "engineers")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn tasks_run_in_order_and_share_context() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .with_text("1. ownership\n2. traits\n3. async")
                .with_text("  Final draft about Rust.  "),
        );
        let runner = CrewRunner::new(llm.clone());

        let output = runner
            .kickoff(&newsletter_crew(), &inputs())
            .await
            .expect("kickoff");

        assert_eq!(output.raw, "Final draft about Rust.");
        assert_eq!(output.to_string(), output.raw);
        assert_eq!(output.tasks_output.len(), 2);
        assert_eq!(output.tasks_output[0].agent, "outliner");

        let calls = llm.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].messages[0].content.contains("Knows the engineers well"));
        assert!(calls[0].messages[1].content.contains("about Rust"));
        assert!(calls[1].messages[1].content.contains("[outline]\n1. ownership"));
    }

    #[tokio::test]
    async fn missing_inputs_abort_before_any_llm_call() {
        let llm = Arc::new(ScriptedLlmClient::new());
        let runner = CrewRunner::new(llm.clone());

        let err = runner
            .kickoff(&newsletter_crew(), &CrewInputs::new())
            .await
            .expect_err("inputs missing");
        assert!(format!("{err:#}").contains("Missing required template variable"));
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn tool_calls_are_executed_and_fed_back() {
        let mut crew = newsletter_crew();
        crew.agents[1] = crew.agents[1]
            .clone()
            .with_tools(ToolRegistry::new().with_tool(Arc::new(WordCounterTool)));

        let llm = Arc::new(
            ScriptedLlmClient::new()
                .with_text("outline")
                .with_tool_call("word_counter_tool", json!({"text": "three short words"}))
                .with_text("draft with 3 words"),
        );
        let runner = CrewRunner::new(llm.clone());
        let output = runner.kickoff(&crew, &inputs()).await.expect("kickoff");
        assert_eq!(output.raw, "draft with 3 words");

        let calls = llm.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].tools.is_empty());
        assert_eq!(calls[1].tools.len(), 1);
        let last = calls[2].messages.last().expect("tool result");
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.content, "3");
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_to_the_model() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .with_tool_call("search", json!({}))
                .with_text("outline anyway")
                .with_text("draft"),
        );
        let runner = CrewRunner::new(llm.clone());
        runner
            .kickoff(&newsletter_crew(), &inputs())
            .await
            .expect("kickoff");

        let second = &llm.calls()[1];
        let tool_message = second.messages.last().expect("tool message");
        assert!(tool_message.content.starts_with("Tool error: Unknown tool 'search'"));
    }

    #[tokio::test]
    async fn tool_loop_is_bounded() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .with_tool_call("search", json!({}))
                .with_tool_call("search", json!({}))
                .with_text("forced final outline")
                .with_text("draft"),
        );
        let runner = CrewRunner::new(llm.clone()).with_max_tool_rounds(2);
        let output = runner
            .kickoff(&newsletter_crew(), &inputs())
            .await
            .expect("kickoff");

        assert_eq!(output.tasks_output[0].raw, "forced final outline");
        let forced = &llm.calls()[2];
        assert!(forced.tools.is_empty());
    }

    #[tokio::test]
    async fn agent_model_override_is_used() {
        let mut crew = newsletter_crew();
        crew.agents[1].config.llm = Some("claude-3-haiku-20240307".into());

        let default_llm = Arc::new(ScriptedLlmClient::new().with_text("outline"));
        let claude = Arc::new(ScriptedLlmClient::new().with_text("draft by claude"));
        let runner = CrewRunner::new(default_llm.clone())
            .with_model("claude-3-haiku-20240307", claude.clone());

        let output = runner.kickoff(&crew, &inputs()).await.expect("kickoff");
        assert_eq!(output.raw, "draft by claude");
        assert_eq!(default_llm.calls().len(), 1);
        assert_eq!(claude.calls().len(), 1);
    }

    #[tokio::test]
    async fn llm_failure_names_the_task() {
        let llm = Arc::new(ScriptedLlmClient::new().with_error("rate limited"));
        let err = CrewRunner::new(llm)
            .kickoff(&newsletter_crew(), &inputs())
            .await
            .expect_err("llm failure");
        let rendered = format!("{err:#}");
        assert!(rendered.contains("Task 'outline' failed"));
        assert!(rendered.contains("rate limited"));
    }
}
