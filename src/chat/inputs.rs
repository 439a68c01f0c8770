use anyhow::bail;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::crew::template::{contains_placeholder, strip_placeholders};
use crate::crew::Crew;
use crate::llm_client::{ChatMessage, LlmClient};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatInputField {
    pub name: String,
    pub description: Option<String>,
}

/// What the chat model needs to know to call the crew as a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatInputs {
    pub crew_name: String,
    pub crew_description: Option<String>,
    pub inputs: Vec<ChatInputField>,
}

#[instrument(skip_all, fields(crew = %crew.name))]
pub async fn generate_crew_chat_inputs(
    crew: &Crew,
    llm: &dyn LlmClient,
) -> anyhow::Result<ChatInputs> {
    let mut inputs = Vec::new();
    for name in crew.required_inputs() {
        let description = generate_input_description(&name, crew, llm).await?;
        debug!(input = %name, %description, "Described crew input");
        inputs.push(ChatInputField {
            name,
            description: Some(description),
        });
    }

    let crew_description = generate_crew_description(crew, llm).await?;

    Ok(ChatInputs {
        crew_name: crew.name.clone(),
        crew_description: Some(crew_description),
        inputs,
    })
}

fn task_context(description: &str, expected_output: &str) -> [String; 2] {
    [
        format!("Task Description: {}", strip_placeholders(description)),
        format!("Expected Output: {}", strip_placeholders(expected_output)),
    ]
}

fn agent_context(role: &str, goal: &str, backstory: &str) -> [String; 3] {
    [
        format!("Agent Role: {}", strip_placeholders(role)),
        format!("Agent Goal: {}", strip_placeholders(goal)),
        format!("Agent Backstory: {}", strip_placeholders(backstory)),
    ]
}

/// Context lines from the tasks and agents that mention `{input_name}`.
pub fn input_context(input_name: &str, crew: &Crew) -> String {
    let mut lines = Vec::new();

    for task in &crew.tasks {
        if task
            .texts()
            .iter()
            .any(|text| contains_placeholder(text, input_name))
        {
            lines.extend(task_context(
                &task.config.description,
                &task.config.expected_output,
            ));
        }
    }

    for agent in &crew.agents {
        if agent
            .texts()
            .iter()
            .any(|text| contains_placeholder(text, input_name))
        {
            lines.extend(agent_context(
                &agent.config.role,
                &agent.config.goal,
                &agent.config.backstory,
            ));
        }
    }

    lines.join("\n")
}

/// Context lines from every task and agent of the crew.
pub fn crew_context(crew: &Crew) -> String {
    let task_lines = crew
        .tasks
        .iter()
        .flat_map(|task| task_context(&task.config.description, &task.config.expected_output));
    let agent_lines = crew.agents.iter().flat_map(|agent| {
        agent_context(
            &agent.config.role,
            &agent.config.goal,
            &agent.config.backstory,
        )
    });
    task_lines.chain(agent_lines).collect::<Vec<_>>().join("\n")
}

pub async fn generate_input_description(
    input_name: &str,
    crew: &Crew,
    llm: &dyn LlmClient,
) -> anyhow::Result<String> {
    let context = input_context(input_name, crew);
    if context.is_empty() {
        bail!("No context found for input '{input_name}'.");
    }

    let prompt = format!(
        "Based on the following context, write a concise description (15 words or less) of the input '{input_name}'.\n\
         Provide only the description, without any extra text or labels. Do not include placeholders like '{{topic}}' in the description.\n\
         Context:\n\
         {context}"
    );
    let response = llm.call(&[ChatMessage::user(prompt)]).await?;
    Ok(response.trim().to_string())
}

pub async fn generate_crew_description(crew: &Crew, llm: &dyn LlmClient) -> anyhow::Result<String> {
    let context = crew_context(crew);
    if context.is_empty() {
        bail!("No context found for generating crew description.");
    }

    let prompt = format!(
        "Based on the following context, write a concise, action-oriented description (15 words or less) of the crew's purpose.\n\
         Provide only the description, without any extra text or labels. Do not include placeholders like '{{topic}}' in the description.\n\
         Context:\n\
         {context}"
    );
    let response = llm.call(&[ChatMessage::user(prompt)]).await?;
    Ok(response.trim().to_string())
}
