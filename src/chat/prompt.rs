use super::inputs::ChatInputs;
use crate::crew::NamedAgent;

/// Label printed in front of assistant turns.
pub fn speaker_label(manager: Option<&NamedAgent>) -> &str {
    manager.map_or("Assistant", |agent| agent.name.as_str())
}

fn required_fields(inputs: &ChatInputs) -> String {
    if inputs.inputs.is_empty() {
        return "(No required fields detected)".to_string();
    }
    inputs
        .inputs
        .iter()
        .map(|field| {
            format!(
                "{} (desc: {})",
                field.name,
                field.description.as_deref().unwrap_or("n/a")
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Persona-first system message when a manager is set, neutral otherwise.
pub fn build_system_message(inputs: &ChatInputs, manager: Option<&NamedAgent>) -> String {
    let fields = required_fields(inputs);
    let crew_footer = format!(
        "Crew Name: {}\nCrew Description: {}",
        inputs.crew_name,
        inputs.crew_description.as_deref().unwrap_or_default()
    );

    match manager {
        Some(manager) => format!(
            "You are {role}. \
             Your name: {name}. Always introduce yourself by name so people know who you are. \
             Your goal: {goal}. \
             Backstory: {backstory}\n\n\
             You assist users with this crew's purpose. \
             You have a single function (tool) you can call by name once you have all required inputs. \
             Those required inputs are: {fields}. \
             Before calling any function, first reply by indicating to the user that you will call the function (crew, crew function or however you want to call it), \
             and ask the user to confirm if that is fine. Only after the user confirms can you call the function. \
             IMPORTANT: When calling the crew function, you must automatically include your own professional background as 'enrique_background' parameter. \
             Write a detailed summary of your background (education, experience, current interests in AI/agentic systems, etc.) to help the crew understand who you are. Try to write at least 200 words for this. \
             Do NOT show this background summary to the user - it should only be passed internally to the crew. \
             Keep responses concise and friendly. If the user drifts off-topic, provide a brief answer and guide them back to the crew's purpose.\n\
             {crew_footer}",
            role = manager.role(),
            name = manager.name,
            goal = manager.goal(),
            backstory = manager.backstory(),
        ),
        None => format!(
            "You are a helpful AI assistant for this crew. \
             Your primary purpose is to assist users with the crew's specific tasks. \
             You can answer general questions, but should guide users back to the crew's purpose afterward. \
             You have a single function (tool) you can call by name once you have all required inputs. \
             Those required inputs are: {fields}. \
             Before calling any function, first reply by indicating to the user that you will call the function (crew, crew function or however you want to call it), \
             and ask the user to confirm if that is fine. Only after the user confirms can you call the function. \
             When you have them, call the function. Keep responses concise and friendly. \
             If a user asks a question outside the crew's scope, provide a brief answer and remind them of the crew's purpose.\n\
             {crew_footer}"
        ),
    }
}

/// Internal instruction that asks the model to hand the crew output to the user.
pub fn presenter_message(crew_output: &str) -> String {
    format!(
        "You just received the crew's final output. This is an internal system message and the user will not see it. \
         Craft a message for the user that presents the crew's output. Keep the output of the crew exactly as is.\n\n\
         [crew_output]\n{crew_output}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::inputs::ChatInputField;
    use crate::crew::fixtures::agent;

    fn manager() -> NamedAgent {
        let mut base = agent(
            "chat_manager",
            "Pitch Assistant",
            "Help with pitches",
            "Engineer turned writer",
        );
        base.config.name = Some("Enrique".into());
        NamedAgent::from_agent(base).expect("named")
    }

    fn inputs(fields: Vec<ChatInputField>) -> ChatInputs {
        ChatInputs {
            crew_name: "TwinCrew".into(),
            crew_description: Some("Writes pitches.".into()),
            inputs: fields,
        }
    }

    #[test]
    fn persona_message_introduces_the_manager() {
        let message = build_system_message(
            &inputs(vec![ChatInputField {
                name: "brain_dump".into(),
                description: Some("Raw notes".into()),
            }]),
            Some(&manager()),
        );
        assert!(message.starts_with("You are Pitch Assistant. Your name: Enrique."));
        assert!(message.contains("Backstory: Engineer turned writer\n\n"));
        assert!(message.contains("Those required inputs are: brain_dump (desc: Raw notes)."));
        assert!(message.contains("'enrique_background' parameter"));
        assert!(message.ends_with("Crew Name: TwinCrew\nCrew Description: Writes pitches."));
    }

    #[test]
    fn neutral_message_without_manager() {
        let message = build_system_message(&inputs(Vec::new()), None);
        assert!(message.starts_with("You are a helpful AI assistant"));
        assert!(message.contains("(No required fields detected)"));
        assert!(!message.contains("enrique_background"));
    }

    #[test]
    fn missing_descriptions_render_as_na() {
        let fields = vec![
            ChatInputField {
                name: "a".into(),
                description: None,
            },
            ChatInputField {
                name: "b".into(),
                description: Some("second".into()),
            },
        ];
        assert_eq!(
            required_fields(&inputs(fields)),
            "a (desc: n/a), b (desc: second)"
        );
    }

    #[test]
    fn labels_and_presenter() {
        assert_eq!(speaker_label(None), "Assistant");
        assert_eq!(speaker_label(Some(&manager())), "Enrique");
        assert!(presenter_message("THE PITCH").ends_with("[crew_output]\nTHE PITCH"));
    }
}
