use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use thiserror::Error;

/// Values substituted into `{name}` placeholders.
pub type CrewInputs = BTreeMap<String, String>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Missing required template variable '{0}' in inputs")]
    MissingInput(String),
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{(.+?)\}").expect("placeholder pattern is valid"))
}

/// Placeholder names in order of appearance, duplicates included.
pub fn placeholders(text: &str) -> Vec<String> {
    placeholder_pattern()
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

pub fn contains_placeholder(text: &str, name: &str) -> bool {
    text.contains(&format!("{{{name}}}"))
}

/// `{topic}` becomes `topic`.
pub fn strip_placeholders(text: &str) -> Cow<'_, str> {
    placeholder_pattern().replace_all(text, |caps: &Captures<'_>| caps[1].to_string())
}

pub fn interpolate(text: &str, inputs: &CrewInputs) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(text.len());
    let mut last = 0;

    for caps in placeholder_pattern().captures_iter(text) {
        let whole = caps.get(0).expect("group 0 always matches");
        let name = &caps[1];
        let value = inputs
            .get(name)
            .ok_or_else(|| TemplateError::MissingInput(name.to_string()))?;
        output.push_str(&text[last..whole.start()]);
        output.push_str(value);
        last = whole.end();
    }

    output.push_str(&text[last..]);
    Ok(output)
}
