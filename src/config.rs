use std::env;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Local,
    Development,
    Production,
    Prod,
    Live,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Self::Production | Self::Prod | Self::Live)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Development => "development",
            Self::Production => "production",
            Self::Prod => "prod",
            Self::Live => "live",
        }
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            "prod" => Ok(Self::Prod),
            "live" => Ok(Self::Live),
            other => bail!(
                "unknown environment '{other}' (expected local, development, production, prod or live)"
            ),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide settings resolved from the environment (after `.env` has been loaded).
#[derive(Debug, Clone)]
pub struct Settings {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub environment: Environment,
    pub domain_name: String,
    pub ssl_enabled: bool,
    pub agent_port: u16,
    pub claude_model: String,
    pub debug_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            openai_api_key: None,
            openai_base_url: None,
            environment: Environment::default(),
            domain_name: Self::DEFAULT_DOMAIN.to_string(),
            ssl_enabled: false,
            agent_port: Self::DEFAULT_AGENT_PORT,
            claude_model: Self::DEFAULT_CLAUDE_MODEL.to_string(),
            debug_mode: false,
        }
    }
}

impl Settings {
    const DEFAULT_DOMAIN: &'static str = "localhost";
    const DEFAULT_AGENT_PORT: u16 = 6000;
    const DEFAULT_CLAUDE_MODEL: &'static str = "claude-3-haiku-20240307";

    const ANTHROPIC_KEY_VARS: [&'static str; 1] = ["ANTHROPIC_API_KEY"];
    const OPENAI_KEY_VARS: [&'static str; 1] = ["OPENAI_API_KEY"];
    const OPENAI_BASE_URL_VARS: [&'static str; 1] = ["OPENAI_BASE_URL"];
    const ENVIRONMENT_VARS: [&'static str; 1] = ["ENVIRONMENT"];
    const DOMAIN_VARS: [&'static str; 1] = ["DOMAIN_NAME"];
    const SSL_VARS: [&'static str; 1] = ["SSL_ENABLED"];
    const PORT_VARS: [&'static str; 1] = ["AGENT_PORT"];
    const CLAUDE_MODEL_VARS: [&'static str; 1] = ["CLAUDE_MODEL"];
    const DEBUG_VARS: [&'static str; 1] = ["DEBUG_MODE"];

    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |candidates: &[&'static str]| {
            candidates.iter().find_map(|key| {
                lookup(key)
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
            })
        };

        let defaults = Self::default();

        let environment = match read(&Self::ENVIRONMENT_VARS) {
            Some(raw) => raw.parse().context("Invalid ENVIRONMENT")?,
            None => defaults.environment,
        };
        let ssl_enabled = match read(&Self::SSL_VARS) {
            Some(raw) => parse_bool(&raw).context("Invalid SSL_ENABLED")?,
            None => defaults.ssl_enabled,
        };
        let debug_mode = match read(&Self::DEBUG_VARS) {
            Some(raw) => parse_bool(&raw).context("Invalid DEBUG_MODE")?,
            None => defaults.debug_mode,
        };
        let agent_port = match read(&Self::PORT_VARS) {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("Invalid AGENT_PORT '{raw}'"))?,
            None => defaults.agent_port,
        };

        Ok(Self {
            anthropic_api_key: read(&Self::ANTHROPIC_KEY_VARS),
            openai_api_key: read(&Self::OPENAI_KEY_VARS),
            openai_base_url: read(&Self::OPENAI_BASE_URL_VARS),
            environment,
            domain_name: read(&Self::DOMAIN_VARS).unwrap_or(defaults.domain_name),
            ssl_enabled,
            agent_port,
            claude_model: read(&Self::CLAUDE_MODEL_VARS).unwrap_or(defaults.claude_model),
            debug_mode,
        })
    }

    /// Base URL the agent-network adapter advertises for this deployment.
    pub fn agent_endpoint(&self) -> String {
        let scheme = if self.ssl_enabled { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.domain_name, self.agent_port)
    }

    /// Human-readable dump with secrets masked.
    pub fn describe(&self) -> String {
        let lines = [
            format!("environment: {}", self.environment),
            format!("agent_endpoint: {}", self.agent_endpoint()),
            format!("claude_model: {}", self.claude_model),
            format!("debug_mode: {}", self.debug_mode),
            format!(
                "anthropic_api_key: {}",
                mask_secret(self.anthropic_api_key.as_deref())
            ),
            format!(
                "openai_api_key: {}",
                mask_secret(self.openai_api_key.as_deref())
            ),
            format!(
                "openai_base_url: {}",
                self.openai_base_url.as_deref().unwrap_or("(default)")
            ),
        ];
        lines.join("\n")
    }
}

fn parse_bool(raw: &str) -> anyhow::Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got '{other}'"),
    }
}

fn mask_secret(secret: Option<&str>) -> String {
    match secret {
        None => "(unset)".to_string(),
        Some(value) if value.chars().count() <= 8 => "****".to_string(),
        Some(value) => {
            let tail: String = value
                .chars()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("****{tail}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(pairs: &[(&str, &str)]) -> anyhow::Result<Settings> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let settings = settings_from(&[]).expect("defaults");
        assert_eq!(settings.environment, Environment::Local);
        assert_eq!(settings.domain_name, "localhost");
        assert_eq!(settings.agent_port, 6000);
        assert_eq!(settings.claude_model, "claude-3-haiku-20240307");
        assert!(!settings.ssl_enabled);
        assert!(settings.anthropic_api_key.is_none());
    }

    #[test]
    fn empty_values_are_ignored() {
        let settings =
            settings_from(&[("DOMAIN_NAME", ""), ("CLAUDE_MODEL", "  ")]).expect("settings");
        assert_eq!(settings.domain_name, "localhost");
        assert_eq!(settings.claude_model, "claude-3-haiku-20240307");
    }

    #[test]
    fn endpoint_follows_ssl_and_port() {
        let settings = settings_from(&[
            ("DOMAIN_NAME", "agents.example.com"),
            ("SSL_ENABLED", "true"),
            ("AGENT_PORT", "443"),
            ("ENVIRONMENT", "prod"),
        ])
        .expect("settings");
        assert_eq!(settings.agent_endpoint(), "https://agents.example.com:443");
        assert!(settings.environment.is_production());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(settings_from(&[("ENVIRONMENT", "staging")]).is_err());
        assert!(settings_from(&[("AGENT_PORT", "seventy")]).is_err());
        assert!(settings_from(&[("SSL_ENABLED", "maybe")]).is_err());
    }

    #[test]
    fn only_documented_openai_variables_are_read() {
        let settings = settings_from(&[
            ("AIE_OPENAI_API_KEY", "sk-legacy"),
            ("AIE_OPENAI_BASE_URL", "http://legacy"),
        ])
        .expect("settings");
        assert!(settings.openai_api_key.is_none());
        assert!(settings.openai_base_url.is_none());

        let settings = settings_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", "http://localhost:8000/v1"),
        ])
        .expect("settings");
        assert_eq!(settings.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(
            settings.openai_base_url.as_deref(),
            Some("http://localhost:8000/v1")
        );
    }

    #[test]
    fn describe_masks_keys() {
        let settings =
            settings_from(&[("ANTHROPIC_API_KEY", "sk-ant-0123456789abcd")]).expect("settings");
        let text = settings.describe();
        assert!(text.contains("****abcd"));
        assert!(!text.contains("sk-ant-0123"));
        assert!(text.contains("openai_api_key: (unset)"));
    }
}
