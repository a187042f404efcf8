use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use log::info;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly e-commerce AI chatbot. Your goal is to assist customers with their shopping needs, provide product recommendations, and facilitate a seamless checkout process.";

pub const DEFAULT_GREETING_REPLY: &str = "hi, how can I help you?";

#[derive(Debug)]
pub enum PromptError {
    EmptyField(&'static str),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::EmptyField(key) => write!(f, "Prompt field '{}' must not be empty", key),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PromptConfig {
    /// Persona instruction placed ahead of every relayed conversation.
    pub system_prompt: String,
    /// Reply sent when the greeting shortcut fires.
    pub greeting_reply: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            greeting_reply: DEFAULT_GREETING_REPLY.to_string(),
        }
    }
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        if self.system_prompt.trim().is_empty() {
            return Err(PromptError::EmptyField("system_prompt"));
        }
        if self.greeting_reply.trim().is_empty() {
            return Err(PromptError::EmptyField("greeting_reply"));
        }
        Ok(())
    }

    pub fn from_json(raw: &str) -> Result<Self, PromptError> {
        let config: PromptConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<PromptConfig, PromptError> {
    let file_content = fs::read_to_string(&path)?;
    let config = PromptConfig::from_json(&file_content)?;
    info!("Loaded prompts from {}", path.as_ref().display());
    Ok(config)
}

/// Prompt file when one is configured, built-in defaults otherwise.
pub fn load_or_default(path: Option<&str>) -> Result<PromptConfig, PromptError> {
    match path {
        Some(p) if !p.trim().is_empty() => load_prompts(p),
        _ => Ok(PromptConfig::default()),
    }
}
