use std::fmt;
use std::str::FromStr;

use crate::models::chat::Conversation;

const GREETING_TRIGGER: &str = "hi";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GreetingScope {
    /// Only the most recent user message is inspected.
    #[default]
    LastMessage,
    /// Any message in the history triggers the shortcut.
    AnyMessage,
}

impl FromStr for GreetingScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "last" => Ok(GreetingScope::LastMessage),
            "any" => Ok(GreetingScope::AnyMessage),
            other => Err(format!("Unsupported greeting scope: {}", other)),
        }
    }
}

impl fmt::Display for GreetingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GreetingScope::LastMessage => f.write_str("last"),
            GreetingScope::AnyMessage => f.write_str("any"),
        }
    }
}

/// Answers a bare "hi" without involving the model.
#[derive(Debug, Clone)]
pub struct GreetingMatcher {
    scope: GreetingScope,
    reply: String,
}

impl GreetingMatcher {
    pub fn new(scope: GreetingScope, reply: impl Into<String>) -> Self {
        Self { scope, reply: reply.into() }
    }

    pub fn matches(&self, conversation: &Conversation) -> Option<&str> {
        let hit = match self.scope {
            GreetingScope::LastMessage => conversation
                .last_user_message()
                .map_or(false, |m| is_greeting(&m.content)),
            GreetingScope::AnyMessage => conversation
                .messages()
                .iter()
                .any(|m| is_greeting(&m.content)),
        };
        hit.then_some(self.reply.as_str())
    }
}

fn is_greeting(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case(GREETING_TRIGGER)
}
