//! Events emitted by the event source for the bot to consume.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{ContextId, MemberId, ResourceId};

/// Events the platform delivers to the consumer (bot, test harness, etc.)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Session is up and events will follow.
    Ready,

    /// A member connected to a voice resource.
    VoiceJoined(JoinEvent),

    /// A member disconnected from voice entirely.
    VoiceLeft {
        member: MemberId,
        context: ContextId,
    },

    /// An operator invoked a command.
    Command(CommandInvocation),

    /// The source closed.
    Disconnected {
        reason: String,
    },
}

/// A member joined `resource` within `context`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinEvent {
    pub member: MemberId,
    pub context: ContextId,
    pub resource: ResourceId,
}

/// An operator command with its named options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInvocation {
    /// Context the command was issued in.
    pub context: ContextId,
    #[serde(default)]
    pub invoker: Option<MemberId>,
    /// Command name without prefix, e.g. `factory`.
    pub name: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl CommandInvocation {
    pub fn new(context: ContextId, name: impl Into<String>) -> Self {
        Self {
            context,
            invoker: None,
            name: name.into(),
            options: BTreeMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}
