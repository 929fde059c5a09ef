use serde::{Deserialize, Serialize};

use crate::llm::types::{ChatMessage, ContentPart, ImageUrl, MessageContent};

/// One exchange unit in the session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    System { instructions: String },
    User { objective: String, image_base64: String },
    Assistant { raw: String },
}

/// Append-only ordered log of prior exchanges, owned by one run and discarded
/// with it. Insertion order is chronological order; turns are never reordered
/// or deduplicated.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the log with a leading system turn. Only meaningful before any
    /// exchange has been recorded.
    pub fn seeded(instructions: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::System {
                instructions: instructions.into(),
            }],
        }
    }

    pub fn push_user(&mut self, objective: impl Into<String>, image_base64: impl Into<String>) {
        self.turns.push(Turn::User {
            objective: objective.into(),
            image_base64: image_base64.into(),
        });
    }

    pub fn push_assistant(&mut self, raw: impl Into<String>) {
        self.turns.push(Turn::Assistant { raw: raw.into() });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Renders the log as chat messages for a model call. A leading system
    /// turn is skipped: the client merges its own system instruction exactly
    /// once, so the prompt must never reach the same role twice.
    pub fn to_chat_messages(&self) -> Vec<ChatMessage> {
        let start = match self.turns.first() {
            Some(Turn::System { .. }) => 1,
            _ => 0,
        };

        self.turns[start..]
            .iter()
            .map(|turn| match turn {
                Turn::System { instructions } => ChatMessage {
                    role: "system".into(),
                    content: MessageContent::Text(instructions.clone()),
                },
                Turn::User {
                    objective,
                    image_base64,
                } => ChatMessage {
                    role: "user".into(),
                    content: MessageContent::Parts(vec![
                        ContentPart::Text {
                            text: format!("Objective: {objective}"),
                        },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: format!("data:image/jpeg;base64,{image_base64}"),
                            },
                        },
                    ]),
                },
                Turn::Assistant { raw } => ChatMessage {
                    role: "assistant".into(),
                    content: MessageContent::Text(raw.clone()),
                },
            })
            .collect()
    }
}
