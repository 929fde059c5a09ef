use std::time::Duration;

use async_trait::async_trait;

use crate::config::LlmConfig;
use crate::errors::{PilotError, PilotResult};
use crate::llm::provider::VisionModel;
use crate::llm::retry::{backoff_delay, retry_with_backoff, MAX_ATTEMPTS};
use crate::llm::types::{ChatMessage, ContentPart, ImageUrl, MessageContent};

/// Instruction merged once per call. Coordinates are fractions so the model's
/// answers stay resolution-independent.
pub const SYSTEM_PROMPT: &str = "\
You are an AI assistant that helps control a computer by analyzing screenshots \
and providing precise instructions.

When given a screenshot and an objective, you should:
1. Analyze the current screen state carefully
2. Determine the next logical action to achieve the objective
3. Respond with a JSON array of operations

Available operations:
- click: Click at a screen position {\"operation\": \"click\", \"x\": 0.25, \"y\": 0.12, \"thought\": \"clicking the button\"}
- write: Type text {\"operation\": \"write\", \"content\": \"text to type\", \"thought\": \"entering text\"}
- press: Press keyboard keys together {\"operation\": \"press\", \"keys\": [\"cmd\", \"space\"], \"thought\": \"opening spotlight\"}
- done: Mark task complete {\"operation\": \"done\", \"summary\": \"task completed\", \"thought\": \"objective achieved\"}

x and y are fractions of the screen width and height between 0 and 1, measured \
from the top-left corner.
Always provide a \"thought\" field explaining your reasoning.

Respond ONLY with a valid JSON array. Example:
[{\"operation\": \"click\", \"x\": 0.11, \"y\": 0.32, \"thought\": \"Clicking the Safari icon to open the browser\"}]";

/// Assembles one request: the fixed system instruction, the prior turns
/// (already rendered with their leading system turn excluded), and a fresh
/// user turn carrying the objective plus the inline screenshot.
pub fn build_messages(
    history: Vec<ChatMessage>,
    objective: &str,
    image_base64: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage {
        role: "system".into(),
        content: MessageContent::Text(SYSTEM_PROMPT.into()),
    });
    messages.extend(history);
    messages.push(ChatMessage {
        role: "user".into(),
        content: MessageContent::Parts(vec![
            ContentPart::Text {
                text: format!("Objective: {objective}. Based on this screenshot, what should I do next?"),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:image/jpeg;base64,{image_base64}"),
                },
            },
        ]),
    });
    messages
}

pub struct OpenAiVisionClient {
    api_base: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiVisionClient {
    pub fn new(cfg: &LlmConfig, api_key: String) -> PilotResult<Self> {
        // Hard wall-clock bound per attempt so retry exhaustion is not the
        // only thing limiting a hung call.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self {
            api_base: cfg.api_base.clone(),
            api_key,
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            client,
        })
    }

    async fn send_once(&self, messages: &[ChatMessage]) -> PilotResult<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            body = %sanitized_body(&body),
            "sending model request (base64 omitted)"
        );

        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(PilotError::ModelCall(format!("{status}: {err_body}")));
        }

        let json: serde_json::Value = response.json().await?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        tracing::debug!(content_len = content.len(), "model response received");
        Ok(content)
    }
}

#[async_trait]
impl VisionModel for OpenAiVisionClient {
    async fn complete(&self, messages: Vec<ChatMessage>) -> PilotResult<String> {
        retry_with_backoff(MAX_ATTEMPTS, backoff_delay, || self.send_once(&messages)).await
    }
}

/// Request body with inline image payloads replaced, for logging only; the
/// actual request keeps the real base64.
fn sanitized_body(body: &serde_json::Value) -> String {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in msgs {
            if let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) {
                for part in parts {
                    if part.get("type").and_then(|t| t.as_str()) == Some("image_url") {
                        if let Some(url) = part
                            .get_mut("image_url")
                            .and_then(|i| i.get_mut("url"))
                        {
                            *url = serde_json::Value::String("<omitted_base64_image>".into());
                        }
                    }
                }
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}
