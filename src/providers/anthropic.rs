use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use log::{debug, warn};

use crate::llm_manager::{ChatMessage, LLMProvider, ModelReply, TokenUsage, ToolDefinition, ToolInvocation};

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: usize,
    system: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: usize,
    output_tokens: usize,
}

/// Anthropic Messages API provider with tool use.
pub struct AnthropicProvider {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
    max_tokens: usize,
    temperature: f32,
}

impl AnthropicProvider {
    pub fn new(model: Option<String>, temperature: Option<f32>) -> Result<Self> {
        let api_key = env::var("ANTHROPIC_API_KEY")
            .context("ANTHROPIC_API_KEY environment variable not set")?;

        Ok(Self {
            api_key,
            model: model.unwrap_or_else(|| "claude-sonnet-4-0".to_string()),
            base_url: "https://api.anthropic.com/v1".to_string(),
            client: Client::new(),
            max_tokens: 4096,
            temperature: temperature.unwrap_or(0.2),
        })
    }

    fn build_request(&self, system_prompt: &str, messages: &[ChatMessage], tools: &[ToolDefinition]) -> AnthropicRequest {
        let mut system = system_prompt.to_string();
        let mut wire: Vec<AnthropicMessage> = Vec::new();

        for message in messages {
            let (role, block) = match message {
                ChatMessage::System(content) => {
                    // Only one system slot exists; extra system turns are appended to it
                    system.push_str("\n\n");
                    system.push_str(content);
                    continue;
                }
                ChatMessage::User(content) => ("user", vec![ContentBlock::Text { text: content.clone() }]),
                ChatMessage::Assistant { content, tool_calls } => {
                    let mut blocks = Vec::new();
                    if !content.trim().is_empty() {
                        blocks.push(ContentBlock::Text { text: content.clone() });
                    }
                    blocks.extend(tool_calls.iter().map(|call| ContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.arguments.clone(),
                    }));
                    ("assistant", blocks)
                }
                ChatMessage::Tool { call_id, content, .. } => (
                    "user",
                    vec![ContentBlock::ToolResult {
                        tool_use_id: call_id.clone(),
                        content: content.clone(),
                    }],
                ),
            };

            // The API rejects messages without content
            if block.is_empty() {
                continue;
            }

            // Consecutive turns of the same role must share one message
            match wire.last_mut() {
                Some(last) if last.role == role => last.content.extend(block),
                _ => wire.push(AnthropicMessage { role, content: block }),
            }
        }

        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system,
            messages: wire,
            tools: tools
                .iter()
                .map(|t| AnthropicTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.parameters.clone(),
                })
                .collect(),
            temperature: self.temperature,
        }
    }
}

fn parse_reply(response: AnthropicResponse, max_tokens: usize) -> ModelReply {
    if let Some(stop_reason) = &response.stop_reason {
        match stop_reason.as_str() {
            "max_tokens" => {
                warn!("Anthropic response was truncated due to max_tokens limit ({}). Response may be incomplete.", max_tokens);
            }
            "end_turn" | "tool_use" => {}
            other => {
                warn!("Anthropic response stopped with reason: {}", other);
            }
        }
    }

    let mut text = Vec::new();
    let mut tool_invocations = Vec::new();
    for block in response.content {
        match block {
            ContentBlock::Text { text: t } => text.push(t),
            ContentBlock::ToolUse { id, name, input } => tool_invocations.push(ToolInvocation {
                id,
                name,
                arguments: input,
            }),
            ContentBlock::ToolResult { .. } | ContentBlock::Other => {}
        }
    }

    ModelReply {
        text: text.join("\n"),
        tool_invocations,
        usage: response.usage.map(|u| TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        }),
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "Anthropic"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply> {
        let request = self.build_request(system_prompt, messages, tools);

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Anthropic API")?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("Anthropic API error: {}", error_text));
        }

        let api_response: AnthropicResponse = response
            .json()
            .await
            .context("Failed to parse Anthropic API response")?;
        debug!("Anthropic returned {} content blocks", api_response.content.len());

        Ok(parse_reply(api_response, self.max_tokens))
    }
}
