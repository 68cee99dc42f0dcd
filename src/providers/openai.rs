use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::sync::Arc;

use crate::event_bus::{Event, EventBus};
use crate::llm_manager::{ChatMessage, LLMProvider, ModelReply, TokenUsage, ToolDefinition, ToolInvocation};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI Chat Completions provider with function calling.
///
/// Also used for OpenAI-compatible endpoints such as OpenRouter.
pub struct OpenAIProvider {
    name: String,
    api_key: String,
    model: String,
    base_url: String,
    temperature: Option<f32>,
    client: Client,
    extra_headers: Vec<(String, String)>,
    event_bus: Option<Arc<EventBus>>,
    cost_per_1m_input_tokens: f32,
    cost_per_1m_output_tokens: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct WireFunctionCall {
    name: String,
    /// JSON document encoded as a string.
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

fn function_type() -> String {
    "function".to_string()
}

impl OpenAIProvider {
    /// Create a new OpenAI provider with default settings
    pub fn new(model: Option<String>, temperature: Option<f32>) -> Result<Self> {
        let api_key =
            env::var("OPENAI_API_KEY").context("OPENAI_API_KEY environment variable not set")?;
        Ok(Self::with_config(api_key, model.unwrap_or_else(|| "gpt-5".to_string()))
            .with_temperature_opt(temperature))
    }

    /// Create a new OpenAI provider with custom configuration
    pub fn with_config(api_key: String, model: String) -> Self {
        Self {
            name: "OpenAI".to_string(),
            api_key,
            model,
            base_url: OPENAI_BASE_URL.to_string(),
            temperature: None,
            client: Client::new(),
            extra_headers: Vec::new(),
            event_bus: None,
            cost_per_1m_input_tokens: 0.0,
            cost_per_1m_output_tokens: 0.0,
        }
    }

    /// Set custom base URL (for API-compatible services)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Provider name reported in events and used for cost lookup
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Additional request header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((key.into(), value.into()));
        self
    }

    #[cfg(test)]
    pub(crate) fn extra_headers(&self) -> &[(String, String)] {
        &self.extra_headers
    }

    pub fn with_temperature_opt(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set event bus for event handling
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Set cost per 1 million input tokens
    pub fn with_cost_per_1m_input_tokens(mut self, cost: f32) -> Self {
        self.cost_per_1m_input_tokens = cost;
        self
    }

    /// Set cost per 1 million output tokens
    pub fn with_cost_per_1m_output_tokens(mut self, cost: f32) -> Self {
        self.cost_per_1m_output_tokens = cost;
        self
    }

    fn is_reasoning_model(model: &str) -> bool {
        let model = model.rsplit('/').next().unwrap_or(model);
        model.starts_with("o1")
            || model.starts_with("o3")
            || model.starts_with("o4-mini")
            || model.starts_with("gpt-5")
    }

    fn build_request(&self, system_prompt: &str, messages: &[ChatMessage], tools: &[ToolDefinition]) -> ChatRequest {
        let mut wire = Vec::with_capacity(messages.len() + 1);
        wire.push(WireMessage {
            role: "system".to_string(),
            content: Some(system_prompt.to_string()),
            tool_calls: None,
            tool_call_id: None,
        });
        wire.extend(messages.iter().map(to_wire_message));

        ChatRequest {
            model: self.model.clone(),
            messages: wire,
            tools: tools
                .iter()
                .map(|t| WireTool {
                    tool_type: "function",
                    function: WireFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect(),
            // Reasoning models reject a temperature parameter
            temperature: if Self::is_reasoning_model(&self.model) {
                None
            } else {
                self.temperature
            },
        }
    }

    async fn report_usage(&self, usage: &Usage) {
        let input_cost = (usage.prompt_tokens as f32 * self.cost_per_1m_input_tokens) / 1_000_000.0;
        let output_cost =
            (usage.completion_tokens as f32 * self.cost_per_1m_output_tokens) / 1_000_000.0;

        if let Some(event_bus) = &self.event_bus {
            let _ = event_bus
                .emit(Event::APICallCompleted {
                    provider: self.name.to_lowercase(),
                    tokens: usage.total_tokens,
                    cost: input_cost + output_cost,
                })
                .await;
        }
    }
}

fn to_wire_message(message: &ChatMessage) -> WireMessage {
    match message {
        ChatMessage::System(content) => WireMessage {
            role: "system".to_string(),
            content: Some(content.clone()),
            tool_calls: None,
            tool_call_id: None,
        },
        ChatMessage::User(content) => WireMessage {
            role: "user".to_string(),
            content: Some(content.clone()),
            tool_calls: None,
            tool_call_id: None,
        },
        ChatMessage::Assistant { content, tool_calls } => WireMessage {
            role: "assistant".to_string(),
            content: if content.is_empty() && !tool_calls.is_empty() {
                None
            } else {
                Some(content.clone())
            },
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(
                    tool_calls
                        .iter()
                        .map(|call| WireToolCall {
                            id: call.id.clone(),
                            call_type: function_type(),
                            function: WireFunctionCall {
                                name: call.name.clone(),
                                arguments: call.arguments.to_string(),
                            },
                        })
                        .collect(),
                )
            },
            tool_call_id: None,
        },
        ChatMessage::Tool { call_id, content, .. } => WireMessage {
            role: "tool".to_string(),
            content: Some(content.clone()),
            tool_calls: None,
            tool_call_id: Some(call_id.clone()),
        },
    }
}

fn parse_reply(response: ChatResponse) -> Result<ModelReply> {
    let usage = response.usage.as_ref().map(|u| TokenUsage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
    });
    let message = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No choices in chat completion response"))?
        .message;

    let tool_invocations = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            let arguments: Value = serde_json::from_str(&call.function.arguments).with_context(|| {
                format!("Malformed arguments for tool call '{}'", call.function.name)
            })?;
            Ok(ToolInvocation {
                id: call.id,
                name: call.function.name,
                arguments,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ModelReply {
        text: message.content.unwrap_or_default(),
        tool_invocations,
        usage,
    })
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn handles_own_metrics(&self) -> bool {
        self.event_bus.is_some()
    }

    async fn generate(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply> {
        let request = self.build_request(system_prompt, messages, tools);

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json");
        for (key, value) in &self.extra_headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = builder
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {} API", self.name))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("{} API error ({}): {}", self.name, status, error_text));
        }

        let response_text = response.text().await?;
        debug!("Raw {} response: {}", self.name, response_text);

        let chat_response: ChatResponse = serde_json::from_str(&response_text).map_err(|e| {
            error!("Failed to parse {} response. Error: {}", self.name, e);
            anyhow!("Failed to parse {} response: {}", self.name, e)
        })?;

        if let Some(usage) = &chat_response.usage {
            self.report_usage(usage).await;
        }

        parse_reply(chat_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool() -> ToolDefinition {
        ToolDefinition {
            name: "create_bar_chart".to_string(),
            description: "Maak een staafgrafiek".to_string(),
            parameters: json!({"type": "object"}),
        }
    }

    #[test]
    fn test_reasoning_models_omit_temperature() {
        let provider = OpenAIProvider::with_config("key".to_string(), "gpt-5".to_string())
            .with_temperature_opt(Some(0.7));
        let request = provider.build_request("sys", &[], &[]);
        assert!(request.temperature.is_none());

        let provider = OpenAIProvider::with_config("key".to_string(), "gpt-4.1".to_string())
            .with_temperature_opt(Some(0.7));
        assert_eq!(provider.build_request("sys", &[], &[]).temperature, Some(0.7));
    }

    #[test]
    fn test_request_carries_tool_round_trip() {
        let provider = OpenAIProvider::with_config("key".to_string(), "gpt-4.1".to_string());
        let messages = vec![
            ChatMessage::User("Maak een grafiek".to_string()),
            ChatMessage::Assistant {
                content: String::new(),
                tool_calls: vec![ToolInvocation {
                    id: "call_1".to_string(),
                    name: "create_bar_chart".to_string(),
                    arguments: json!({"labels": ["a"]}),
                }],
            },
            ChatMessage::Tool {
                call_id: "call_1".to_string(),
                name: "create_bar_chart".to_string(),
                content: "{\"success\":true}".to_string(),
            },
        ];
        let request = serde_json::to_value(provider.build_request("sys", &messages, &[tool()])).unwrap();

        assert_eq!(request["messages"][0]["role"], "system");
        assert_eq!(request["messages"][2]["content"], Value::Null);
        assert_eq!(request["messages"][2]["tool_calls"][0]["type"], "function");
        assert_eq!(
            request["messages"][2]["tool_calls"][0]["function"]["arguments"],
            "{\"labels\":[\"a\"]}"
        );
        assert_eq!(request["messages"][3]["role"], "tool");
        assert_eq!(request["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(request["tools"][0]["function"]["name"], "create_bar_chart");
        assert!(request.get("temperature").is_none());
    }

    #[test]
    fn test_parse_tool_call_response() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {
                            "name": "create_line_chart",
                            "arguments": "{\"labels\":[\"Jan\"],\"values\":[5],\"title\":\"T\",\"colorScheme\":\"fd\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }))
        .unwrap();

        let reply = parse_reply(response).unwrap();
        assert!(reply.has_tool_calls());
        assert_eq!(reply.text, "");
        assert_eq!(reply.tool_invocations[0].id, "call_abc");
        assert_eq!(reply.tool_invocations[0].arguments["values"][0], 5);
        assert_eq!(reply.usage.unwrap().input_tokens, 10);
    }

    #[test]
    fn test_parse_text_response() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "Dat kan ik helaas niet."}}]
        }))
        .unwrap();
        let reply = parse_reply(response).unwrap();
        assert!(!reply.has_tool_calls());
        assert_eq!(reply.text, "Dat kan ik helaas niet.");
    }

    #[test]
    fn test_malformed_arguments_are_an_error() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {
                "role": "assistant",
                "tool_calls": [{"id": "1", "type": "function", "function": {"name": "create_bar_chart", "arguments": "{not json"}}]
            }}]
        }))
        .unwrap();
        assert!(parse_reply(response).is_err());
    }

    #[test]
    fn test_empty_choices_are_an_error() {
        let response: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(parse_reply(response).is_err());
    }
}
