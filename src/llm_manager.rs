use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::event_bus::{Event, EventBus};
use crate::providers::anthropic::AnthropicProvider;
use crate::providers::openai::OpenAIProvider;
use crate::providers::openrouter;

/// A tool the model may call, described by a JSON schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A structured action requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Model-facing history entry.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    System(String),
    User(String),
    Assistant {
        content: String,
        tool_calls: Vec<ToolInvocation>,
    },
    Tool {
        call_id: String,
        name: String,
        content: String,
    },
}

/// What came back from one model call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub text: String,
    pub tool_invocations: Vec<ToolInvocation>,
    /// Token usage when the provider reports it.
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_invocations.is_empty()
    }
}

/// Trait representing an LLM provider.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Name of the provider.
    fn name(&self) -> &str;

    /// Model name of the provider.
    fn model_name(&self) -> &str {
        "Unknown"
    }

    /// Whether this provider reports its own token usage.
    /// If true, LLMManager only steps in for replies that carry no usage.
    fn handles_own_metrics(&self) -> bool {
        false
    }

    /// Send the system prompt, history and tool definitions; return text and tool calls.
    async fn generate(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply>;
}

/// Offline provider used when no remote LLM is configured.
///
/// It never calls a tool: after tool results it confirms, otherwise it
/// explains what the assistant can do.
pub struct LocalProvider;

pub const LOCAL_CAPABILITIES_MESSAGE: &str = "Er is geen taalmodel geconfigureerd. Ik kan staaf- en lijngrafieken maken in FD- of BNR-kleuren zodra een API-sleutel (OPENAI_API_KEY, ANTHROPIC_API_KEY of OPENROUTER_API_KEY) is ingesteld.";

#[async_trait]
impl LLMProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn model_name(&self) -> &str {
        "offline"
    }

    async fn generate(
        &self,
        _system_prompt: &str,
        messages: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> Result<ModelReply> {
        match messages.last() {
            Some(ChatMessage::Tool { content, .. }) => Ok(ModelReply::text(format!(
                "Resultaat van de grafiek-tool: {}",
                content
            ))),
            _ => Ok(ModelReply::text(LOCAL_CAPABILITIES_MESSAGE)),
        }
    }
}

/// Manager that keeps track of the configured providers.
pub struct LLMManager {
    providers: Vec<Box<dyn LLMProvider>>,
    event_bus: Option<Arc<EventBus>>,
    config: Option<Arc<Config>>,
}

impl LLMManager {
    /// Create a new manager with the given providers.
    pub fn new(
        providers: Vec<Box<dyn LLMProvider>>,
        event_bus: Arc<EventBus>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            providers,
            event_bus: Some(event_bus),
            config: Some(config),
        }
    }

    /// Instantiate every enabled provider whose API key is available.
    ///
    /// Falls back to [`LocalProvider`] when none can be built.
    pub fn from_config(config: Arc<Config>, event_bus: Arc<EventBus>) -> Self {
        let mut providers: Vec<Box<dyn LLMProvider>> = Vec::new();
        let ai = &config.ai_providers;

        if let Some(p) = ai.openai.as_ref().filter(|p| p.enabled) {
            match OpenAIProvider::new(Some(p.model.clone()), p.temperature) {
                Ok(provider) => providers.push(Box::new(
                    provider
                        .with_cost_per_1m_input_tokens(p.cost_per_1m_input_tokens.unwrap_or(0.0))
                        .with_cost_per_1m_output_tokens(p.cost_per_1m_output_tokens.unwrap_or(0.0))
                        .with_event_bus(event_bus.clone()),
                )),
                Err(e) => warn!("Skipping OpenAI provider: {}", e),
            }
        }

        if let Some(p) = ai.anthropic.as_ref().filter(|p| p.enabled) {
            match AnthropicProvider::new(Some(p.model.clone()), p.temperature) {
                Ok(provider) => providers.push(Box::new(provider)),
                Err(e) => warn!("Skipping Anthropic provider: {}", e),
            }
        }

        if let Some(p) = ai.openrouter.as_ref().filter(|p| p.enabled) {
            match openrouter::provider(Some(p.model.clone()), p.temperature) {
                Ok(provider) => providers.push(Box::new(provider)),
                Err(e) => warn!("Skipping OpenRouter provider: {}", e),
            }
        }

        if providers.is_empty() {
            warn!("No LLM provider available, falling back to offline mode");
            providers.push(Box::new(LocalProvider));
        }

        Self::new(providers, event_bus, config)
    }

    /// Get the active provider.
    pub fn provider(&self) -> Option<&dyn LLMProvider> {
        self.providers.first().map(|p| p.as_ref())
    }

    /// Call the active provider once. Errors are reported, never retried.
    pub async fn generate(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply> {
        let provider = self
            .provider()
            .ok_or_else(|| anyhow::anyhow!("No providers available"))?;

        if let Some(bus) = &self.event_bus {
            let _ = bus
                .emit(Event::APICallStarted {
                    provider: provider.name().to_string(),
                    model: provider.model_name().to_string(),
                })
                .await;
        }

        let result = provider.generate(system_prompt, messages, tools).await;

        if let Some(bus) = &self.event_bus {
            match &result {
                Ok(reply) => {
                    // Self-reporting providers can only report what the API returned
                    if !provider.handles_own_metrics() || reply.usage.is_none() {
                        let (input_tokens, output_tokens) = match reply.usage {
                            Some(usage) => (usage.input_tokens, usage.output_tokens),
                            None => estimate_tokens(system_prompt, messages, reply),
                        };
                        let cost = self.calculate_cost(provider.name(), input_tokens, output_tokens);

                        let _ = bus
                            .emit(Event::APICallCompleted {
                                provider: provider.name().to_string(),
                                tokens: input_tokens + output_tokens,
                                cost,
                            })
                            .await;
                    }
                }
                Err(e) => {
                    let _ = bus
                        .emit(Event::APIError {
                            provider: provider.name().to_string(),
                            error: e.to_string(),
                        })
                        .await;
                }
            }
        }

        result
    }

    /// Calculate cost for API call based on provider configuration
    fn calculate_cost(&self, provider_name: &str, input_tokens: usize, output_tokens: usize) -> f32 {
        if let Some(config) = &self.config {
            let provider_config = match provider_name.to_lowercase().as_str() {
                "openai" => &config.ai_providers.openai,
                "anthropic" => &config.ai_providers.anthropic,
                "openrouter" => &config.ai_providers.openrouter,
                _ => return 0.0,
            };

            if let Some(provider_config) = provider_config {
                let input_cost = provider_config.cost_per_1m_input_tokens.unwrap_or(0.0)
                    * (input_tokens as f32)
                    / 1_000_000.0;
                let output_cost = provider_config.cost_per_1m_output_tokens.unwrap_or(0.0)
                    * (output_tokens as f32)
                    / 1_000_000.0;
                return input_cost + output_cost;
            }
        }
        0.0
    }
}

/// Rough estimate: 1 token ≈ 4 characters.
fn estimate_tokens(system_prompt: &str, messages: &[ChatMessage], reply: &ModelReply) -> (usize, usize) {
    let input_chars: usize = system_prompt.len()
        + messages
            .iter()
            .map(|m| match m {
                ChatMessage::System(c) | ChatMessage::User(c) => c.len(),
                ChatMessage::Assistant { content, tool_calls } => {
                    content.len() + tool_calls.iter().map(|t| t.arguments.to_string().len()).sum::<usize>()
                }
                ChatMessage::Tool { content, .. } => content.len(),
            })
            .sum::<usize>();
    let output_chars = reply.text.len()
        + reply
            .tool_invocations
            .iter()
            .map(|t| t.arguments.to_string().len())
            .sum::<usize>();
    (input_chars / 4, output_chars / 4)
}
