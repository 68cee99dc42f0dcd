use anyhow::{Context, Result};
use std::env;

use crate::providers::openai::OpenAIProvider;

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const APP_NAME: &str = "chart_agent";

/// OpenRouter speaks the OpenAI chat completions dialect, tools included.
pub fn provider(model: Option<String>, temperature: Option<f32>) -> Result<OpenAIProvider> {
    let api_key = env::var("OPENROUTER_API_KEY")
        .context("OPENROUTER_API_KEY environment variable not set")?;
    // OpenRouter attributes traffic by referer; deployments can set their own site
    let referer = env::var("OPENROUTER_REFERER").unwrap_or_else(|_| APP_NAME.to_string());
    Ok(with_key(api_key, model, temperature, &referer))
}

fn with_key(api_key: String, model: Option<String>, temperature: Option<f32>, referer: &str) -> OpenAIProvider {
    OpenAIProvider::with_config(
        api_key,
        model.unwrap_or_else(|| "openai/gpt-4.1-mini".to_string()),
    )
    .with_name("openrouter")
    .with_base_url(OPENROUTER_BASE_URL)
    .with_header("HTTP-Referer", referer)
    .with_header("X-Title", APP_NAME)
    .with_temperature_opt(Some(temperature.unwrap_or(0.2)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_manager::LLMProvider;

    #[test]
    fn test_openrouter_identity() {
        let provider = with_key("key".to_string(), None, None, APP_NAME);
        assert_eq!(provider.name(), "openrouter");
        assert_eq!(provider.model_name(), "openai/gpt-4.1-mini");
        assert!(!provider.handles_own_metrics());
    }

    #[test]
    fn test_attribution_headers() {
        let provider = with_key("key".to_string(), None, None, "https://charts.example.org");
        let headers = provider.extra_headers();
        assert!(headers.contains(&("HTTP-Referer".to_string(), "https://charts.example.org".to_string())));
        assert!(headers.contains(&("X-Title".to_string(), "chart_agent".to_string())));
    }
}
