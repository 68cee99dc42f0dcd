use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use anyhow::{Result, Context};
use log::warn;

use crate::excel_parser::MAX_UPLOAD_BYTES;

/// Main configuration structure for chart_agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// AI provider configurations
    #[serde(default)]
    pub ai_providers: AIProvidersConfig,

    /// Conversation loop configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// Chart output configuration
    #[serde(default)]
    pub charts: ChartsConfig,

    /// Spreadsheet upload limits
    #[serde(default)]
    pub upload: UploadConfig,

    /// Evaluation harness configuration
    #[serde(default)]
    pub eval: EvalConfig,

    /// UI display configuration
    #[serde(default)]
    pub ui: UIConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIProvidersConfig {
    /// OpenAI configuration
    pub openai: Option<ProviderConfig>,

    /// Anthropic configuration
    pub anthropic: Option<ProviderConfig>,

    /// OpenRouter configuration
    pub openrouter: Option<ProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Whether this provider is enabled
    pub enabled: bool,

    /// Model to use
    pub model: String,

    /// Temperature setting
    pub temperature: Option<f32>,

    /// Price per million input tokens, used for the cost metric
    #[serde(default)]
    pub cost_per_1m_input_tokens: Option<f32>,

    /// Price per million output tokens
    #[serde(default)]
    pub cost_per_1m_output_tokens: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum model calls per request
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartsConfig {
    /// Directory for rendered SVG files
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Write rendered charts to disk
    #[serde(default = "default_save_to_disk")]
    pub save_to_disk: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Largest accepted spreadsheet in bytes
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Runs per accuracy test case
    #[serde(default = "default_runs_per_test")]
    pub runs_per_test: usize,

    /// Fraction of runs that must pass (exclusive)
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f32,

    /// Where evaluation reports are written
    #[serde(default = "default_results_dir")]
    pub results_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UIConfig {
    /// Enable colorful output
    #[serde(default = "default_colorful")]
    pub colorful: bool,

    /// Show a spinner while a request runs
    #[serde(default = "default_spinner")]
    pub spinner: bool,
}

// Default value functions
fn default_max_steps() -> usize { 5 }
fn default_output_dir() -> String { "./public/charts".to_string() }
fn default_save_to_disk() -> bool { true }
fn default_max_file_size_bytes() -> u64 { MAX_UPLOAD_BYTES }
fn default_runs_per_test() -> usize { 5 }
fn default_pass_threshold() -> f32 { 0.875 }
fn default_results_dir() -> String { "./eval-results".to_string() }
fn default_colorful() -> bool { true }
fn default_spinner() -> bool { true }

impl Default for AIProvidersConfig {
    fn default() -> Self {
        AIProvidersConfig {
            openai: Some(ProviderConfig {
                enabled: true,
                model: "gpt-5".to_string(),
                temperature: None,
                cost_per_1m_input_tokens: None,
                cost_per_1m_output_tokens: None,
            }),
            anthropic: Some(ProviderConfig {
                enabled: false,
                model: "claude-sonnet-4-0".to_string(),
                temperature: Some(0.2),
                cost_per_1m_input_tokens: None,
                cost_per_1m_output_tokens: None,
            }),
            openrouter: Some(ProviderConfig {
                enabled: false,
                model: "openai/gpt-4.1-mini".to_string(),
                temperature: Some(0.2),
                cost_per_1m_input_tokens: None,
                cost_per_1m_output_tokens: None,
            }),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { max_steps: default_max_steps() }
    }
}

impl Default for ChartsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            save_to_disk: default_save_to_disk(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self { max_file_size_bytes: default_max_file_size_bytes() }
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            runs_per_test: default_runs_per_test(),
            pass_threshold: default_pass_threshold(),
            results_dir: default_results_dir(),
        }
    }
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            colorful: default_colorful(),
            spinner: default_spinner(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))
    }

    /// Load configuration from command line argument or default locations
    pub fn load(config_path: &Option<String>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::from_file(shellexpand::tilde(path).as_ref());
        }

        let default_paths = [
            "chart_agent.toml",
            ".chart_agent.toml",
            "~/.config/chart_agent/config.toml",
        ];

        for path in default_paths {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(expanded_path.as_ref()).exists() {
                match Self::from_file(expanded_path.as_ref()) {
                    Ok(config) => return Ok(config),
                    Err(e) => warn!("Failed to load config from {}: {}", path, e),
                }
            }
        }

        Ok(Self::default())
    }

    /// Merge with command-line arguments (CLI args take precedence)
    pub fn merge_with_args(&mut self, headless: bool, no_save: bool) {
        if headless {
            self.ui.colorful = false;
            self.ui.spinner = false;
        }
        if no_save {
            self.charts.save_to_disk = false;
        }
    }
}
