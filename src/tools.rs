//! The two chart tools exposed to the model.

use std::sync::Arc;

use log::{info, warn};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::chart_engine::{ChartEngine, RenderedChart};
use crate::chart_spec::{ChartCandidate, ChartType};
use crate::error::{ChartError, ValidationError};
use crate::event_bus::{Event, EventBus};
use crate::llm_manager::{ToolDefinition, ToolInvocation};

pub const CREATE_BAR_CHART: &str = "create_bar_chart";
pub const CREATE_LINE_CHART: &str = "create_line_chart";

/// Arguments shared by both tools. Unknown fields are rejected.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ChartToolArgs {
    labels: Vec<String>,
    values: Vec<f64>,
    title: String,
    #[serde(default)]
    unit: Option<String>,
    color_scheme: String,
}

/// Result of one tool invocation, ready to be fed back to the model.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub call_id: String,
    pub name: String,
    pub content: Value,
    /// Present only when the chart was built successfully.
    pub chart: Option<RenderedChart>,
}

impl ToolOutcome {
    pub fn succeeded(&self) -> bool {
        self.chart.is_some()
    }
}

pub fn tool_chart_type(name: &str) -> Option<ChartType> {
    match name {
        CREATE_BAR_CHART => Some(ChartType::Bar),
        CREATE_LINE_CHART => Some(ChartType::Line),
        _ => None,
    }
}

fn parameters_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "labels": {
                "type": "array",
                "items": {"type": "string"},
                "description": "X-as labels"
            },
            "values": {
                "type": "array",
                "items": {"type": "number"},
                "description": "Y-as waarden"
            },
            "title": {
                "type": "string",
                "description": "Grafiek titel"
            },
            "unit": {
                "type": "string",
                "description": "Meeteenheid"
            },
            "colorScheme": {
                "type": "string",
                "enum": ["fd", "bnr"],
                "description": "Kleurenschema (FD of BNR)"
            }
        },
        "required": ["labels", "values", "title", "colorScheme"],
        "additionalProperties": false
    })
}

/// Executes chart tool calls; every failure becomes a tool result, never an error.
pub struct ChartTools {
    engine: Arc<ChartEngine>,
    event_bus: Option<Arc<EventBus>>,
}

impl ChartTools {
    pub fn new(engine: Arc<ChartEngine>) -> Self {
        Self {
            engine,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: CREATE_BAR_CHART.to_string(),
                description: "Maak een staafgrafiek met de opgegeven data in FD- of BNR-kleuren".to_string(),
                parameters: parameters_schema(),
            },
            ToolDefinition {
                name: CREATE_LINE_CHART.to_string(),
                description: "Maak een lijngrafiek met de opgegeven data in FD- of BNR-kleuren".to_string(),
                parameters: parameters_schema(),
            },
        ]
    }

    pub async fn execute(&self, invocation: &ToolInvocation) -> ToolOutcome {
        if let Some(bus) = &self.event_bus {
            let _ = bus
                .emit(Event::ToolInvoked {
                    name: invocation.name.clone(),
                    call_id: invocation.id.clone(),
                })
                .await;
        }

        match self.run(invocation).await {
            Ok(chart) => {
                info!(
                    "Tool {} produced a {} chart with {} points",
                    invocation.name,
                    chart.spec.chart_type(),
                    chart.spec.point_count()
                );
                ToolOutcome {
                    call_id: invocation.id.clone(),
                    name: invocation.name.clone(),
                    content: success_content(&chart),
                    chart: Some(chart),
                }
            }
            Err(message) => {
                warn!("Tool {} failed: {}", invocation.name, message);
                if let Some(bus) = &self.event_bus {
                    let _ = bus
                        .emit(Event::ToolFailed {
                            name: invocation.name.clone(),
                            error: message.clone(),
                        })
                        .await;
                }
                ToolOutcome {
                    call_id: invocation.id.clone(),
                    name: invocation.name.clone(),
                    content: json!({ "success": false, "error": message }),
                    chart: None,
                }
            }
        }
    }

    async fn run(&self, invocation: &ToolInvocation) -> Result<RenderedChart, String> {
        let chart_type = tool_chart_type(&invocation.name)
            .ok_or_else(|| format!("Onbekende tool '{}'", invocation.name))?;

        let args: ChartToolArgs = serde_json::from_value(invocation.arguments.clone())
            .map_err(|e| ValidationError::MalformedArguments(e.to_string()).to_string())?;

        let spec = ChartCandidate {
            labels: args.labels,
            values: args.values,
            title: args.title,
            unit: args.unit,
            chart_type: chart_type.to_string(),
            color_scheme: args.color_scheme,
        }
        .validate()
        .map_err(|e| e.to_string())?;

        self.engine
            .create_chart(&spec)
            .await
            .map_err(|e: ChartError| e.to_string())
    }
}

fn success_content(chart: &RenderedChart) -> Value {
    let spec = &chart.spec;
    let kind = match spec.chart_type() {
        ChartType::Bar => "Staafgrafiek",
        ChartType::Line => "Lijngrafiek",
    };
    let message = match &chart.file_path {
        Some(path) => format!("{} succesvol aangemaakt: {}", kind, path.display()),
        None => format!("{} succesvol aangemaakt", kind),
    };

    let mut content = json!({
        "success": true,
        "labels": spec.labels(),
        "values": spec.values(),
        "title": spec.title(),
        "chartType": spec.chart_type(),
        "colorScheme": spec.color_scheme(),
        "renderedConfig": chart.config,
        "message": message,
    });
    if let Some(unit) = spec.unit() {
        content["unit"] = json!(unit);
    }
    if let Some(path) = &chart.file_path {
        content["filePath"] = json!(path.to_string_lossy());
    }
    content
}
