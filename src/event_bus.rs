use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};

/// Events that can be emitted by components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Request lifecycle
    RequestStarted {
        request_id: String,
    },
    RequestCompleted {
        request_id: String,
        steps: usize,
        chart_created: bool,
    },
    RequestFailed {
        request_id: String,
        error: String,
    },

    // Tool events
    ToolInvoked {
        name: String,
        call_id: String,
    },
    ToolFailed {
        name: String,
        error: String,
    },

    // Chart events
    ChartRendered {
        chart_type: String,
        points: usize,
    },
    ChartSaved {
        path: String,
    },

    // API events
    APICallStarted {
        provider: String,
        model: String,
    },
    APICallCompleted {
        provider: String,
        tokens: usize,
        cost: f32,
    },
    APIError {
        provider: String,
        error: String,
    },
}

/// Event bus for component communication
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    metrics: Arc<RwLock<Metrics>>,
}

/// Accumulated metrics from events
#[derive(Debug, Default, Clone)]
pub struct Metrics {
    pub total_api_calls: usize,
    pub total_tokens: usize,
    pub total_cost: f32,
    pub api_errors: usize,
    pub charts_rendered: usize,
    pub charts_saved: usize,
    pub tool_failures: usize,
    pub requests_completed: usize,
    pub requests_failed: usize,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            metrics: Arc::new(RwLock::new(Metrics::default())),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers
    pub async fn emit(&self, event: Event) -> Result<()> {
        self.update_metrics(&event).await;

        // No receivers is fine
        let _ = self.sender.send(event);
        Ok(())
    }

    /// Get current metrics
    pub async fn get_metrics(&self) -> Metrics {
        self.metrics.read().await.clone()
    }

    async fn update_metrics(&self, event: &Event) {
        let mut metrics = self.metrics.write().await;

        match event {
            Event::APICallCompleted { tokens, cost, .. } => {
                metrics.total_api_calls += 1;
                metrics.total_tokens += tokens;
                metrics.total_cost += cost;
            }
            Event::APIError { .. } => {
                metrics.api_errors += 1;
            }
            Event::ChartRendered { .. } => {
                metrics.charts_rendered += 1;
            }
            Event::ChartSaved { .. } => {
                metrics.charts_saved += 1;
            }
            Event::ToolFailed { .. } => {
                metrics.tool_failures += 1;
            }
            Event::RequestCompleted { .. } => {
                metrics.requests_completed += 1;
            }
            Event::RequestFailed { .. } => {
                metrics.requests_failed += 1;
            }
            _ => {}
        }
    }
}
