use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use serde::Serialize;

use crate::chart_options::{ChartConfiguration, build_chart_options};
use crate::chart_renderer::SvgRenderer;
use crate::chart_spec::{ChartSpecification, ChartType};
use crate::error::ChartError;
use crate::event_bus::{Event, EventBus};

/// Output of one chart tool invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedChart {
    pub spec: ChartSpecification,
    pub config: ChartConfiguration,
    #[serde(skip)]
    pub svg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
}

/// Builds, renders and optionally persists charts.
pub struct ChartEngine {
    output_dir: PathBuf,
    save_to_disk: bool,
    renderer: SvgRenderer,
    event_bus: Option<Arc<EventBus>>,
}

impl ChartEngine {
    pub fn new(output_dir: impl Into<PathBuf>, save_to_disk: bool) -> Self {
        Self {
            output_dir: output_dir.into(),
            save_to_disk,
            renderer: SvgRenderer::default(),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Build the configuration, render it and write it out when persistence is on.
    ///
    /// Nothing touches the disk until rendering has succeeded.
    pub async fn create_chart(&self, spec: &ChartSpecification) -> Result<RenderedChart, ChartError> {
        let config = build_chart_options(spec, spec.colors());
        let svg = self.renderer.render(&config)?;
        debug!(
            "Rendered {} chart '{}' ({} bytes)",
            spec.chart_type(),
            spec.title(),
            svg.len()
        );

        if let Some(bus) = &self.event_bus {
            let _ = bus
                .emit(Event::ChartRendered {
                    chart_type: spec.chart_type().to_string(),
                    points: spec.point_count(),
                })
                .await;
        }

        let file_path = if self.save_to_disk {
            let path = self.save_chart(&svg, spec.chart_type())?;
            info!("Chart saved to {}", path.display());
            if let Some(bus) = &self.event_bus {
                let _ = bus
                    .emit(Event::ChartSaved {
                        path: path.to_string_lossy().to_string(),
                    })
                    .await;
            }
            Some(path)
        } else {
            None
        };

        Ok(RenderedChart {
            spec: spec.clone(),
            config,
            svg,
            file_path,
        })
    }

    /// Write `{chartType}-{epochMillis}.svg`, bumping the stamp while the name is taken.
    fn save_chart(&self, svg: &str, chart_type: ChartType) -> Result<PathBuf, ChartError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| ChartError::Storage {
            path: self.output_dir.clone(),
            source,
        })?;

        let mut stamp = chrono::Utc::now().timestamp_millis();
        loop {
            let path = self.output_dir.join(chart_file_name(chart_type, stamp));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(svg.as_bytes())
                        .map_err(|source| ChartError::Storage {
                            path: path.clone(),
                            source,
                        })?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => stamp += 1,
                Err(source) => return Err(ChartError::Storage { path, source }),
            }
        }
    }
}

pub fn chart_file_name(chart_type: ChartType, epoch_millis: i64) -> String {
    format!("{}-{}.svg", chart_type, epoch_millis)
}
