use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use colored::*;
use crossterm::{
    cursor::MoveTo,
    execute,
    terminal::{Clear, ClearType},
};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::agent::AgentResponse;
use crate::chart_spec::{ChartSpecification, ChartType};
use crate::event_bus::{Event, EventBus, Metrics};

const MAX_BAR_WIDTH: usize = 50;
const LINE_HEIGHT: usize = 10;
const MAX_LINE_WIDTH: usize = 60;
const LABEL_COLUMN: usize = 15;

/// Terminal front end for the REPL and one-shot mode.
pub struct UIHandler {
    headless: bool,
    spinner_enabled: bool,
    spinner: Option<ProgressBar>,
    event_bus: Option<Arc<EventBus>>,
    follower: Option<JoinHandle<()>>,
}

impl UIHandler {
    pub fn new(headless: bool, colorful: bool, spinner: bool) -> Self {
        if !colorful || headless {
            colored::control::set_override(false);
        }
        Self {
            headless,
            spinner_enabled: spinner && !headless,
            spinner: None,
            event_bus: None,
            follower: None,
        }
    }

    /// Let the spinner narrate what the agent is doing.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn banner(&self) -> Result<()> {
        if self.headless {
            return Ok(());
        }

        execute!(io::stdout(), Clear(ClearType::All), MoveTo(0, 0))?;
        println!("{}", "=".repeat(60).bright_blue());
        println!("{}", "Welkom bij Chart Agent!".bright_white().bold());
        println!("{}", "=".repeat(60).bright_blue());
        println!();
        println!("Ik kan staaf- en lijngrafieken maken in FD- of BNR-kleuren.");
        println!("Je kunt ook een Excel-bestand opgeven door het pad in te voeren.");
        println!(
            "Typ {} om af te sluiten, {} om opnieuw te beginnen, {} voor statistieken.",
            "/exit".cyan(),
            "/reset".cyan(),
            "/stats".cyan()
        );
        println!();
        Ok(())
    }

    pub fn start_spinner(&mut self, message: &str) {
        if !self.spinner_enabled {
            return;
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        if let Some(bus) = &self.event_bus {
            let mut receiver = bus.subscribe();
            let bar = spinner.clone();
            self.follower = Some(tokio::spawn(async move {
                loop {
                    match receiver.recv().await {
                        Ok(event) => {
                            if let Some(status) = spinner_status(&event) {
                                bar.set_message(status);
                            }
                        }
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    }
                }
            }));
        }
        self.spinner = Some(spinner);
    }

    pub fn stop_spinner(&mut self) {
        if let Some(follower) = self.follower.take() {
            follower.abort();
        }
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    pub fn info(&self, message: &str) {
        if !self.headless {
            println!("{}", message.bright_black());
        }
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "Fout:".red().bold(), message);
    }

    /// Headless mode prints the bare message only.
    pub fn print_response(&self, response: &AgentResponse) {
        if self.headless {
            println!("{}", response.message);
            return;
        }

        println!("{}\n", response.message.white());

        if let Some(chart) = &response.chart_data {
            println!("{}", render_chart(chart));
        }
        if let Some(path) = &response.chart_path {
            println!("{} {}\n", "Grafiek opgeslagen in:".green(), path);
        }
        if !response.success {
            if let Some(error) = &response.error {
                println!("{} {}\n", "Details:".yellow(), error);
            }
        }
    }

    pub fn print_metrics(&self, metrics: &Metrics) {
        println!("{}", "Sessie".bright_white().bold());
        println!("  API-aanroepen:     {}", metrics.total_api_calls.to_string().bright_cyan());
        println!("  Tokens:            {}", metrics.total_tokens.to_string().bright_cyan());
        println!("  Kosten:            ${:.4}", metrics.total_cost);
        println!("  API-fouten:        {}", metrics.api_errors.to_string().bright_red());
        println!("  Grafieken:         {}", metrics.charts_rendered.to_string().bright_green());
        println!("  Opgeslagen:        {}", metrics.charts_saved.to_string().bright_green());
        println!("  Tool-fouten:       {}", metrics.tool_failures.to_string().bright_red());
        println!(
            "  Verzoeken:         {} geslaagd, {} mislukt",
            metrics.requests_completed, metrics.requests_failed
        );
        println!();
    }
}

fn spinner_status(event: &Event) -> Option<&'static str> {
    match event {
        Event::APICallStarted { .. } => Some("Het model denkt na..."),
        Event::ToolInvoked { .. } => Some("Grafiek wordt getekend..."),
        Event::ToolFailed { .. } => Some("Gegevens worden gecorrigeerd..."),
        Event::ChartSaved { .. } => Some("Grafiek opgeslagen, antwoord volgt..."),
        _ => None,
    }
}

/// Plain-text rendering of a chart for the terminal.
pub fn render_chart(spec: &ChartSpecification) -> String {
    let title = spec.title();
    let mut out = format!("{}\n{}\n\n", title, "─".repeat(title.chars().count()));
    let body = match spec.chart_type() {
        ChartType::Bar => render_bars(spec),
        ChartType::Line => render_line(spec),
    };
    out.push_str(&body);
    out
}

fn scale_max(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max > 0.0 { max } else { 1.0 }
}

fn render_bars(spec: &ChartSpecification) -> String {
    let max = scale_max(spec.values());
    let mut out = String::new();
    for (label, value) in spec.labels().iter().zip(spec.values()) {
        let width = ((value / max) * MAX_BAR_WIDTH as f64).round().max(0.0) as usize;
        let display = match spec.unit() {
            Some(unit) => format!("{} {}", value, unit),
            None => value.to_string(),
        };
        out.push_str(&format!(
            "{:<col$} {} {}\n",
            label,
            "█".repeat(width),
            display,
            col = LABEL_COLUMN
        ));
    }
    out
}

fn render_line(spec: &ChartSpecification) -> String {
    let values = spec.values();
    let labels = spec.labels();
    let max = scale_max(values);
    let width = (labels.len() * 3).clamp(1, MAX_LINE_WIDTH);
    let last = values.len().saturating_sub(1).max(1);

    let column = |i: usize| -> usize {
        ((i as f64 / last as f64) * (width - 1) as f64).round() as usize
    };
    let row = |v: f64| -> usize {
        let level = ((v / max) * (LINE_HEIGHT - 1) as f64).round();
        let level = level.clamp(0.0, (LINE_HEIGHT - 1) as f64) as usize;
        LINE_HEIGHT - 1 - level
    };

    let mut grid = vec![vec![' '; width]; LINE_HEIGHT];
    for (i, &v) in values.iter().enumerate() {
        let (x, y) = (column(i), row(v));
        if i + 1 < values.len() {
            let (nx, ny) = (column(i + 1), row(values[i + 1]));
            let steps = nx.saturating_sub(x).max(1);
            for step in 0..=steps {
                let t = step as f64 / steps as f64;
                let ix = (x as f64 + (nx as f64 - x as f64) * t).round() as usize;
                let iy = (y as f64 + (ny as f64 - y as f64) * t).round() as usize;
                if ix < width && iy < LINE_HEIGHT && grid[iy][ix] == ' ' {
                    grid[iy][ix] = '─';
                }
            }
        }
        if x < width {
            grid[y][x] = '●';
        }
    }

    let mut out = String::new();
    for (y, cells) in grid.iter().enumerate() {
        let tick = ((1.0 - y as f64 / (LINE_HEIGHT - 1) as f64) * max).round();
        let line: String = cells.iter().collect();
        out.push_str(&format!("{:>6} │ {}\n", tick, line.trim_end()));
    }
    out.push_str(&format!("{:>6} └{}\n", "", "─".repeat(width)));

    let step = (labels.len() / 5).max(1);
    let slot = (width / 5).max(1);
    let mut axis = String::from("       ");
    for label in labels.iter().step_by(step) {
        let short: String = label.chars().take(8).collect();
        axis.push_str(&format!("{:<slot$}", short, slot = slot));
    }
    let axis: String = axis.chars().take(width + 8).collect();
    out.push_str(axis.trim_end());
    out.push('\n');

    if let Some(unit) = spec.unit() {
        out.push_str(&format!("\n({})\n", unit));
    }
    out
}
