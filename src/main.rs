use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tokio::io::{AsyncBufReadExt, BufReader};

mod agent;
mod chart_engine;
mod chart_options;
mod chart_renderer;
mod chart_spec;
mod concurrency;
mod config;
mod conversation;
mod error;
mod eval;
mod event_bus;
mod excel_parser;
mod llm_manager;
mod logger;
mod prompts;
mod providers;
mod tools;
mod ui;

use agent::ChartAgent;
use chart_engine::ChartEngine;
use chart_spec::ChartType;
use config::Config;
use conversation::Conversation;
use eval::Evaluator;
use event_bus::EventBus;
use excel_parser::{ExcelParser, is_valid_excel_file, validate_upload};
use llm_manager::LLMManager;
use tools::ChartTools;
use ui::UIHandler;

const EXCEL_REQUEST: &str = "Maak een grafiek met deze data uit het Excel-bestand";

#[derive(Parser)]
#[command(name = "chart_agent", about = "Bar and line charts in FD or BNR colours from natural language")]
struct Args {
    /// Run without UI output
    #[arg(long)]
    headless: bool,
    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<String>,
    /// Spreadsheet (.xlsx/.xls) to chart
    #[arg(short, long)]
    file: Option<String>,
    /// Do not write rendered charts to disk
    #[arg(long)]
    no_save: bool,
    /// Run the evaluation suites and write a report
    #[arg(long)]
    eval: bool,
    /// Chart request in natural language
    #[arg(last = true)]
    command: Vec<String>,
}

/// Validate, read and summarise a spreadsheet for the prompt.
fn load_spreadsheet(path: &str, limit: u64) -> Result<String> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Bestand niet gevonden: {}", path))?;
    let file_name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());
    validate_upload(&file_name, metadata.len(), limit)?;

    let data = ExcelParser::new().parse_file(path)?;
    info!("Spreadsheet '{}' yielded {} rows", data.title, data.labels.len());
    Ok(data.to_prompt_fragment(ChartType::default()))
}

async fn run_once(agent: &ChartAgent, ui: &mut UIHandler, args: &Args, limit: u64) -> Result<bool> {
    let excel_data = match &args.file {
        Some(path) => Some(load_spreadsheet(path, limit)?),
        None => None,
    };
    let mut input = args.command.join(" ");
    if input.trim().is_empty() {
        input = EXCEL_REQUEST.to_string();
    }

    ui.start_spinner("Aan het verwerken...");
    let response = agent
        .process(&input, &Conversation::new(), excel_data.as_deref())
        .await;
    ui.stop_spinner();
    ui.print_response(&response);
    Ok(response.success)
}

async fn run_repl(agent: &ChartAgent, ui: &mut UIHandler, event_bus: &EventBus, limit: u64) -> Result<()> {
    ui.banner()?;
    let mut conversation = Conversation::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("chart-agent> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "/exit" => break,
            "/reset" => {
                if conversation.is_empty() {
                    ui.info("Er is nog geen gesprek om te wissen.");
                } else {
                    ui.info(&format!("Gesprek gewist ({} berichten).", conversation.len()));
                    conversation.clear();
                }
                continue;
            }
            "/stats" => {
                ui.print_metrics(&event_bus.get_metrics().await);
                continue;
            }
            _ => {}
        }

        let (input, excel_data) = if is_valid_excel_file(line) {
            match load_spreadsheet(line, limit) {
                Ok(fragment) => {
                    ui.info("Excel-bestand gevonden, aan het verwerken...");
                    (EXCEL_REQUEST.to_string(), Some(fragment))
                }
                Err(e) => {
                    ui.error(&format!("{:#}", e));
                    continue;
                }
            }
        } else {
            (line.to_string(), None)
        };

        ui.start_spinner("Aan het verwerken...");
        let response = agent
            .process(&input, &conversation, excel_data.as_deref())
            .await;
        ui.stop_spinner();
        ui.print_response(&response);
        conversation.record(&input, &response);
    }

    println!("Tot ziens!");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::from_filename(".env.local").ok();
    dotenv::dotenv().ok();

    let args = Args::parse();
    logger::init(args.verbose);

    let mut config = Config::load(&args.config)?;
    config.merge_with_args(args.headless, args.no_save);
    let config = Arc::new(config);

    let event_bus = Arc::new(EventBus::new(1000));
    let llm_manager = Arc::new(LLMManager::from_config(config.clone(), event_bus.clone()));
    if let Some(provider) = llm_manager.provider() {
        info!("Using provider {} ({})", provider.name(), provider.model_name());
    }

    let output_dir = shellexpand::tilde(&config.charts.output_dir).to_string();
    let engine = Arc::new(
        ChartEngine::new(output_dir, config.charts.save_to_disk).with_event_bus(event_bus.clone()),
    );
    info!(
        "Charts are {} {}",
        if config.charts.save_to_disk { "saved to" } else { "not saved; output dir" },
        engine.output_dir().display()
    );
    let tools = ChartTools::new(engine).with_event_bus(event_bus.clone());
    let agent = Arc::new(
        ChartAgent::new(llm_manager, tools, config.agent.max_steps).with_event_bus(event_bus.clone()),
    );

    let mut ui = UIHandler::new(args.headless, config.ui.colorful, config.ui.spinner)
        .with_event_bus(event_bus.clone());
    let limit = config.upload.max_file_size_bytes;

    if args.eval {
        let evaluator = Evaluator::new(agent, config.eval.clone());
        let (report, _) = evaluator.run_all().await?;
        if !report.all_passed() {
            std::process::exit(1);
        }
        return Ok(());
    }

    if !args.command.is_empty() || args.file.is_some() {
        if !run_once(&agent, &mut ui, &args, limit).await? {
            std::process::exit(1);
        }
        return Ok(());
    }

    run_repl(&agent, &mut ui, &event_bus, limit).await
}
