use clap::Parser;
use colored::*;
use eyre::{Result, WrapErr};
use log::info;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod cli;

use agentflow::config::Config;
use agentflow::llm::{CompletionClient, OpenAiClient};
use agentflow::routing::{ReplyKind, RoutingAgent};
use agentflow::workflows::{EvaluatorOptimizer, Orchestrator, ParallelWorkflow};
use cli::Cli;
use cli::commands::Commands;

fn setup_logging(level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agentflow")
        .join("logs");

    fs::create_dir_all(&log_dir).wrap_err("Failed to create log directory")?;

    let log_file = log_dir.join("agentflow.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .wrap_err("Failed to open log file")?,
    );

    let mut builder = env_logger::Builder::from_default_env();
    // RUST_LOG wins over the configured level
    if let (None, Some(level)) = (std::env::var_os("RUST_LOG"), level) {
        builder.parse_filters(level);
    }
    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn build_client(config: &Config) -> Result<Arc<dyn CompletionClient>> {
    let client = OpenAiClient::from_env(&config.llm.api_key_env, config.llm.client_config())
        .wrap_err("Failed to create completion client")?;
    Ok(Arc::new(client))
}

fn section(title: &str) {
    println!("\n{}", format!("=== {} ===", title).cyan().bold());
}

fn read_code(file: &Path) -> Result<String> {
    if file == Path::new("-") {
        let mut code = String::new();
        std::io::stdin()
            .read_to_string(&mut code)
            .wrap_err("Failed to read code from stdin")?;
        return Ok(code);
    }
    fs::read_to_string(file).wrap_err_with(|| format!("Failed to read {}", file.display()))
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    let client = build_client(config)?;

    match &cli.command {
        Commands::Route { request } => handle_route_command(client, request, config).await,
        Commands::Evaluate { file, max_iterations } => {
            handle_evaluate_command(client, file, *max_iterations, config).await
        }
        Commands::Orchestrate { task } => handle_orchestrate_command(client, task, config).await,
        Commands::Parallel { prompt } => handle_parallel_command(client, prompt, config).await,
    }
}

async fn handle_route_command(client: Arc<dyn CompletionClient>, request: &str, config: &Config) -> Result<()> {
    let registry = Arc::new(config.tools.build_registry()?);
    let agent = RoutingAgent::from_config(client, registry, &config.router, &config.tools)?;

    let response = agent.route_and_respond(request).await?;

    println!("{} {}", "Route:".green(), response.route);
    match &response.kind {
        ReplyKind::Answer => println!("\n{}", response),
        ReplyKind::Unrouted => println!("\n{}", response.text.red()),
        ReplyKind::ToolFailure(failure) => {
            info!("tool failure: {}", failure);
            println!("\n{}", response.text.yellow());
        }
    }
    Ok(())
}

async fn handle_evaluate_command(
    client: Arc<dyn CompletionClient>,
    file: &Path,
    max_iterations: Option<u32>,
    config: &Config,
) -> Result<()> {
    let code = read_code(file)?;
    let workflow = EvaluatorOptimizer::new(client)
        .with_language(config.evaluator.language.clone())
        .with_max_iterations(max_iterations.unwrap_or(config.evaluator.max_iterations))
        .with_model(config.evaluator.model.clone());

    let outcome = workflow.run(&code).await?;

    for record in &outcome.iterations {
        section(&format!("Iteration {}", record.iteration));
        println!("{}", "Evaluation Feedback:".bold());
        println!("{}", record.evaluation.feedback);
        if let Some(optimized) = &record.optimized {
            println!("\n{}", "Optimized Code:".bold());
            println!("{}", optimized);
        }
    }

    section("Final Results");
    if outcome.passed {
        println!("Status: {}", "✅ Passed".green());
    } else {
        println!("Status: {}", "❌ Failed".red());
    }
    println!("\n{}", "Final Code:".bold());
    println!("{}", outcome.code);
    println!("\n{}", "Final Feedback:".bold());
    println!("{}", outcome.feedback);
    Ok(())
}

async fn handle_orchestrate_command(client: Arc<dyn CompletionClient>, task: &str, config: &Config) -> Result<()> {
    let orchestrator =
        Orchestrator::new(client, config.orchestrator.workers.clone())?.with_model(config.orchestrator.model.clone());

    let outcome = orchestrator.run(task).await?;

    section("Orchestrator's Task Breakdown");
    for subtask in &outcome.subtasks {
        println!("Subtask {}: {}", subtask.number, subtask.description);
    }
    for result in &outcome.results {
        section(&format!("Subtask {} ({}) Results", result.subtask.number, result.worker));
        println!("{}", result.output);
    }
    section("Final Synthesized Result");
    println!("{}", outcome.synthesis);
    Ok(())
}

async fn handle_parallel_command(client: Arc<dyn CompletionClient>, prompt: &str, config: &Config) -> Result<()> {
    let workflow =
        ParallelWorkflow::new(client, config.parallel.perspectives.clone())?.with_model(config.parallel.model.clone());

    let outcome = workflow.run(prompt).await?;

    for (name, answer) in &outcome.perspectives {
        section(&format!("{} Perspective", name));
        println!("{}", answer);
    }
    section("Final Synthesized Answer");
    println!("{}", outcome.synthesis);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up the API key from .env, if present
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).wrap_err("Failed to load configuration")?;

    // Setup logging at the configured level
    let level = if cli.is_verbose() {
        Some("debug")
    } else {
        config.log_level.as_deref()
    };
    setup_logging(level).wrap_err("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.wrap_err("Application failed")?;

    Ok(())
}
