// ABOUTME: Entry point for the plinth command line tool
// ABOUTME: Loads .env, sets up tracing and dispatches to render, request and sweep commands

use clap::{Parser, Subcommand};
use colored::*;
use plinth_config::EngineConfig;
use plinth_engine::Engine;
use std::process;

mod cli;

use cli::render::RenderCommands;
use cli::request::RequestArgs;

#[derive(Parser)]
#[command(name = "plinth")]
#[command(about = "Plinth - serve git-backed sites with per-request script execution")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Materialize site trees
    #[command(flatten)]
    Render(RenderCommands),
    /// Run one request against a site and print the response
    Request(RequestArgs),
    /// Remove renders that have not been touched recently
    Sweep {
        /// Maximum render age in hours (defaults to PLINTH_RENDER_MAX_AGE_HOURS)
        #[arg(long)]
        max_age_hours: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = handle_command(cli.command).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

async fn handle_command(command: Commands) -> anyhow::Result<()> {
    let config = EngineConfig::from_env()?;
    let engine = Engine::new(config);

    match command {
        Commands::Render(render_cmd) => cli::render::handle_render_command(&engine, render_cmd).await,
        Commands::Request(args) => cli::request::handle_request_command(&engine, args).await,
        Commands::Sweep { max_age_hours } => {
            let max_age = max_age_hours.map(|hours| std::time::Duration::from_secs(hours * 3600));
            let removed = engine.sweep(max_age).await;
            println!("{} Removed {} render(s)", "✓".green(), removed.len());
            for path in removed {
                println!("  {}", path.display());
            }
            Ok(())
        }
    }
}
