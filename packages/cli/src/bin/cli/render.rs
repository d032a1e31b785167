// ABOUTME: CLI commands that materialize a commit render or move the live tree
// ABOUTME: Both print the resulting directory so scripts can pick it up

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use plinth_engine::{Engine, RenderTarget};

#[derive(Subcommand)]
pub enum RenderCommands {
    /// Materialize an immutable render of a commit
    Materialize {
        /// Site identifier
        site: String,
        /// Full or abbreviated commit hash
        commit: String,
    },
    /// Point the live tree at a commit
    Live {
        /// Site identifier
        site: String,
        /// Full or abbreviated commit hash
        commit: String,
    },
}

pub async fn handle_render_command(engine: &Engine, command: RenderCommands) -> Result<()> {
    let (site, target) = match command {
        RenderCommands::Materialize { site, commit } => (site, RenderTarget::Commit(commit)),
        RenderCommands::Live { site, commit } => (site, RenderTarget::Live(commit)),
    };

    let dir = engine.render_dir(&site, &target).await?;
    println!(
        "{} {} @ {} -> {}",
        "✓".green(),
        site.bold(),
        target.commit(),
        dir.display()
    );
    Ok(())
}
