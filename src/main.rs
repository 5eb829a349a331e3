//! Unified clashdash CLI.
//!
//! - `clashdash rules` - View and edit routing rules on a router

use std::process::ExitCode;

use clap::{Parser, Subcommand};

/// clashdash unified CLI.
#[derive(Parser)]
#[command(
    name = "clashdash",
    version,
    about = "Manage OpenClash and Nikki routing rules over LuCI",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// View and edit routing rules.
    #[command(name = "rules", alias = "rule")]
    Rules(clashdash_store::RulesArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Rules(args) => clashdash_store::cli::run(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
