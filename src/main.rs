//! Binary module entry point.
//!
//! ## Usage
//!
//! ```text
//! profitbricks_modules <datacenter|lan|server|volume|nic> <args.json>
//! ```
//!
//! The arguments file holds the module parameters as one JSON object. The
//! result (or failure) envelope is printed to stdout as one JSON object; logs
//! go to stderr, filtered by `PROFITBRICKS_LOG`.

#![allow(clippy::print_stdout)] // The result envelope is the binary's output

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use profitbricks_modules::{ModuleFailure, ModuleKind, ProfitbricksError, run_module};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "profitbricks_modules")]
#[command(about = "Declarative ProfitBricks resource modules")]
struct Cli {
    /// Module to run
    #[arg(value_enum)]
    module: ModuleKind,

    /// JSON file holding the module parameters
    args_file: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_env("PROFITBRICKS_LOG")
        .unwrap_or_else(|_| EnvFilter::new("profitbricks_modules=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(&cli).await {
        Ok(result) => {
            println!("{result}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(module = %cli.module, error = %e, "module failed");
            let failure = ModuleFailure::from(&e);
            match serde_json::to_string(&failure) {
                Ok(json) => println!("{json}"),
                Err(_) => println!(r#"{{"failed": true, "changed": false, "msg": {:?}}}"#, failure.msg),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<serde_json::Value, ProfitbricksError> {
    let raw = std::fs::read_to_string(&cli.args_file).map_err(|e| {
        ProfitbricksError::validation(format!(
            "cannot read arguments file {}: {e}",
            cli.args_file.display()
        ))
    })?;
    let args: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
        ProfitbricksError::validation(format!("arguments file is not valid JSON: {e}"))
    })?;
    run_module(cli.module, args).await
}
