mod cli;
mod github;
mod model;
mod orchestrator;
mod source;
mod storage;
mod text_summary;
mod tracker;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// The TUI owns the terminal, so logs go to `--log-file` or nowhere.
fn init_logging(log_file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file = log_file.and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("cannot open log file {}: {e}", path.display());
                None
            }
        }
    });

    match file {
        Some(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::sink)
                .try_init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_logging(args.log_file.as_deref());
    let is_one_shot = args.is_one_shot();

    match cli::run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::error!(error = %e, "exiting with error");
            if is_one_shot {
                eprintln!("{e:#}");
                std::process::exit(1);
            }
            Err(e)
        }
    }
}
