use crate::github::GithubClient;
use crate::model::WatchConfig;
use crate::orchestrator::absorb_runs;
use crate::source::RunSource;
use crate::storage::StateStore;
use crate::tracker::Tracker;
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Environment variables consulted for a token, in order.
const TOKEN_ENV_VARS: [&str; 3] = ["GITHUB_TOKEN", "GH_TOKEN", "GH_PAT"];

/// Upper bound on one source fetch or one full refresh cycle.
const FETCH_DEADLINE: Duration = Duration::from_secs(30);

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let mut out = std::io::LineWriter::new(std::io::stdout().lock());
        let mut err = std::io::LineWriter::new(std::io::stderr().lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{msg}");
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{msg}");
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "ghwatch",
    version,
    about = "Watch GitHub Actions workflow runs from the terminal"
)]
pub struct Cli {
    /// Run, pull request or commit URLs to watch at launch
    pub urls: Vec<String>,

    /// How often active runs are refreshed
    #[arg(long, default_value = "10s")]
    pub interval: humantime::Duration,

    /// Ring the terminal bell when a run changes status
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub bell: bool,

    /// Send a desktop notification when a run changes status
    #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
    pub notify: bool,

    /// GitHub token (falls back to GITHUB_TOKEN, GH_TOKEN, GH_PAT)
    #[arg(long)]
    pub token: Option<String>,

    /// GitHub REST API base URL
    #[arg(long, default_value = "https://api.github.com")]
    pub api_url: String,

    /// Per-request HTTP timeout
    #[arg(long, default_value = "20s")]
    pub request_timeout: humantime::Duration,

    /// Directory for saved runs and URL history
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Write logs to this file (RUST_LOG controls the level)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Fetch the given URLs once, print the catalog as JSON and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Fetch the given URLs once, print the catalog as text and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Show archived runs instead of active ones
    #[arg(long)]
    pub archived: bool,
}

impl Cli {
    pub fn is_one_shot(&self) -> bool {
        self.json || self.text
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if args.json && args.text {
        return Err(anyhow::anyhow!("--json and --text are mutually exclusive"));
    }

    if !args.is_one_shot() {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_once(args, OutputFormat::Text).await;
        }
    }

    let format = if args.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    run_once(args, format).await
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ghwatch")
}

/// Build a `WatchConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> WatchConfig {
    let data_dir = args.data_dir.clone().unwrap_or_else(default_data_dir);
    WatchConfig {
        api_url: args.api_url.trim_end_matches('/').to_string(),
        poll_interval: Duration::from(args.interval),
        request_timeout: Duration::from(args.request_timeout),
        fetch_deadline: FETCH_DEADLINE,
        bell: args.bell,
        notify: args.notify,
        state_path: data_dir.join("runs.json"),
        history_path: data_dir.join("history.json"),
        user_agent: format!("ghwatch/{}", env!("CARGO_PKG_VERSION")),
    }
}

/// Token from `--token`, else the first non-empty environment variable.
pub fn resolve_token(args: &Cli) -> Option<String> {
    pick_token(args.token.as_deref(), |name| std::env::var(name).ok())
}

fn pick_token(flag: Option<&str>, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    let non_empty = |v: String| {
        let v = v.trim().to_string();
        (!v.is_empty()).then_some(v)
    };
    flag.map(str::to_string)
        .and_then(non_empty)
        .or_else(|| {
            TOKEN_ENV_VARS
                .iter()
                .find_map(|name| lookup(name).and_then(non_empty))
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Json,
    Text,
}

/// Load saved state, fetch each URL once, absorb, save and print.
async fn run_once(args: Cli, format: OutputFormat) -> Result<()> {
    let cfg = build_config(&args);
    let client = GithubClient::new(&cfg, resolve_token(&args))
        .context("failed to build GitHub client")?;
    let store = StateStore::new(&cfg.state_path);
    let (out_tx, out_handle) = spawn_output_writer();

    let mut tracker = Tracker::new();
    store
        .restore_into(&mut tracker)
        .with_context(|| format!("failed to load {}", store.path().display()))?;

    let mut failures = 0usize;
    let mut sources = Vec::with_capacity(args.urls.len());
    for raw in &args.urls {
        match RunSource::parse(raw) {
            Ok(source) => sources.push(source),
            Err(e) => {
                failures += 1;
                let _ = out_tx.send(OutputLine::Stderr(format!("{raw}: {e}")));
            }
        }
    }

    let fetches = sources.into_iter().map(|source| {
        let client = &client;
        let deadline = cfg.fetch_deadline;
        async move {
            let res = tokio::time::timeout(deadline, client.fetch_source(&source)).await;
            (source, res)
        }
    });

    let mut dirty = false;
    for (source, res) in futures::future::join_all(fetches).await {
        match res {
            Ok(Ok(runs)) => {
                let outcome = absorb_runs(&mut tracker, runs, &source);
                dirty |= outcome.dirty();
                let _ = out_tx.send(OutputLine::Stderr(format!(
                    "{source}: {} run(s), {} new",
                    outcome.received, outcome.added
                )));
            }
            Ok(Err(e)) => {
                failures += 1;
                let _ = out_tx.send(OutputLine::Stderr(format!("{source}: {e}")));
            }
            Err(_) => {
                failures += 1;
                let _ = out_tx.send(OutputLine::Stderr(format!(
                    "{source}: timed out after {}",
                    humantime::format_duration(cfg.fetch_deadline)
                )));
            }
        }
    }

    if dirty {
        store
            .save(&tracker)
            .with_context(|| format!("failed to save {}", store.path().display()))?;
    }

    let visible = tracker.visible_runs(args.archived);
    match format {
        OutputFormat::Json => {
            let out = serde_json::to_string_pretty(&visible)?;
            let _ = out_tx.send(OutputLine::Stdout(out));
        }
        OutputFormat::Text => {
            let summary = crate::text_summary::build_text_summary(
                &visible,
                args.archived,
                time::OffsetDateTime::now_utc(),
            );
            for line in summary.lines {
                let _ = out_tx.send(OutputLine::Stdout(line));
            }
        }
    }

    drop(out_tx);
    let _ = out_handle.await;

    if failures > 0 {
        return Err(anyhow::anyhow!("{failures} URL(s) could not be fetched"));
    }
    Ok(())
}
