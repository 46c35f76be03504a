//! Fetch lifecycle controller.
//!
//! Runs network fetches concurrently and funnels their results back to the
//! single owner of the tracker. Nothing here touches tracker state.

use crate::github::GithubClient;
use crate::model::{FetchEvent, RefreshPlan, WorkflowRun};
use crate::source::RunSource;
use anyhow::Result;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;

/// Commands emitted by presentation layers.
#[derive(Debug, Clone)]
pub(crate) enum FetchCommand {
    /// Fetch the runs behind a newly submitted URL.
    Watch(RunSource),
    /// Re-fetch everything currently active.
    Refresh(RefreshPlan),
    Quit,
}

/// Serve fetch commands until `Quit` or until the command channel closes.
pub(crate) async fn run_controller(
    client: GithubClient,
    deadline: Duration,
    event_tx: UnboundedSender<FetchEvent>,
    mut cmd_rx: UnboundedReceiver<FetchCommand>,
) -> Result<()> {
    let mut in_flight: JoinSet<FetchEvent> = JoinSet::new();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(FetchCommand::Watch(source)) => {
                        let client = client.clone();
                        in_flight.spawn(async move { watch_source(&client, source, deadline).await });
                    }
                    Some(FetchCommand::Refresh(plan)) => {
                        let client = client.clone();
                        in_flight.spawn(async move { refresh(&client, plan, deadline).await });
                    }
                    Some(FetchCommand::Quit) | None => {
                        // Abandoned fetches never reach the tracker.
                        in_flight.abort_all();
                        break;
                    }
                }
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                match joined {
                    Ok(event) => {
                        if event_tx.send(event).is_err() {
                            tracing::debug!("event receiver dropped; stopping fetch controller");
                            in_flight.abort_all();
                            break;
                        }
                    }
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => tracing::error!(error = %e, "fetch task panicked"),
                }
            }
        }
    }

    Ok(())
}

async fn watch_source(client: &GithubClient, source: RunSource, deadline: Duration) -> FetchEvent {
    tracing::info!(%source, "fetching runs");
    match tokio::time::timeout(deadline, client.fetch_source(&source)).await {
        Ok(Ok(runs)) => {
            tracing::info!(%source, count = runs.len(), "fetched runs");
            FetchEvent::Fetched { source, runs }
        }
        Ok(Err(e)) => {
            tracing::warn!(%source, error = %e, "fetch failed");
            FetchEvent::FetchFailed {
                source,
                error: e.to_string(),
            }
        }
        Err(_) => {
            tracing::warn!(%source, ?deadline, "fetch timed out");
            FetchEvent::FetchFailed {
                source,
                error: format!("timed out after {}", humantime::format_duration(deadline)),
            }
        }
    }
}

/// Re-fetch each run by id and each watched pull request, collecting errors
/// instead of failing the whole cycle.
async fn refresh(client: &GithubClient, plan: RefreshPlan, deadline: Duration) -> FetchEvent {
    let work = async {
        let mut runs: Vec<WorkflowRun> = Vec::with_capacity(plan.runs.len());
        let mut pull_request_runs = Vec::with_capacity(plan.pull_requests.len());
        let mut errors = Vec::new();

        let by_id = plan.runs.iter().map(|target| async move {
            let res = client
                .workflow_run(&target.owner, &target.repo, target.run_id)
                .await;
            (target, res)
        });
        for (target, res) in futures::future::join_all(by_id).await {
            match res {
                Ok(run) => runs.push(run),
                Err(e) => errors.push(format!(
                    "{}/{} #{}: {e}",
                    target.owner, target.repo, target.run_id
                )),
            }
        }

        let by_pr = plan.pull_requests.iter().map(|source| async move {
            (source, client.fetch_source(source).await)
        });
        for (source, res) in futures::future::join_all(by_pr).await {
            match res {
                Ok(found) => pull_request_runs.push((source.clone(), found)),
                Err(e) => errors.push(format!("{source}: {e}")),
            }
        }

        (runs, pull_request_runs, errors)
    };

    match tokio::time::timeout(deadline, work).await {
        Ok((runs, pull_request_runs, errors)) => {
            tracing::debug!(
                runs = runs.len(),
                pull_requests = pull_request_runs.len(),
                errors = errors.len(),
                "refresh finished"
            );
            FetchEvent::Refreshed {
                runs,
                pull_request_runs,
                errors,
            }
        }
        Err(_) => {
            tracing::warn!(?deadline, "refresh timed out");
            FetchEvent::Refreshed {
                runs: Vec::new(),
                pull_request_runs: Vec::new(),
                errors: vec![format!(
                    "refresh timed out after {}",
                    humantime::format_duration(deadline)
                )],
            }
        }
    }
}
