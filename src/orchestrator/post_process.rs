//! Post-fetch processing.
//!
//! Feeds fetched records into the tracker and plans the next refresh. Called
//! only by the owner of the tracker.

use crate::model::{FetchEvent, RefreshPlan, RefreshTarget, WorkflowRun};
use crate::source::RunSource;
use crate::tracker::Tracker;
use std::collections::HashSet;

/// What a batch of upserts did to the catalog, ready for presentation layers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct AbsorbOutcome {
    pub received: usize,
    pub added: usize,
    /// Runs whose status changed, in the order they were absorbed.
    pub changed: Vec<WorkflowRun>,
}

impl AbsorbOutcome {
    pub fn status_changed(&self) -> bool {
        !self.changed.is_empty()
    }

    /// The catalog differs from what was last persisted.
    pub fn dirty(&self) -> bool {
        self.added > 0 || self.status_changed()
    }

    fn merge(&mut self, other: AbsorbOutcome) {
        self.received += other.received;
        self.added += other.added;
        self.changed.extend(other.changed);
    }
}

/// Upsert every run with the same source.
pub(crate) fn absorb_runs(
    tracker: &mut Tracker,
    runs: Vec<WorkflowRun>,
    source: &RunSource,
) -> AbsorbOutcome {
    let mut outcome = AbsorbOutcome {
        received: runs.len(),
        ..Default::default()
    };
    for run in runs {
        let snapshot = run.clone();
        let upserted = tracker.upsert(run, source.clone());
        if upserted.is_new {
            outcome.added += 1;
        }
        if upserted.status_changed {
            tracing::info!(
                run_id = snapshot.id,
                status = snapshot.status.as_str(),
                "run status changed"
            );
            outcome.changed.push(snapshot);
        }
    }
    outcome
}

/// Absorb a refresh result. Runs refreshed by id keep their existing source;
/// pull-request runs carry their PR so newly pushed runs are attributed.
pub(crate) fn absorb_refresh(
    tracker: &mut Tracker,
    runs: Vec<WorkflowRun>,
    pull_request_runs: Vec<(RunSource, Vec<WorkflowRun>)>,
) -> AbsorbOutcome {
    let mut outcome = absorb_runs(tracker, runs, &RunSource::Unknown);
    for (source, found) in pull_request_runs {
        outcome.merge(absorb_runs(tracker, found, &source));
    }
    outcome
}

/// Absorb any controller event that carries runs. Failures carry none.
pub(crate) fn absorb_event(tracker: &mut Tracker, event: FetchEvent) -> Option<AbsorbOutcome> {
    match event {
        FetchEvent::Fetched { source, runs } => Some(absorb_runs(tracker, runs, &source)),
        FetchEvent::Refreshed {
            runs,
            pull_request_runs,
            ..
        } => Some(absorb_refresh(tracker, runs, pull_request_runs)),
        FetchEvent::FetchFailed { .. } => None,
    }
}

/// Every active run with a resolvable repository, plus each distinct watched
/// pull request so new runs on it are discovered.
pub(crate) fn refresh_plan(tracker: &Tracker) -> RefreshPlan {
    let mut plan = RefreshPlan::default();
    let mut seen_prs = HashSet::new();

    for tracked in tracker.visible_runs(false) {
        if matches!(tracked.source, RunSource::PullRequest { .. })
            && seen_prs.insert(&tracked.source)
        {
            plan.pull_requests.push(tracked.source.clone());
        }
        if let Some((owner, repo)) = tracked.run.owner_and_repo() {
            plan.runs.push(RefreshTarget {
                owner: owner.to_string(),
                repo: repo.to_string(),
                run_id: tracked.run.id,
            });
        }
    }
    plan
}
