use crate::source::RunSource;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use time::OffsetDateTime;

/// Stable GitHub workflow run identifier.
pub type RunId = u64;

/// Settings resolved once from the command line and handed to the
/// fetcher, persistence and UI layers.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub api_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub fetch_deadline: Duration,
    pub bell: bool,
    pub notify: bool,
    pub state_path: PathBuf,
    pub history_path: PathBuf,
    pub user_agent: String,
}

/// Simplified workflow state shown in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

impl RunStatus {
    /// Collapse GitHub's `status`/`conclusion` pair into three states.
    pub fn summarize(status: &str, conclusion: &str) -> Self {
        match status {
            "queued" | "in_progress" | "waiting" | "requested" | "pending" => RunStatus::Pending,
            "completed" => match conclusion {
                "success" => RunStatus::Success,
                "failure" | "timed_out" | "cancelled" | "startup_failure" | "stale" => {
                    RunStatus::Failed
                }
                _ => RunStatus::Pending,
            },
            _ => RunStatus::Pending,
        }
    }

    pub fn glyph(self) -> &'static str {
        match self {
            RunStatus::Pending => "⏳",
            RunStatus::Success => "✅",
            RunStatus::Failed => "❌",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

/// Normalized view of one workflow run, produced by the fetcher and
/// stored by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WorkflowRun {
    pub id: RunId,
    pub name: String,
    #[serde(default)]
    pub workflow_name: String,
    pub repo_full_name: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub target_url: String,
    pub status: RunStatus,
    #[serde(default)]
    pub status_detail: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub head_branch: String,
    #[serde(default)]
    pub head_sha: String,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub pr_number: Option<u64>,
    #[serde(default)]
    pub pr_url: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_updated_at: Option<OffsetDateTime>,
}

impl WorkflowRun {
    /// Split `owner/repo`. Returns `None` unless there are exactly two parts.
    pub fn owner_and_repo(&self) -> Option<(&str, &str)> {
        let mut parts = self.repo_full_name.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
                Some((owner, repo))
            }
            _ => None,
        }
    }

    /// The page a user most likely wants: the PR if there is one, else the run.
    pub fn open_url(&self) -> &str {
        match self.pr_url.as_deref() {
            Some(url) if !url.is_empty() => url,
            _ => &self.html_url,
        }
    }

    pub fn label(&self) -> String {
        if self.target.is_empty() {
            self.repo_full_name.clone()
        } else {
            format!("{} • {}", self.repo_full_name, self.target)
        }
    }
}

/// One run under observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedRun {
    pub run: WorkflowRun,
    #[serde(default)]
    pub source: RunSource,
    #[serde(with = "time::serde::rfc3339")]
    pub added_at: OffsetDateTime,
    /// Only meaningful while the run sits in the archived catalog.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub archived_at: Option<OffsetDateTime>,
}

impl TrackedRun {
    pub fn id(&self) -> RunId {
        self.run.id
    }
}

/// Identifies a run to re-fetch by id during a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTarget {
    pub owner: String,
    pub repo: String,
    pub run_id: RunId,
}

/// Everything a refresh cycle needs to re-fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshPlan {
    pub runs: Vec<RefreshTarget>,
    pub pull_requests: Vec<RunSource>,
}

impl RefreshPlan {
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty() && self.pull_requests.is_empty()
    }
}

/// Results emitted by the fetch controller and consumed by the tracker owner.
#[derive(Debug, Clone)]
pub enum FetchEvent {
    Fetched {
        source: RunSource,
        runs: Vec<WorkflowRun>,
    },
    FetchFailed {
        source: RunSource,
        error: String,
    },
    Refreshed {
        runs: Vec<WorkflowRun>,
        pull_request_runs: Vec<(RunSource, Vec<WorkflowRun>)>,
        errors: Vec<String>,
    },
}
