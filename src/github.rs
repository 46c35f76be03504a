//! GitHub REST client producing normalized [`WorkflowRun`] records.

use crate::model::{RunId, RunStatus, WatchConfig, WorkflowRun};
use crate::source::{short_sha, RunSource};
use reqwest::{header, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;

const ERROR_BODY_LIMIT: usize = 4 << 10;

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("github api error ({status}): {message}")]
    Api { status: StatusCode, message: String },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unsupported GitHub URL")]
    UnsupportedSource,
}

#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(cfg: &WatchConfig, token: Option<String>) -> Result<Self, GithubError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            header::HeaderValue::from_static("2022-11-28"),
        );
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .default_headers(headers)
            .timeout(cfg.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.api_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    /// Fetch every run the source points at.
    pub async fn fetch_source(&self, source: &RunSource) -> Result<Vec<WorkflowRun>, GithubError> {
        match source {
            RunSource::WorkflowRun {
                owner,
                repo,
                run_id,
            } => Ok(vec![self.workflow_run(owner, repo, *run_id).await?]),
            RunSource::PullRequest {
                owner,
                repo,
                number,
            } => self.runs_for_pull_request(owner, repo, *number).await,
            RunSource::Commit { owner, repo, sha } => self.runs_for_commit(owner, repo, sha).await,
            RunSource::Unknown => Err(GithubError::UnsupportedSource),
        }
    }

    pub async fn workflow_run(
        &self,
        owner: &str,
        repo: &str,
        run_id: RunId,
    ) -> Result<WorkflowRun, GithubError> {
        let path = format!("/repos/{owner}/{repo}/actions/runs/{run_id}");
        let payload: WorkflowRunPayload = self.get_json(&path, &[]).await?;
        let mut run = convert_run(payload);
        if run.repo_full_name.is_empty() {
            run.repo_full_name = format!("{owner}/{repo}");
        }
        Ok(run)
    }

    pub async fn runs_for_commit(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<Vec<WorkflowRun>, GithubError> {
        let path = format!("/repos/{owner}/{repo}/actions/runs");
        let payload: WorkflowRunsResponse = self
            .get_json(&path, &[("per_page", "30"), ("head_sha", sha)])
            .await?;
        Ok(label_commit_runs(payload.workflow_runs, owner, repo, sha))
    }

    /// Resolve the PR head commit, then list its runs labelled with the PR.
    pub async fn runs_for_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<WorkflowRun>, GithubError> {
        let path = format!("/repos/{owner}/{repo}/pulls/{number}");
        let pr: PullRequestPayload = self.get_json(&path, &[]).await?;
        let runs = self.runs_for_commit(owner, repo, &pr.head.sha).await?;
        Ok(label_pull_request_runs(runs, owner, repo, number))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, GithubError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.get(&url).query(query);
        if let Some(token) = self.token.as_deref() {
            req = req.bearer_auth(token);
        }

        tracing::debug!(%url, "github request");
        let res = req.send().await?;
        let status = res.status();
        if status.is_client_error() || status.is_server_error() {
            let body = res.text().await.unwrap_or_default();
            let message = truncate_body(body.trim());
            tracing::debug!(%url, %status, "github request failed");
            if status == StatusCode::NOT_FOUND {
                return Err(GithubError::NotFound(message));
            }
            return Err(GithubError::Api { status, message });
        }
        Ok(res.json::<T>().await?)
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= ERROR_BODY_LIMIT {
        return body.to_string();
    }
    let mut end = ERROR_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

fn label_commit_runs(
    payload: Vec<WorkflowRunPayload>,
    owner: &str,
    repo: &str,
    sha: &str,
) -> Vec<WorkflowRun> {
    let commit_url = format!("https://github.com/{owner}/{repo}/commit/{sha}");
    payload
        .into_iter()
        .map(|item| {
            let mut run = convert_run(item);
            run.target = format!("commit {}", short_sha(sha));
            if run.target_url.is_empty() {
                run.target_url = commit_url.clone();
            }
            if run.repo_full_name.is_empty() {
                run.repo_full_name = format!("{owner}/{repo}");
            }
            run
        })
        .collect()
}

fn label_pull_request_runs(
    runs: Vec<WorkflowRun>,
    owner: &str,
    repo: &str,
    number: u64,
) -> Vec<WorkflowRun> {
    let pr_url = format!("https://github.com/{owner}/{repo}/pull/{number}");
    runs.into_iter()
        .map(|mut run| {
            run.target = format!("PR #{number}");
            run.target_url = pr_url.clone();
            run.pr_number = Some(number);
            run.pr_url = Some(pr_url.clone());
            run
        })
        .collect()
}

fn first_non_empty<'a>(values: &[&'a str]) -> &'a str {
    values
        .iter()
        .copied()
        .find(|v| !v.trim().is_empty())
        .unwrap_or("")
}

/// Map a REST payload to the normalized record.
fn convert_run(payload: WorkflowRunPayload) -> WorkflowRun {
    let status = payload.status.as_deref().unwrap_or("");
    let conclusion = payload.conclusion.as_deref().unwrap_or("");
    let workflow_name = payload.name.clone().unwrap_or_default();

    let mut name = first_non_empty(&[
        payload.display_title.as_deref().unwrap_or(""),
        &workflow_name,
    ])
    .to_string();
    if name.is_empty() {
        name = format!("Run {}", payload.id);
    }

    let head_branch = payload.head_branch.unwrap_or_default();
    let event = payload.event.unwrap_or_default();
    let html_url = payload.html_url.unwrap_or_default();

    let mut run = WorkflowRun {
        id: payload.id,
        name,
        workflow_name,
        repo_full_name: payload
            .repository
            .and_then(|r| r.full_name)
            .unwrap_or_default(),
        target: String::new(),
        target_url: String::new(),
        status: RunStatus::summarize(status, conclusion),
        status_detail: status_detail(status, conclusion),
        html_url: html_url.clone(),
        head_branch: head_branch.clone(),
        head_sha: payload.head_sha.unwrap_or_default(),
        event: event.clone(),
        pr_number: None,
        pr_url: None,
        last_updated_at: payload.updated_at,
    };

    if let Some(pr) = payload.pull_requests.into_iter().next() {
        run.target = format!("PR #{}", pr.number);
        run.target_url = pr.html_url.clone().unwrap_or_default();
        run.pr_number = Some(pr.number);
        run.pr_url = pr.html_url;
    }
    if run.target.is_empty() {
        run.target = first_non_empty(&[&head_branch, &event, "unknown"]).to_string();
    }
    if run.target_url.is_empty() {
        run.target_url = html_url;
    }
    run
}

fn status_detail(status: &str, conclusion: &str) -> String {
    let status = if status.is_empty() { "unknown" } else { status };
    if conclusion.is_empty() {
        status.to_string()
    } else {
        format!("{status}/{conclusion}")
    }
}

#[derive(Debug, Deserialize)]
struct WorkflowRunsResponse {
    #[serde(default)]
    workflow_runs: Vec<WorkflowRunPayload>,
}

#[derive(Debug, Deserialize)]
struct WorkflowRunPayload {
    id: RunId,
    name: Option<String>,
    display_title: Option<String>,
    event: Option<String>,
    status: Option<String>,
    conclusion: Option<String>,
    html_url: Option<String>,
    head_branch: Option<String>,
    head_sha: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    updated_at: Option<OffsetDateTime>,
    #[serde(default)]
    pull_requests: Vec<PullRequestRef>,
    repository: Option<RepositoryRef>,
}

#[derive(Debug, Deserialize)]
struct RepositoryRef {
    full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PullRequestRef {
    number: u64,
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PullRequestPayload {
    head: HeadRef,
}

#[derive(Debug, Deserialize)]
struct HeadRef {
    sha: String,
}
