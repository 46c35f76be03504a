//! What the user asked to watch: a workflow run, a pull request or a commit.

use crate::model::RunId;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Parsed identity of a watched GitHub URL, retained so runs can be re-fetched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunSource {
    #[default]
    Unknown,
    WorkflowRun {
        owner: String,
        repo: String,
        run_id: RunId,
    },
    PullRequest {
        owner: String,
        repo: String,
        number: u64,
    },
    Commit {
        owner: String,
        repo: String,
        sha: String,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceParseError {
    #[error("empty URL")]
    Empty,
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("only github.com URLs are supported")]
    UnsupportedHost,
    #[error("URL must include owner and repo")]
    MissingRepo,
    #[error("workflow run URL missing ID")]
    MissingRunId,
    #[error("invalid run id: {0}")]
    InvalidRunId(String),
    #[error("invalid pull request number: {0}")]
    InvalidPullNumber(String),
    #[error("invalid commit SHA")]
    InvalidSha,
    #[error("unsupported GitHub URL path: {0}")]
    UnsupportedPath(String),
}

impl RunSource {
    /// Parse a github.com URL pointing at a workflow run, a pull request or a commit.
    pub fn parse(raw: &str) -> Result<Self, SourceParseError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SourceParseError::Empty);
        }

        let url = Url::parse(raw).map_err(|e| SourceParseError::InvalidUrl(e.to_string()))?;
        match url.host_str() {
            Some("github.com") | Some("www.github.com") => {}
            _ => return Err(SourceParseError::UnsupportedHost),
        }

        let segments: Vec<&str> = url.path().split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() < 2 {
            return Err(SourceParseError::MissingRepo);
        }
        let owner = segments[0].to_string();
        let repo = segments[1].to_string();

        match segments.get(2..).unwrap_or_default() {
            ["actions", "runs", id, ..] => {
                let run_id = id
                    .parse::<RunId>()
                    .map_err(|e| SourceParseError::InvalidRunId(e.to_string()))?;
                Ok(RunSource::WorkflowRun {
                    owner,
                    repo,
                    run_id,
                })
            }
            ["actions", "runs"] => Err(SourceParseError::MissingRunId),
            ["pull", number, ..] => {
                let number = number
                    .parse::<u64>()
                    .map_err(|e| SourceParseError::InvalidPullNumber(e.to_string()))?;
                Ok(RunSource::PullRequest {
                    owner,
                    repo,
                    number,
                })
            }
            ["commit", sha, ..] => {
                if sha.len() < 7 {
                    return Err(SourceParseError::InvalidSha);
                }
                Ok(RunSource::Commit {
                    owner,
                    repo,
                    sha: sha.to_string(),
                })
            }
            _ => Err(SourceParseError::UnsupportedPath(segments.join("/"))),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, RunSource::Unknown)
    }
}

impl fmt::Display for RunSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunSource::WorkflowRun {
                owner,
                repo,
                run_id,
            } => write!(f, "{owner}/{repo} run {run_id}"),
            RunSource::PullRequest {
                owner,
                repo,
                number,
            } => write!(f, "{owner}/{repo} PR #{number}"),
            RunSource::Commit { owner, repo, sha } => {
                write!(f, "{owner}/{repo} commit {}", short_sha(sha))
            }
            RunSource::Unknown => f.write_str("unknown"),
        }
    }
}

pub fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}
