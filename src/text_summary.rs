//! Text summary builder for CLI output.
//!
//! Formats tracked runs as human-readable lines for text mode and shares the
//! relative-age helper with the TUI table.

use crate::model::TrackedRun;
use crate::source::short_sha;
use time::OffsetDateTime;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// "just now", "42s ago", "5m ago", "3h ago", "2d ago".
pub(crate) fn humanize_ago(then: OffsetDateTime, now: OffsetDateTime) -> String {
    let secs = (now - then).whole_seconds();
    if secs < 1 {
        return "just now".into();
    }
    match secs {
        s if s < 60 => format!("{s}s ago"),
        s if s < 3_600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3_600),
        s => format!("{}d ago", s / 86_400),
    }
}

/// Relative age of the last update, or `-` when GitHub reported none.
pub(crate) fn updated_ago(run: &TrackedRun, now: OffsetDateTime) -> String {
    run.run
        .last_updated_at
        .map(|t| humanize_ago(t, now))
        .unwrap_or_else(|| "-".into())
}

/// Build one line per run plus a trailing count line.
pub(crate) fn build_text_summary(
    runs: &[&TrackedRun],
    archived: bool,
    now: OffsetDateTime,
) -> TextSummary {
    let mut lines = Vec::with_capacity(runs.len() + 1);

    for tracked in runs {
        let run = &tracked.run;
        let mut line = format!(
            "{} {:<7} {} {} #{} {}",
            run.status.glyph(),
            run.status.as_str(),
            run.label(),
            run.name,
            run.id,
            updated_ago(tracked, now),
        );
        if !run.head_sha.is_empty() {
            line.push_str(&format!(" @{}", short_sha(&run.head_sha)));
        }
        if !run.status_detail.is_empty() {
            line.push_str(&format!(" ({})", run.status_detail));
        }
        line.push_str(&format!("\n    {}", run.open_url()));
        lines.push(line);
    }

    let which = if archived { "archived" } else { "active" };
    lines.push(format!("{} {which} run(s)", runs.len()));
    TextSummary { lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RunStatus, WorkflowRun};
    use crate::source::RunSource;
    use time::Duration;

    #[test]
    fn humanize_ago_buckets() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(humanize_ago(now, now), "just now");
        assert_eq!(humanize_ago(now + Duration::seconds(5), now), "just now");
        assert_eq!(humanize_ago(now - Duration::seconds(42), now), "42s ago");
        assert_eq!(humanize_ago(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(humanize_ago(now - Duration::hours(3), now), "3h ago");
        assert_eq!(humanize_ago(now - Duration::days(2), now), "2d ago");
    }

    #[test]
    fn summary_lists_runs_and_count() {
        let now = OffsetDateTime::now_utc();
        let tracked = TrackedRun {
            run: WorkflowRun {
                id: 9,
                name: "CI".into(),
                repo_full_name: "octo/widgets".into(),
                status: RunStatus::Failed,
                status_detail: "failure".into(),
                html_url: "https://github.com/octo/widgets/actions/runs/9".into(),
                head_sha: "0123456789abcdef".into(),
                last_updated_at: Some(now - Duration::minutes(2)),
                ..Default::default()
            },
            source: RunSource::Unknown,
            added_at: now,
            archived_at: None,
        };

        let summary = build_text_summary(&[&tracked], false, now);
        assert_eq!(summary.lines.len(), 2);
        assert!(summary.lines[0].contains("octo/widgets"));
        assert!(summary.lines[0].contains("#9 2m ago @0123456"));
        assert!(summary.lines[0].contains("(failure)"));
        assert!(summary.lines[0].ends_with("https://github.com/octo/widgets/actions/runs/9"));
        assert_eq!(summary.lines[1], "1 active run(s)");

        let empty = build_text_summary(&[], true, now);
        assert_eq!(empty.lines, vec!["0 archived run(s)".to_string()]);
    }
}
