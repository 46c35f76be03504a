mod export;
mod help;
mod state;

use crate::cli::{build_config, resolve_token, Cli};
use crate::github::GithubClient;
use crate::model::{FetchEvent, RunStatus, TrackedRun, WatchConfig};
use crate::orchestrator::{self, AbsorbOutcome, FetchCommand};
use crate::source::RunSource;
use crate::storage::{HistoryStore, StateStore, StorageError};
use crate::tracker::Tracker;
use anyhow::{Context, Result};
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Cell, Paragraph, Row, Table},
    Terminal,
};
use state::{Focus, StatusKind, UiState};
use std::io::{self, Write};
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Table columns: title and minimum width. Columns are dropped from the
/// right when the terminal is too narrow.
const COLUMNS: [(&str, u16); 7] = [
    ("", 2),
    ("Repo", 14),
    ("Owner", 10),
    ("Target", 12),
    ("Run", 16),
    ("Workflow", 12),
    ("Updated", 9),
];
const COLUMN_SPACING: u16 = 1;

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let client = GithubClient::new(&cfg, resolve_token(&args))
        .context("failed to build GitHub client")?;

    // Unbounded channels keep the UI thread from ever blocking on the controller.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<FetchEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<FetchCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_cfg = cfg.clone();
    let ui_handle = std::thread::spawn(move || run_threaded(args, ui_cfg, event_rx, cmd_tx));

    let res = orchestrator::run_controller(client, cfg.fetch_deadline, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Single owner of the tracker. Every mutation happens on the UI thread.
struct App {
    tracker: Tracker,
    ui: UiState,
    state_store: StateStore,
    history_store: HistoryStore,
    cmd_tx: UnboundedSender<FetchCommand>,
    poll_interval: Duration,
    input_area: Rect,
    table_area: Rect,
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    args: Cli,
    cfg: WatchConfig,
    mut event_rx: UnboundedReceiver<FetchEvent>,
    cmd_tx: UnboundedSender<FetchCommand>,
) -> Result<()> {
    let mut app = App::load(&args, &cfg, cmd_tx);

    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    for url in &args.urls {
        app.submit(url);
    }
    app.request_refresh(false);

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now()
        .checked_sub(tick_rate)
        .unwrap_or_else(Instant::now);

    let res = loop {
        // Drain events without blocking to keep UI responsive.
        while let Ok(ev) = event_rx.try_recv() {
            app.on_fetch_event(ev);
        }

        let now = Instant::now();
        app.ui.expire_status(now);
        if !app.ui.refreshing && now.duration_since(app.ui.last_refresh) >= app.poll_interval {
            app.request_refresh(true);
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| app.draw(f)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            let quit = match event::read() {
                Ok(Event::Key(k)) if k.kind == KeyEventKind::Press => app.on_key(k),
                Ok(Event::Mouse(m)) => {
                    app.on_mouse(m);
                    false
                }
                Ok(_) => false,
                Err(e) => break Err(e).context("read terminal event"),
            };
            if quit {
                break Ok(());
            }
        }
    };

    let _ = app.cmd_tx.send(FetchCommand::Quit);
    app.persist_all();

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, DisableMouseCapture, LeaveAlternateScreen).ok();
    res
}

impl App {
    fn load(args: &Cli, cfg: &WatchConfig, cmd_tx: UnboundedSender<FetchCommand>) -> Self {
        let state_store = StateStore::new(&cfg.state_path);
        let history_store = HistoryStore::new(&cfg.history_path);

        let history = history_store.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring unreadable URL history");
            Vec::new()
        });

        let mut ui = UiState::with_history(history);
        ui.bell = cfg.bell;
        ui.notify = cfg.notify;
        ui.show_archived = args.archived;

        let mut tracker = Tracker::new();
        if let Err(e) = state_store.restore_into(&mut tracker) {
            tracing::error!(error = %e, "failed to restore saved runs");
            let kept = match &e {
                StorageError::Corrupt { .. } | StorageError::UnsupportedVersion { .. } => {
                    state_store.set_aside().ok()
                }
                _ => None,
            };
            let msg = match kept {
                Some(backup) => format!(
                    "Could not load saved runs: {e} (kept as {})",
                    backup.display()
                ),
                None => format!("Could not load saved runs: {e}"),
            };
            ui.set_status(msg, StatusKind::Error);
        }

        Self {
            tracker,
            ui,
            state_store,
            history_store,
            cmd_tx,
            poll_interval: cfg.poll_interval,
            input_area: Rect::default(),
            table_area: Rect::default(),
        }
    }

    fn visible_len(&self) -> usize {
        self.tracker.visible_runs(self.ui.show_archived).len()
    }

    fn selected_run(&self) -> Option<&TrackedRun> {
        self.tracker
            .visible_runs(self.ui.show_archived)
            .get(self.ui.selected)
            .copied()
    }

    fn save_state(&mut self) {
        if let Err(e) = self.state_store.save(&self.tracker) {
            tracing::error!(error = %e, "failed to save runs");
            self.ui
                .set_status(format!("Save failed: {e}"), StatusKind::Error);
        }
    }

    fn persist_all(&self) {
        if let Err(e) = self.state_store.save(&self.tracker) {
            tracing::error!(error = %e, "failed to save runs on exit");
        }
        if let Err(e) = self.history_store.save(&self.ui.history) {
            tracing::error!(error = %e, "failed to save URL history on exit");
        }
    }

    /// Parse a URL and hand it to the controller.
    fn submit(&mut self, raw: &str) {
        let value = raw.trim();
        if value.is_empty() {
            self.ui.set_status(
                "Enter a GitHub Actions run, PR, or commit URL",
                StatusKind::Neutral,
            );
            return;
        }

        let source = match RunSource::parse(value) {
            Ok(source) => source,
            Err(e) => {
                self.ui.set_status(e.to_string(), StatusKind::Error);
                return;
            }
        };

        self.ui.record_submission(value);
        self.ui
            .set_status(format!("Watching {source} …"), StatusKind::Neutral);
        if self.cmd_tx.send(FetchCommand::Watch(source)).is_ok() {
            self.ui.pending_fetches += 1;
        }
    }

    /// Ask the controller to refresh every active run. At most one refresh
    /// is in flight at a time.
    fn request_refresh(&mut self, auto: bool) {
        self.ui.last_refresh = Instant::now();
        if self.ui.refreshing {
            if !auto {
                self.ui
                    .set_status("Refresh already in progress", StatusKind::Neutral);
            }
            return;
        }
        let plan = orchestrator::refresh_plan(&self.tracker);
        if plan.is_empty() {
            if !auto {
                self.ui.set_status("Nothing to refresh", StatusKind::Neutral);
            }
            return;
        }
        tracing::debug!(
            runs = plan.runs.len(),
            pull_requests = plan.pull_requests.len(),
            "requesting refresh"
        );
        if self.cmd_tx.send(FetchCommand::Refresh(plan)).is_ok() {
            self.ui.refreshing = true;
        }
    }

    fn on_fetch_event(&mut self, ev: FetchEvent) {
        match &ev {
            FetchEvent::Fetched { source, runs } => {
                self.ui.pending_fetches = self.ui.pending_fetches.saturating_sub(1);
                if runs.is_empty() {
                    self.ui.set_status(
                        format!("No workflow runs found for {source}"),
                        StatusKind::Neutral,
                    );
                    return;
                }
            }
            FetchEvent::FetchFailed { source, error } => {
                self.ui.pending_fetches = self.ui.pending_fetches.saturating_sub(1);
                self.ui
                    .set_status(format!("{source}: {error}"), StatusKind::Error);
                return;
            }
            FetchEvent::Refreshed { errors, .. } => {
                self.ui.refreshing = false;
                if !errors.is_empty() {
                    self.ui.set_status(errors.join("; "), StatusKind::Error);
                }
            }
        }

        if let Some(outcome) = orchestrator::absorb_event(&mut self.tracker, ev) {
            self.present(outcome);
        }
    }

    fn present(&mut self, outcome: AbsorbOutcome) {
        if outcome.added > 0 {
            self.ui.select_first();
            self.ui.set_status(
                format!("Watching {} run(s)", outcome.received),
                StatusKind::Success,
            );
        }
        if outcome.dirty() {
            self.save_state();
        }
        if !outcome.status_changed() {
            return;
        }
        if self.ui.bell {
            ring_bell();
        }
        if self.ui.notify {
            for run in &outcome.changed {
                export::notify(
                    "ghwatch",
                    &format!("{} {}: {}", run.status.glyph(), run.label(), run.status.as_str()),
                );
            }
        }
        if let [run] = outcome.changed.as_slice() {
            let kind = match run.status {
                RunStatus::Failed => StatusKind::Error,
                RunStatus::Success => StatusKind::Success,
                RunStatus::Pending => StatusKind::Neutral,
            };
            self.ui
                .set_status(format!("{} is now {}", run.label(), run.status.as_str()), kind);
        }
    }

    fn toggle_archive_selected(&mut self) {
        let Some((id, label)) = self.selected_run().map(|r| (r.id(), r.run.label())) else {
            return;
        };
        if self.tracker.is_archived(id) {
            if self.tracker.unarchive(id) {
                self.ui.show_archived = false;
                self.ui.select_first();
                self.save_state();
                self.ui
                    .set_status(format!("Restored {label}"), StatusKind::Success);
                self.request_refresh(true);
            }
        } else if self.tracker.archive(id) {
            let len = self.visible_len();
            self.ui.ensure_visible(len);
            self.save_state();
            self.ui
                .set_status(format!("Archived {label}"), StatusKind::Neutral);
        }
    }

    fn open_selected(&mut self) {
        let Some(url) = self.selected_run().map(|r| r.run.open_url().to_string()) else {
            return;
        };
        match export::open_in_browser(&url) {
            Ok(()) => self
                .ui
                .set_status(format!("Opening {url}"), StatusKind::Neutral),
            Err(e) => self.ui.set_status(format!("{e:#}"), StatusKind::Error),
        }
    }

    fn copy_selected(&mut self) {
        let Some(url) = self.selected_run().map(|r| r.run.open_url().to_string()) else {
            return;
        };
        match export::copy_to_clipboard(&url) {
            Ok(()) => self
                .ui
                .set_status(format!("✓ Copied to clipboard: {url}"), StatusKind::Success),
            Err(e) => self
                .ui
                .set_status(format!("Clipboard copy failed: {e:#}"), StatusKind::Error),
        }
    }

    /// Returns true when the app should quit.
    fn on_key(&mut self, k: KeyEvent) -> bool {
        match (k.modifiers, k.code) {
            (KeyModifiers::CONTROL, KeyCode::Char('c'))
            | (KeyModifiers::CONTROL, KeyCode::Char('d')) => return true,
            (_, KeyCode::Tab) | (_, KeyCode::BackTab) => {
                self.ui.toggle_focus();
                return false;
            }
            (_, KeyCode::Esc) => {
                self.ui.show_help = false;
                self.ui.focus = Focus::Table;
                return false;
            }
            _ => {}
        }

        if self.ui.focus == Focus::Input {
            match k.code {
                KeyCode::Enter => {
                    let value = self.ui.input.clone();
                    self.submit(&value);
                }
                KeyCode::Up => self.ui.history_up(),
                KeyCode::Down => self.ui.history_down(),
                KeyCode::Backspace => {
                    self.ui.input.pop();
                }
                KeyCode::Char(c) if !k.modifiers.contains(KeyModifiers::CONTROL) => {
                    self.ui.push_input(c);
                }
                _ => {}
            }
            return false;
        }

        let len = self.visible_len();
        match k.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('?') => self.ui.show_help = !self.ui.show_help,
            KeyCode::Char('j') | KeyCode::Down => self.ui.move_selection(1, len),
            KeyCode::Char('k') | KeyCode::Up => self.ui.move_selection(-1, len),
            KeyCode::PageDown => self.ui.move_selection(self.ui.page(), len),
            KeyCode::PageUp => self.ui.move_selection(-self.ui.page(), len),
            KeyCode::Char('g') | KeyCode::Home => self.ui.select_first(),
            KeyCode::Char('G') | KeyCode::End => self.ui.select_last(len),
            KeyCode::Char('o') | KeyCode::Enter => self.open_selected(),
            KeyCode::Char('y') => self.copy_selected(),
            KeyCode::Char('a') => self.toggle_archive_selected(),
            KeyCode::Char('A') => {
                self.ui.show_archived = !self.ui.show_archived;
                self.ui.select_first();
                let view = if self.ui.show_archived { "archived" } else { "active" };
                self.ui
                    .set_status(format!("Viewing {view} runs"), StatusKind::Neutral);
            }
            KeyCode::Char('b') => {
                self.ui.bell = !self.ui.bell;
                if self.ui.bell {
                    self.ui.set_status("Bell enabled", StatusKind::Success);
                } else {
                    self.ui.set_status("Bell muted", StatusKind::Neutral);
                }
            }
            KeyCode::Char('r') => self.request_refresh(false),
            _ => {}
        }
        false
    }

    fn on_mouse(&mut self, m: MouseEvent) {
        let len = self.visible_len();
        match m.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                if let Some(row) = table_data_row(self.table_area, m.row) {
                    if self.ui.select_visible_row(row, len) {
                        self.ui.focus = Focus::Table;
                    }
                } else if row_in(self.input_area, m.row) {
                    self.ui.focus = Focus::Input;
                }
            }
            MouseEventKind::ScrollUp => self.ui.move_selection(-1, len),
            MouseEventKind::ScrollDown => self.ui.move_selection(1, len),
            _ => {}
        }
    }

    fn draw(&mut self, f: &mut ratatui::Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(1),
                Constraint::Min(5),
                Constraint::Length(1),
            ])
            .split(f.area());

        self.input_area = chunks[0];
        self.table_area = chunks[2];
        // Borders and header row.
        self.ui.table_rows = (chunks[2].height as usize).saturating_sub(3).max(1);
        let len = self.visible_len();
        self.ui.ensure_visible(len);

        self.draw_input(chunks[0], f);
        f.render_widget(Paragraph::new(self.hint_line()), chunks[1]);
        self.draw_table(chunks[2], f);
        f.render_widget(Paragraph::new(self.status_line()), chunks[3]);

        if self.ui.show_help {
            help::draw_help(centered(chunks[2], 60, 22), f);
        }
    }

    fn draw_input(&self, area: Rect, f: &mut ratatui::Frame) {
        let focused = self.ui.focus == Focus::Input;
        let border = if focused { Color::LightBlue } else { Color::DarkGray };
        let text = if self.ui.input.is_empty() && !focused {
            Line::from(Span::styled(
                "Paste a GitHub run, PR, or commit URL (tab to focus)",
                Style::default().fg(Color::DarkGray),
            ))
        } else if focused {
            Line::from(vec![
                Span::raw(self.ui.input.clone()),
                Span::styled("▏", Style::default().fg(Color::LightBlue)),
            ])
        } else {
            Line::from(self.ui.input.clone())
        };

        // Keep the end of long input visible.
        let inner_width = area.width.saturating_sub(2) as usize;
        let overflow = self.ui.input.chars().count().saturating_sub(inner_width.saturating_sub(1));
        let p = Paragraph::new(text).scroll((0, overflow as u16)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(border))
                .title("ghwatch"),
        );
        f.render_widget(p, area);
    }

    fn hint_line(&self) -> Line<'static> {
        let mut line = help::key_hint();
        let view = if self.ui.show_archived { "archived" } else { "active" };
        let bell = if self.ui.bell { "🔔" } else { "🔕" };
        line.spans.push(Span::styled(
            format!("   view: {view} • bell: {bell}"),
            Style::default().fg(Color::Gray),
        ));
        line
    }

    fn status_line(&self) -> Line<'static> {
        let mut spans = Vec::new();
        match &self.ui.status {
            Some(status) => {
                let color = match status.kind {
                    StatusKind::Neutral => Color::Reset,
                    StatusKind::Success => Color::LightGreen,
                    StatusKind::Error => Color::LightRed,
                };
                spans.push(Span::styled(status.text.clone(), Style::default().fg(color)));
            }
            None if self.ui.pending_fetches > 0 => {
                spans.push(Span::raw("Fetching workflow runs…"));
            }
            None => {}
        }
        if self.ui.refreshing {
            if !spans.is_empty() {
                spans.push(Span::raw("   "));
            }
            spans.push(Span::styled("auto-refresh …", Style::default().fg(Color::Gray)));
        }
        Line::from(spans)
    }

    fn draw_table(&self, area: Rect, f: &mut ratatui::Frame) {
        let runs = self.tracker.visible_runs(self.ui.show_archived);
        let shown = visible_columns(area.width.saturating_sub(2));
        let now = OffsetDateTime::now_utc();

        let header = Row::new(COLUMNS[..shown].iter().map(|(title, _)| Cell::from(*title)))
            .style(
                Style::default()
                    .fg(Color::Gray)
                    .add_modifier(Modifier::BOLD),
            );

        let table_focused = self.ui.focus == Focus::Table;
        let rows: Vec<Row> = runs
            .iter()
            .enumerate()
            .skip(self.ui.scroll_offset)
            .take(self.ui.table_rows)
            .map(|(idx, tracked)| {
                let cells = row_cells(tracked, now);
                let mut row = Row::new(cells.into_iter().take(shown).map(Cell::from));
                if table_focused && idx == self.ui.selected {
                    row = row.style(Style::default().bg(Color::Indexed(57)).fg(Color::White));
                }
                row
            })
            .collect();

        let widths: Vec<Constraint> = COLUMNS[..shown]
            .iter()
            .enumerate()
            .map(|(i, (_, min))| {
                if i == 0 {
                    Constraint::Length(*min)
                } else {
                    Constraint::Min(*min)
                }
            })
            .collect();

        let (which, count, other, other_count) = if self.ui.show_archived {
            ("Archived", self.tracker.len_archived(), "active", self.tracker.len_active())
        } else {
            ("Active", self.tracker.len_active(), "archived", self.tracker.len_archived())
        };
        let title = format!("{which} runs ({count}) • {other} {other_count}");

        let table = Table::new(rows, widths)
            .header(header)
            .column_spacing(COLUMN_SPACING)
            .block(Block::default().borders(Borders::ALL).title(title));
        f.render_widget(table, area);

        if runs.is_empty() {
            let hint = if self.ui.show_archived {
                "No archived runs."
            } else {
                "No runs yet. Press tab and paste a URL."
            };
            let inner = Rect {
                x: area.x + 2,
                y: area.y + 2,
                width: area.width.saturating_sub(4),
                height: 1.min(area.height.saturating_sub(3)),
            };
            f.render_widget(
                Paragraph::new(Span::styled(hint, Style::default().fg(Color::DarkGray))),
                inner,
            );
        }
    }
}

fn row_cells(tracked: &TrackedRun, now: OffsetDateTime) -> Vec<String> {
    let run = &tracked.run;
    let (owner, repo) = run.owner_and_repo().unwrap_or(("", &run.repo_full_name));
    vec![
        run.status.glyph().to_string(),
        repo.to_string(),
        owner.to_string(),
        run.target.clone(),
        run.name.clone(),
        run.workflow_name.clone(),
        crate::text_summary::updated_ago(tracked, now),
    ]
}

/// How many leading columns fit in `width`.
fn visible_columns(width: u16) -> usize {
    let mut used = 0u16;
    for (i, (_, min)) in COLUMNS.iter().enumerate() {
        let gap = if i == 0 { 0 } else { COLUMN_SPACING };
        used = used.saturating_add(gap + min);
        if used > width {
            return i.max(1);
        }
    }
    COLUMNS.len()
}

fn row_in(area: Rect, row: u16) -> bool {
    row >= area.y && row < area.y + area.height
}

/// Data row index under a click, skipping the border and header.
fn table_data_row(area: Rect, row: u16) -> Option<usize> {
    let first = area.y + 2;
    let last = (area.y + area.height).saturating_sub(1);
    (row >= first && row < last).then(|| (row - first) as usize)
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn ring_bell() {
    let mut out = io::stdout();
    let _ = out.write_all(b"\x07");
    let _ = out.flush();
}
