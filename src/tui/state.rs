use std::time::{Duration, Instant};

/// How long a status message stays on screen.
pub const STATUS_TTL: Duration = Duration::from_secs(10);

/// Longest URL accepted by the input box.
pub const INPUT_LIMIT: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    Table,
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Neutral,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub text: String,
    pub kind: StatusKind,
    pub expires: Instant,
}

/// Everything the UI thread tracks besides the run catalog itself.
pub struct UiState {
    pub focus: Focus,
    pub input: String,
    pub show_archived: bool,
    pub show_help: bool,
    pub bell: bool,
    pub notify: bool,

    pub selected: usize,
    pub scroll_offset: usize,
    /// Data rows that fit in the table, updated on every draw.
    pub table_rows: usize,

    pub status: Option<StatusMessage>,
    pub pending_fetches: usize,
    pub refreshing: bool,
    pub last_refresh: Instant,

    // Submitted URL history, oldest first; `history_index == len` means the draft.
    pub history: Vec<String>,
    pub history_index: usize,
    pub draft: String,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            focus: Focus::Table,
            input: String::new(),
            show_archived: false,
            show_help: false,
            bell: true,
            notify: false,
            selected: 0,
            scroll_offset: 0,
            table_rows: 10,
            status: None,
            pending_fetches: 0,
            refreshing: false,
            last_refresh: Instant::now(),
            history: Vec::new(),
            history_index: 0,
            draft: String::new(),
        }
    }
}

impl UiState {
    pub fn with_history(history: Vec<String>) -> Self {
        let history_index = history.len();
        Self {
            history,
            history_index,
            ..Default::default()
        }
    }

    pub fn set_status(&mut self, text: impl Into<String>, kind: StatusKind) {
        let text = text.into();
        if text.is_empty() {
            self.status = None;
            return;
        }
        self.status = Some(StatusMessage {
            text,
            kind,
            expires: Instant::now() + STATUS_TTL,
        });
    }

    pub fn expire_status(&mut self, now: Instant) {
        if self.status.as_ref().is_some_and(|s| now >= s.expires) {
            self.status = None;
        }
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Table => Focus::Input,
            Focus::Input => Focus::Table,
        };
    }

    pub fn push_input(&mut self, c: char) {
        if self.input.chars().count() < INPUT_LIMIT {
            self.input.push(c);
        }
    }

    /// Record a submitted URL unless it repeats the most recent entry, then
    /// reset navigation to the empty draft.
    pub fn record_submission(&mut self, value: &str) {
        if self.history.last().map(String::as_str) != Some(value) {
            self.history.push(value.to_string());
        }
        self.history_index = self.history.len();
        self.draft.clear();
        self.input.clear();
    }

    pub fn history_up(&mut self) {
        if self.history.is_empty() {
            return;
        }
        if self.history_index == self.history.len() {
            self.draft = self.input.clone();
        }
        if self.history_index > 0 {
            self.history_index -= 1;
            self.input = self.history[self.history_index].clone();
        }
    }

    pub fn history_down(&mut self) {
        if self.history_index >= self.history.len() {
            return;
        }
        self.history_index += 1;
        self.input = if self.history_index == self.history.len() {
            self.draft.clone()
        } else {
            self.history[self.history_index].clone()
        };
    }

    /// Move the selection by `delta` rows within `len` visible runs.
    pub fn move_selection(&mut self, delta: isize, len: usize) {
        if len == 0 {
            self.selected = 0;
            self.scroll_offset = 0;
            return;
        }
        let target = self.selected as isize + delta;
        self.selected = target.clamp(0, len as isize - 1) as usize;
        self.ensure_visible(len);
    }

    pub fn select_first(&mut self) {
        self.selected = 0;
        self.scroll_offset = 0;
    }

    pub fn select_last(&mut self, len: usize) {
        self.selected = len.saturating_sub(1);
        self.ensure_visible(len);
    }

    /// Select the row at `row` within the visible window, if it exists.
    pub fn select_visible_row(&mut self, row: usize, len: usize) -> bool {
        let index = self.scroll_offset + row;
        if index >= len {
            return false;
        }
        self.selected = index;
        self.ensure_visible(len);
        true
    }

    /// Keep the selection inside `len` runs and the window on the selection.
    pub fn ensure_visible(&mut self, len: usize) {
        if len == 0 {
            self.selected = 0;
            self.scroll_offset = 0;
            return;
        }
        self.selected = self.selected.min(len - 1);
        let rows = self.table_rows.max(1);
        if self.selected < self.scroll_offset {
            self.scroll_offset = self.selected;
        }
        if self.selected >= self.scroll_offset + rows {
            self.scroll_offset = self.selected + 1 - rows;
        }
        self.scroll_offset = self.scroll_offset.min(len.saturating_sub(rows));
    }

    pub fn page(&self) -> isize {
        self.table_rows.max(1) as isize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_expires_after_ttl() {
        let mut state = UiState::default();
        state.set_status("hello", StatusKind::Neutral);
        let expires = state.status.as_ref().unwrap().expires;

        state.expire_status(expires - Duration::from_millis(1));
        assert!(state.status.is_some());
        state.expire_status(expires);
        assert!(state.status.is_none());

        state.set_status("x", StatusKind::Error);
        state.set_status("", StatusKind::Error);
        assert!(state.status.is_none());
    }

    #[test]
    fn history_walks_and_restores_draft() {
        let mut state = UiState::with_history(vec!["a".into(), "b".into()]);
        state.input = "draft".into();

        state.history_up();
        assert_eq!(state.input, "b");
        state.history_up();
        assert_eq!(state.input, "a");
        state.history_up();
        assert_eq!(state.input, "a");

        state.history_down();
        assert_eq!(state.input, "b");
        state.history_down();
        assert_eq!(state.input, "draft");
        state.history_down();
        assert_eq!(state.input, "draft");
    }

    #[test]
    fn submissions_skip_immediate_repeats() {
        let mut state = UiState::default();
        state.history_up();
        assert!(state.input.is_empty());

        state.record_submission("u1");
        state.record_submission("u1");
        state.record_submission("u2");
        state.record_submission("u1");
        assert_eq!(state.history, vec!["u1", "u2", "u1"]);
        assert_eq!(state.history_index, 3);
        assert!(state.input.is_empty());
    }

    #[test]
    fn input_is_capped() {
        let mut state = UiState::default();
        for _ in 0..(INPUT_LIMIT + 10) {
            state.push_input('x');
        }
        assert_eq!(state.input.len(), INPUT_LIMIT);
    }

    #[test]
    fn selection_clamps_and_scrolls() {
        let mut state = UiState {
            table_rows: 3,
            ..Default::default()
        };

        state.move_selection(-1, 10);
        assert_eq!(state.selected, 0);

        state.move_selection(4, 10);
        assert_eq!(state.selected, 4);
        assert_eq!(state.scroll_offset, 2);

        state.move_selection(100, 10);
        assert_eq!(state.selected, 9);
        assert_eq!(state.scroll_offset, 7);

        state.move_selection(-state.page(), 10);
        assert_eq!(state.selected, 6);
        assert_eq!(state.scroll_offset, 6);

        state.select_first();
        assert_eq!((state.selected, state.scroll_offset), (0, 0));

        state.select_last(10);
        assert_eq!((state.selected, state.scroll_offset), (9, 7));

        // Catalog shrank underneath the selection.
        state.ensure_visible(2);
        assert_eq!((state.selected, state.scroll_offset), (1, 0));

        state.move_selection(1, 0);
        assert_eq!((state.selected, state.scroll_offset), (0, 0));
    }

    #[test]
    fn clicking_selects_only_existing_rows() {
        let mut state = UiState {
            table_rows: 5,
            ..Default::default()
        };
        assert!(state.select_visible_row(2, 4));
        assert_eq!(state.selected, 2);
        assert!(!state.select_visible_row(4, 4));
        assert_eq!(state.selected, 2);
    }

    #[test]
    fn focus_toggles() {
        let mut state = UiState::default();
        assert_eq!(state.focus, Focus::Table);
        state.toggle_focus();
        assert_eq!(state.focus, Focus::Input);
        state.toggle_focus();
        assert_eq!(state.focus, Focus::Table);
    }
}
