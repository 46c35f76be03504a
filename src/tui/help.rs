use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

const KEYBINDS: &[(&str, &str)] = &[
    ("tab", "Switch between URL input and runs"),
    ("esc", "Back to the runs table"),
    ("enter", "Watch the URL in the input"),
    ("↑/↓", "Walk URL history (input)"),
    ("j/k ↑/↓", "Move selection"),
    ("PgUp/PgDn", "Page up / down"),
    ("g/G", "First / last run"),
    ("o enter", "Open run or PR in browser"),
    ("a", "Archive / restore selected run"),
    ("A", "Toggle archived view"),
    ("r", "Refresh now"),
    ("y", "Copy run URL to clipboard"),
    ("b", "Toggle bell"),
    ("?", "Toggle this help"),
    ("q / Ctrl-C", "Quit"),
];

fn key_line(key: &str, desc: &str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(format!("{key:<12}"), Style::default().fg(Color::Magenta)),
        Span::raw(desc.to_string()),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let mut lines = vec![Line::from("Keybinds:")];
    lines.extend(KEYBINDS.iter().map(|(k, d)| key_line(k, d)));
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("Mouse: ", Style::default().fg(Color::Gray)),
        Span::raw("click a row to select, click the input to type, wheel scrolls"),
    ]));

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(Clear, area);
    f.render_widget(p, area);
}

/// One-line hint shown under the input box.
pub fn key_hint() -> Line<'static> {
    let keys = [
        ("tab", "focus"),
        ("enter/o", "open"),
        ("a", "archive"),
        ("A", "archived"),
        ("r", "refresh"),
        ("b", "bell"),
        ("?", "help"),
        ("q", "quit"),
    ];
    let mut spans = Vec::with_capacity(keys.len() * 3);
    for (i, (key, what)) in keys.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw("  "));
        }
        spans.push(Span::styled(*key, Style::default().fg(Color::Magenta)));
        spans.push(Span::styled(format!(" {what}"), Style::default().fg(Color::Gray)));
    }
    Line::from(spans)
}
