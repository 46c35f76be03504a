//! Hand-offs to the desktop: clipboard, browser and notifications.

use anyhow::{Context, Result};
use std::process::{Command, Stdio};
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;

// Global clipboard manager channel - initialized once on first use
static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

/// Initialize the clipboard manager thread if not already initialized.
/// Each copy keeps its clipboard instance alive long enough for clipboard
/// managers on Linux to read the contents.
fn init_clipboard_manager() -> Result<&'static std_mpsc::Sender<String>> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();

        std::thread::spawn(move || {
            use arboard::Clipboard;

            for text in rx {
                match Clipboard::new() {
                    Ok(mut clipboard) => {
                        if clipboard.set_text(&text).is_ok() {
                            std::thread::sleep(Duration::from_secs(2));
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "clipboard unavailable"),
                }
            }
        });

        tx
    });

    CLIPBOARD_SENDER
        .get()
        .ok_or_else(|| anyhow::anyhow!("Failed to initialize clipboard manager"))
}

/// Queue `text` for the clipboard without blocking the UI thread.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let sender = init_clipboard_manager()?;
    sender
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))?;
    Ok(())
}

/// Spawn a detached helper with its output silenced so it cannot draw over
/// the alternate screen.
fn spawn_quiet(program: &str, args: &[&str]) -> Result<()> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
        .with_context(|| format!("failed to launch {program}"))
}

/// Open `url` in the default browser.
pub fn open_in_browser(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(anyhow::anyhow!("run has no URL to open"));
    }

    #[cfg(target_os = "macos")]
    {
        return spawn_quiet("open", &[url]);
    }

    #[cfg(target_os = "windows")]
    {
        return spawn_quiet("cmd", &["/C", "start", "", url]);
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        return spawn_quiet("xdg-open", &[url]);
    }
}

/// Best-effort desktop notification. Failures are logged and otherwise ignored.
pub fn notify(title: &str, body: &str) {
    #[cfg(target_os = "macos")]
    let res = {
        let script = format!(
            "display notification {:?} with title {:?} sound name \"default\"",
            body, title
        );
        spawn_quiet("osascript", &["-e", &script])
    };

    #[cfg(not(target_os = "macos"))]
    let res = spawn_quiet("notify-send", &[title, body]);

    if let Err(e) = res {
        tracing::debug!(error = %e, "desktop notification failed");
    }
}
