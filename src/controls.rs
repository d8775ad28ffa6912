use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// A user action from the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    ToggleCapture,
    TogglePlayback,
    Next,
    Prev,
    Snapshot,
    Quit,
}

pub const HELP: &str =
    "c = start/pause capture, p = play/pause, n = next chord, b = previous chord, s = snapshot, q = quit";

pub fn parse_control(line: &str) -> Option<Control> {
    match line.trim().to_ascii_lowercase().as_str() {
        "c" | "capture" => Some(Control::ToggleCapture),
        "p" | "play" | "pause" => Some(Control::TogglePlayback),
        "n" | "next" => Some(Control::Next),
        "b" | "prev" | "back" => Some(Control::Prev),
        "s" | "snapshot" => Some(Control::Snapshot),
        "q" | "quit" | "exit" => Some(Control::Quit),
        _ => None,
    }
}

/// Read controls from stdin, one per line, and forward them on `tx`.
///
/// Returns when stdin closes or the receiver goes away.
pub async fn monitor_stdin(tx: mpsc::Sender<Control>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_control(&line) {
            Some(control) => {
                tracing::debug!("Control: {:?}", control);
                if tx.send(control).await.is_err() {
                    break;
                }
            }
            None => tracing::warn!("Unknown control {:?} ({})", line.trim(), HELP),
        }
    }

    Ok(())
}
