// Output formatting utilities

use crate::models::{StageState, StageStatus, TraceState};
use crate::utils::format_micros;
use anyhow::Result;
use std::io::IsTerminal;

// ANSI escape codes for terminal formatting
const ANSI_BOLD: &str = "\x1b[1m";
const ANSI_RESET: &str = "\x1b[0m";

const ANSI_FG_RED: &str = "\x1b[31m";
const ANSI_FG_GREEN: &str = "\x1b[32m";
const ANSI_FG_YELLOW: &str = "\x1b[33m";
const ANSI_FG_CYAN: &str = "\x1b[36m";
const ANSI_FG_BRIGHT_BLACK: &str = "\x1b[90m";

// Clear from cursor to end of screen
const ANSI_CLEAR_BELOW: &str = "\x1b[J";

/// Width of the label column (longest label is "Forward to Backend")
const LABEL_WIDTH: usize = 20;
const STATUS_WIDTH: usize = 8;
const DURATION_WIDTH: usize = 9;

/// Check if stdout is a terminal (TTY)
pub fn is_tty() -> bool {
    std::io::stdout().is_terminal()
}

/// Get terminal width dynamically
///
/// Uses the `terminal_size` crate for reliable detection, with fallback to
/// COLUMNS environment variable and a sensible default.
pub fn get_terminal_width() -> usize {
    if let Some((terminal_size::Width(w), _)) = terminal_size::terminal_size() {
        if w > 0 {
            return w as usize;
        }
    }

    if let Ok(cols) = std::env::var("COLUMNS") {
        if let Ok(width) = cols.parse::<usize>() {
            if width > 0 && width < 10000 {
                return width;
            }
        }
    }

    100
}

/// Apply bold formatting if in TTY mode
fn bold_if_tty(text: &str, is_tty: bool) -> String {
    if is_tty {
        format!("{}{}{}", ANSI_BOLD, text, ANSI_RESET)
    } else {
        text.to_string()
    }
}

fn paint(text: &str, color: Option<&str>, is_tty: bool) -> String {
    match color {
        Some(code) if is_tty => format!("{}{}{}", code, text, ANSI_RESET),
        _ => text.to_string(),
    }
}

fn status_color(status: StageStatus) -> Option<&'static str> {
    match status {
        StageStatus::Pending => Some(ANSI_FG_BRIGHT_BLACK),
        StageStatus::Running => Some(ANSI_FG_YELLOW),
        StageStatus::Success => Some(ANSI_FG_GREEN),
        StageStatus::Failed => Some(ANSI_FG_RED),
        StageStatus::Skipped => Some(ANSI_FG_BRIGHT_BLACK),
    }
}

fn status_marker(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Pending => "·",
        StageStatus::Running => "▶",
        StageStatus::Success => "✓",
        StageStatus::Failed => "✗",
        StageStatus::Skipped => "-",
    }
}

/// Make remote-supplied text safe to print on one terminal line: control
/// characters (newlines, ESC and the like) become spaces
fn sanitize(text: &str) -> String {
    text.chars().map(|c| if c.is_control() { ' ' } else { c }).collect()
}

/// Number of columns a rendered line occupies, ignoring ANSI escape sequences
fn visible_width(line: &str) -> usize {
    let mut width = 0;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            // CSI: ESC [ params final-byte
            for c in chars.by_ref() {
                if c.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

/// Terminal rows a line takes once wrapped at `width` columns
fn wrapped_rows(line: &str, width: usize) -> usize {
    let cols = visible_width(line);
    if cols == 0 || width == 0 {
        1
    } else {
        cols.div_ceil(width)
    }
}

/// Truncate to `max` characters, marking the cut with ".."
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max <= 2 {
        return text.chars().take(max).collect();
    }
    let kept: String = text.chars().take(max - 2).collect();
    format!("{}..", kept)
}

fn format_stage_row(stage: &StageState, is_tty: bool, width: usize) -> String {
    let color = status_color(stage.status);
    let marker = paint(status_marker(stage.status), color, is_tty);
    let status = paint(&format!("{:<w$}", stage.status.as_str(), w = STATUS_WIDTH), color, is_tty);
    let duration = stage.duration_us.map(format_micros).unwrap_or_default();

    let mut row = format!(
        "  {} {:<lw$} {} {:>dw$}",
        marker,
        stage.label(),
        status,
        duration,
        lw = LABEL_WIDTH,
        dw = DURATION_WIDTH
    );

    if let Some(error) = &stage.error {
        // 2 indent + marker + spaces between the fixed columns
        let used = 2 + 1 + 1 + LABEL_WIDTH + 1 + STATUS_WIDTH + 1 + DURATION_WIDTH + 2;
        let room = width.saturating_sub(used).max(16);
        row.push_str("  ");
        row.push_str(&paint(&truncate(&sanitize(error), room), Some(ANSI_FG_RED), is_tty));
    }

    row
}

/// Render a trace as a stage table
///
/// One header line, one row per stage in display order, then a footer with
/// the total time and any trace-level error.
pub fn format_trace(state: &TraceState, is_tty: bool, width: usize) -> String {
    let mut lines = Vec::with_capacity(state.stages.len() + 3);

    let connection = paint(
        state.connection.as_str(),
        Some(ANSI_FG_CYAN),
        is_tty,
    );
    lines.push(format!(
        "{} {} [{}]",
        bold_if_tty("Trace", is_tty),
        sanitize(&state.trace_id),
        connection
    ));

    for stage in &state.stages {
        lines.push(format_stage_row(stage, is_tty, width));
    }

    let total = state.total_duration_us();
    if total > 0 {
        lines.push(format!("  Total: {}", format_micros(total)));
    }
    if let Some(error) = &state.trace_error {
        lines.push(paint(
            &format!("  Trace error: {}", sanitize(error)),
            Some(ANSI_FG_RED),
            is_tty,
        ));
    }

    lines.join("\n")
}

/// Render a trace as pretty JSON
pub fn format_trace_json(state: &TraceState) -> Result<String> {
    Ok(serde_json::to_string_pretty(state)?)
}

/// Redraws a trace table in place on a terminal
#[derive(Debug, Default)]
pub struct LiveView {
    drawn_lines: usize,
}

impl LiveView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame that replaces whatever this view drew last
    ///
    /// Rows wider than `width` wrap on the terminal, so the redraw moves the
    /// cursor up by wrapped rows rather than by lines.
    pub fn frame(&mut self, state: &TraceState, width: usize) -> String {
        let body = format_trace(state, true, width);
        let mut out = String::new();
        if self.drawn_lines > 0 {
            out.push_str(&format!("\x1b[{}A", self.drawn_lines));
            out.push('\r');
            out.push_str(ANSI_CLEAR_BELOW);
        }
        self.drawn_lines = body.lines().map(|line| wrapped_rows(line, width)).sum();
        out.push_str(&body);
        out.push('\n');
        out
    }
}
