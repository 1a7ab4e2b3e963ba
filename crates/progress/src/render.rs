//! Turning snapshots into what the progress bar and title show.

use crate::snapshot::ProgressSnapshot;

/// Window title when no progress is shown.
pub const BASE_TITLE: &str = "Stable Diffusion";

/// Everything a progress sink needs to draw one update.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressView {
    /// Bar label: optional status line, percentage and ETA.
    pub text: String,
    /// Percentage and ETA only; this is what the title shows.
    pub title_text: String,
    /// Bar fill, 0 to 1.
    pub fraction: f64,
    /// `false` when there is no progress yet and the bar is drawn transparent.
    pub filled: bool,
    /// Whether the bar is displayed at all.
    pub visible: bool,
}

impl ProgressView {
    pub fn from_snapshot(snapshot: &ProgressSnapshot, show_progress_bar: bool) -> Self {
        let progress = snapshot.positive_progress();

        let mut title_text = match progress {
            Some(p) => format!("{}%", (p * 100.0).round() as i64),
            None => String::new(),
        };
        if let Some(eta) = snapshot.eta.filter(|e| *e > 0.0) {
            title_text.push_str(" ETA: ");
            title_text.push_str(&format_time(eta));
        }

        let text = match snapshot.textinfo.as_deref() {
            Some(info) if !info.is_empty() && !info.contains('\n') => {
                format!("{info} {title_text}")
            }
            _ => title_text.clone(),
        };

        Self {
            text,
            title_text,
            fraction: progress.unwrap_or(0.0).min(1.0),
            filled: progress.is_some(),
            visible: show_progress_bar,
        }
    }
}

fn pad2(n: u64) -> String {
    format!("{n:02}")
}

/// Format an ETA: `HH:MM:SS` above an hour, `MM:SS` above a minute,
/// otherwise whole seconds with an `s` suffix.
pub fn format_time(secs: f64) -> String {
    let whole = secs.max(0.0).floor() as u64;
    if secs > 3600.0 {
        format!("{}:{}:{}", pad2(whole / 3600), pad2(whole / 60 % 60), pad2(whole % 60))
    } else if secs > 60.0 {
        format!("{}:{}", pad2(whole / 60), pad2(whole % 60))
    } else {
        format!("{whole}s")
    }
}

/// Window title for the given progress text.
pub fn window_title(progress_text: &str, show_progress_in_title: bool) -> String {
    let trimmed = progress_text.trim();
    if show_progress_in_title && !trimmed.is_empty() {
        format!("[{trimmed}] {BASE_TITLE}")
    } else {
        BASE_TITLE.to_string()
    }
}
