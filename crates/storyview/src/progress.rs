//! 📊 progress.rs -- "Are we there yet?" -- every batch job, every time, forever.
//!
//! One bar, one tick per story map. indicatif hides it on its own when nobody
//! is watching (cron, CI), so the log file never sees it.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

/// ⏱️ How long the usage sweep took, as `MM:SS`, growing an hours field only
/// when a slow portal earns one.
pub(crate) fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, secs / 60 % 60, secs % 60);
    match hours {
        0 => format!("{minutes:02}:{seconds:02}"),
        _ => format!("{hours:02}:{minutes:02}:{seconds:02}"),
    }
}

/// 📊 Progress over the per-item usage fetch.
pub(crate) struct UsageProgress {
    progress_bar: ProgressBar,
    start_time: Instant,
}

impl std::fmt::Debug for UsageProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("UsageProgress")
            .field("position", &self.progress_bar.position())
            .field("length", &self.progress_bar.length())
            .finish()
    }
}

impl UsageProgress {
    /// 🚀 A bar for `total` story maps, drawn on stderr if stderr is a terminal.
    pub(crate) fn new(total: u64) -> Self {
        let progress_bar = ProgressBar::new(total);
        // -- 🐛 the template is a literal; if it's invalid we keep indicatif's default style
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg}\n| [{bar:40.cyan/blue}] {pos}/{len} story maps")
        {
            progress_bar.set_style(style.progress_chars("=>-"));
        }
        Self {
            progress_bar,
            start_time: Instant::now(),
        }
    }

    /// 🙈 Same bar, never drawn.
    #[cfg(test)]
    pub(crate) fn hidden(total: u64) -> Self {
        let progress = Self::new(total);
        progress.progress_bar.set_draw_target(indicatif::ProgressDrawTarget::hidden());
        progress
    }

    /// 🔄 One more story map done.
    pub(crate) fn tick(&self, title: &str) {
        self.progress_bar.set_message(format!("📈 {title}"));
        self.progress_bar.inc(1);
    }

    #[cfg(test)]
    pub(crate) fn position(&self) -> u64 {
        self.progress_bar.position()
    }

    /// ✅ Done. Returns the elapsed time, formatted, for the log line.
    pub(crate) fn finish(&self) -> String {
        self.progress_bar.finish_and_clear();
        format_duration(self.start_time.elapsed())
    }
}
