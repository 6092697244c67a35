//! Progress reporting module with TTY detection.
//!
//! Renders progress bars in TTY mode and falls back to simple status lines
//! otherwise, implementing [`wikivault_progress::Progress`] for the two
//! stages the ingestion engine reports: discovery and per-page scraping.

use atty::Stream;
use indicatif::{ProgressBar, ProgressStyle};
use wikivault_progress::{Progress, Stage};

/// Detects whether stdout is connected to a TTY.
pub fn is_tty() -> bool {
    atty::is(Stream::Stdout)
}

/// Progress reporter that shows a progress bar in TTY mode and falls back to
/// plain status lines when stdout isn't a terminal or the caller asked to be
/// quiet.
pub struct CliProgress {
    enabled: bool,
    current_stage: Option<Stage>,
    bar: Option<ProgressBar>,
}

impl CliProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            current_stage: None,
            bar: None,
        }
    }

    fn bar_for(&mut self, stage: Stage, total: Option<u64>) -> &ProgressBar {
        if self.current_stage != Some(stage) {
            if let Some(old) = self.bar.take() {
                old.finish_and_clear();
            }
            let pb = ProgressBar::new(total.unwrap_or(0));
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{msg} [{bar:40}] {pos}/{len}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb.set_message(stage.as_str().to_string());
            self.bar = Some(pb);
            self.current_stage = Some(stage);
        }
        self.bar.as_ref().expect("just set above")
    }
}

impl Progress for CliProgress {
    fn report(&mut self, stage: Stage, current: u64, total: Option<u64>) {
        if !self.enabled {
            return;
        }
        if let Some(total) = total {
            let bar = self.bar_for(stage, Some(total));
            bar.set_length(total);
            bar.set_position(current);
        } else {
            eprintln!("{}: {current}", stage.as_str());
        }
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_reporter_never_allocates_a_bar() {
        let mut reporter = CliProgress::new(false);
        reporter.report(Stage::Discover, 1, Some(10));
        assert!(reporter.bar.is_none());
    }

    #[test]
    fn enabled_reporter_tracks_current_stage() {
        let mut reporter = CliProgress::new(true);
        reporter.report(Stage::Discover, 1, Some(10));
        assert_eq!(reporter.current_stage, Some(Stage::Discover));
        reporter.report(Stage::Scrape, 1, Some(5));
        assert_eq!(reporter.current_stage, Some(Stage::Scrape));
    }

    #[test]
    fn is_tty_returns_bool() {
        let result = is_tty();
        assert!(matches!(result, true | false));
    }
}
