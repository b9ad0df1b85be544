//! Terminal progress bars, one per file

use super::{ProgressReporter, TransferProgress};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use parking_lot::Mutex;
use std::collections::HashMap;

const BAR_TEMPLATE: &str =
    "{msg:30!} [{elapsed_precise}] {bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

/// Progress reporter drawing an `indicatif` bar per uploaded file
///
/// Bars are created on the first update for a file and finished when the
/// file reports completion. Drawing is rate-limited by the draw target, so
/// `on_progress` only updates counters.
pub struct IndicatifProgressReporter {
    multi: MultiProgress,
    style: ProgressStyle,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl IndicatifProgressReporter {
    /// Bars drawn on stderr
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    pub fn with_draw_target(target: ProgressDrawTarget) -> Self {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");

        Self {
            multi: MultiProgress::with_draw_target(target),
            style,
            bars: Mutex::new(HashMap::new()),
        }
    }

    /// Whether bars drawn on stderr would be visible
    pub fn stderr_is_terminal() -> bool {
        !ProgressDrawTarget::stderr().is_hidden()
    }

    /// Leave bars of unfinished uploads where they stopped
    pub fn finish(&self) {
        for bar in self.bars.lock().values() {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    }

    fn bar_for(&self, file_name: &str, total_bytes: u64) -> ProgressBar {
        let mut bars = self.bars.lock();
        bars.entry(file_name.to_string())
            .or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new(total_bytes));
                bar.set_style(self.style.clone());
                bar.set_message(file_name.to_string());
                bar
            })
            .clone()
    }
}

impl Default for IndicatifProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for IndicatifProgressReporter {
    fn on_progress(&self, file_name: &str, progress: TransferProgress) {
        let bar = self.bar_for(file_name, progress.total_bytes);
        bar.set_length(progress.total_bytes);
        bar.set_position(progress.bytes_sent);

        if progress.is_complete() && !bar.is_finished() {
            bar.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hidden() -> IndicatifProgressReporter {
        IndicatifProgressReporter::with_draw_target(ProgressDrawTarget::hidden())
    }

    #[test]
    fn test_one_bar_per_file() {
        let reporter = hidden();
        reporter.on_progress("app.zip", TransferProgress::new(10, 100));
        reporter.on_progress("app.zip", TransferProgress::new(60, 100));
        reporter.on_progress("app.dmg", TransferProgress::new(5, 50));

        let bars = reporter.bars.lock();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars["app.zip"].position(), 60);
        assert_eq!(bars["app.zip"].length(), Some(100));
        assert_eq!(bars["app.dmg"].position(), 5);
    }

    #[test]
    fn test_bar_finishes_on_completion() {
        let reporter = hidden();
        reporter.on_progress("app.zip", TransferProgress::new(50, 100));
        assert!(!reporter.bars.lock()["app.zip"].is_finished());

        reporter.on_progress("app.zip", TransferProgress::new(100, 100));
        assert!(reporter.bars.lock()["app.zip"].is_finished());
    }

    #[test]
    fn test_empty_file_finishes_immediately() {
        let reporter = hidden();
        reporter.on_progress("empty.txt", TransferProgress::new(0, 0));
        assert!(reporter.bars.lock()["empty.txt"].is_finished());
    }

    #[test]
    fn test_finish_abandons_incomplete_bars() {
        let reporter = hidden();
        reporter.on_progress("cancelled.zip", TransferProgress::new(30, 100));
        reporter.finish();

        let bars = reporter.bars.lock();
        assert!(bars["cancelled.zip"].is_finished());
        assert_eq!(bars["cancelled.zip"].position(), 30);
    }
}
