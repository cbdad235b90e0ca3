//! Progress reporting utilities

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

/// One progress notification from a fetch or a comparison
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub message: String,
    /// Zero-based index of the table being processed
    pub table_index: usize,
    pub total_tables: usize,
    /// Progress within the current table, in `[0, 1]`
    pub fraction: Option<f64>,
}

impl ProgressUpdate {
    pub fn new(message: impl Into<String>, table_index: usize, total_tables: usize) -> Self {
        Self {
            message: message.into(),
            table_index,
            total_tables,
            fraction: None,
        }
    }

    pub fn with_fraction(mut self, fraction: f64) -> Self {
        self.fraction = Some(fraction.clamp(0.0, 1.0));
        self
    }

    /// Fractional table index, e.g. `2.5` half way through the third table
    pub fn table_position(&self) -> f64 {
        self.table_index as f64 + self.fraction.unwrap_or(0.0)
    }

    /// Overall completion in `[0, 1]`
    pub fn overall(&self) -> f64 {
        if self.total_tables == 0 {
            return 1.0;
        }
        (self.table_position() / self.total_tables as f64).clamp(0.0, 1.0)
    }
}

/// Receiver of progress notifications.
///
/// Invoked on the worker thread; implementations must return quickly and
/// only record or display what they are given.
pub type ProgressCallback = Arc<dyn Fn(&ProgressUpdate) + Send + Sync>;

pub(crate) fn report(progress: Option<&ProgressCallback>, update: impl FnOnce() -> ProgressUpdate) {
    if let Some(callback) = progress {
        callback(&update());
    }
}

const BAR_SCALE: u64 = 1000;

/// Terminal progress display for the command-line tool
#[derive(Debug)]
pub struct ProgressReporter {
    bar: Option<ProgressBar>,
}

impl ProgressReporter {
    pub fn new(phase: &str) -> Self {
        Self {
            bar: Some(create_progress_bar(phase)),
        }
    }

    /// Reporter that draws nothing
    pub fn new_minimal() -> Self {
        Self { bar: None }
    }

    /// Callback that feeds updates into this reporter's bar
    pub fn callback(&self) -> ProgressCallback {
        let bar = self.bar.clone();
        Arc::new(move |update: &ProgressUpdate| {
            if let Some(pb) = &bar {
                pb.set_position((update.overall() * BAR_SCALE as f64) as u64);
                pb.set_message(format!(
                    "{} ({}/{})",
                    update.message,
                    (update.table_index + 1).min(update.total_tables.max(1)),
                    update.total_tables
                ));
            }
        })
    }

    pub fn finish(&mut self, message: &str) {
        if let Some(pb) = self.bar.take() {
            pb.set_position(BAR_SCALE);
            pb.finish_with_message(message.to_string());
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
    }
}

fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new(BAR_SCALE);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}")
            .expect("Invalid progress template")
            .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
