//! Progress collaborator ticked by every phase of the step.

use indicatif::{ProgressBar, ProgressStyle};

pub trait Progress {
    fn start(&mut self, total: u64);
    fn advance(&mut self);
    fn finish(&mut self);
}

/// Terminal progress bar drawn on stderr.
pub struct BarProgress {
    bar: Option<ProgressBar>,
    label: String,
}

impl BarProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            bar: None,
            label: label.into(),
        }
    }
}

impl Progress for BarProgress {
    fn start(&mut self, total: u64) {
        let bar = ProgressBar::new(total);
        if let Ok(style) =
            ProgressStyle::with_template("{msg:>12} [{bar:40}] {pos}/{len} ({elapsed})")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(self.label.clone());
        self.bar = Some(bar);
    }

    fn advance(&mut self) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
    }
}

/// Counts ticks without drawing anything. Used by `--quiet` and in tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SilentProgress {
    pub total: u64,
    pub advanced: u64,
    pub finished: bool,
}

impl Progress for SilentProgress {
    fn start(&mut self, total: u64) {
        self.total = total;
        self.advanced = 0;
        self.finished = false;
    }

    fn advance(&mut self) {
        self.advanced += 1;
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}
