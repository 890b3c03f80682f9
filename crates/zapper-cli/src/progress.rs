use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use zapper_core::{ProgressReporter, Stage};

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif.
///
/// Stages with a known total get a bar, the rest (crawl, pruning) a spinner
/// with a running count.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.guard();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }
}

fn spinner(stage: Stage) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} {pos}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars(TICK_CHARS),
    );
    pb.set_message(format!("{}...", stage));
    pb
}

fn bar(stage: Stage, total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "  {spinner:.cyan} {msg} [{bar:30.cyan/dim}] {pos}/{len} ({eta} remaining)",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸─")
        .tick_chars(TICK_CHARS),
    );
    pb.set_message(stage.to_string());
    pb
}

impl ProgressReporter for CliReporter {
    fn on_stage_start(&self, stage: Stage, total: u64) {
        let pb = if total == 0 {
            spinner(stage)
        } else {
            bar(stage, total)
        };
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_task_complete(&self, _stage: Stage) {
        if let Some(pb) = self.guard().as_ref() {
            pb.inc(1);
        }
    }

    fn on_stage_complete(&self, stage: Stage) {
        let finished = self.guard().take();
        if let Some(pb) = finished {
            let done = pb.position();
            pb.finish_and_clear();
            eprintln!("  \x1b[32m✓\x1b[0m {} complete: {} done", stage, done);
        }
    }

    fn on_message(&self, message: &str) {
        match self.guard().as_ref() {
            Some(pb) => pb.println(message),
            None => eprintln!("{}", message),
        }
    }
}
