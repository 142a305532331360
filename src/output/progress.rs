use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{heading, Tone};

/// Spinner shown while waiting for jobs to finish.
pub struct WaitProgress {
    pb: ProgressBar,
    total: Option<usize>,
    finished: usize,
}

impl WaitProgress {
    /// Waiting for a known set of jobs.
    pub fn for_jobs(total: usize) -> Self {
        eprintln!("{}", heading("⏳", "Waiting"));
        Self {
            pb: create_spinner(counted_message(0, total)),
            total: Some(total),
            finished: 0,
        }
    }

    /// Waiting for a build whose jobs may not even exist yet.
    pub fn for_build(build: &str) -> Self {
        eprintln!("{}", heading("⏳", "Waiting"));
        let message = Tone::Warning.paint(format!("Waiting for jobs of {build}")).to_string();
        Self {
            pb: create_spinner(message),
            total: None,
            finished: 0,
        }
    }

    /// Run `print` without the spinner drawing over its output.
    pub fn suspend<F: FnOnce()>(&self, print: F) {
        self.pb.suspend(print);
    }

    pub fn advance(&mut self, count: usize) {
        self.finished += count;
        if let Some(total) = self.total {
            self.pb.set_message(counted_message(self.finished, total));
        }
    }

    pub fn finish(self) {
        let message = match self.total {
            Some(total) => format!("All {total} jobs finished ✓"),
            None => "All jobs finished ✓".to_string(),
        };
        self.pb
            .finish_with_message(Tone::Good.paint(message).to_string());
        eprintln!();
    }

    pub fn abandon(self) {
        let message = match self.total {
            Some(total) => format!("Stopped waiting with {}/{total} jobs finished", self.finished),
            None => "Stopped waiting".to_string(),
        };
        self.pb
            .abandon_with_message(Tone::Bad.paint(message).to_string());
        eprintln!();
    }
}

fn counted_message(finished: usize, total: usize) -> String {
    Tone::Warning
        .paint(format!("{finished}/{total} jobs finished"))
        .to_string()
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {msg} {spinner}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
