use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

/// Stderr progress for the scan host.
#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    fn spinner(&self, message: String) -> Option<ProgressBar> {
        if !self.use_pretty() {
            return None;
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_draw_target(ProgressDrawTarget::stderr());
        spinner.enable_steady_tick(Duration::from_millis(120));
        let style = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(message);
        Some(spinner)
    }

    /// A setup step, finished when the guard drops.
    pub fn stage(&self, name: &str) -> StageGuard {
        let spinner = self.spinner(format!("{name}…"));
        if spinner.is_none() {
            eprintln!("==> {}", name);
        }
        StageGuard {
            name: name.to_string(),
            start: Instant::now(),
            spinner,
        }
    }

    /// Live indicator for one scan session.
    pub fn scanning(&self, device_id: &str) -> ScanIndicator {
        let label = format!("scanning on {device_id}");
        let spinner = self.spinner(label.clone());
        if spinner.is_none() {
            eprintln!("==> {}", label);
        }
        ScanIndicator {
            label,
            start: Instant::now(),
            frames: 0,
            spinner,
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let message = format!("✔ {} ({})", self.name, format_duration(self.start.elapsed()));
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

pub struct ScanIndicator {
    label: String,
    start: Instant,
    frames: u64,
    spinner: Option<ProgressBar>,
}

impl ScanIndicator {
    /// Plain mode stays quiet until `finish`.
    pub fn set_frames(&mut self, frames: u64) {
        if frames == self.frames {
            return;
        }
        self.frames = frames;
        if let Some(spinner) = &self.spinner {
            spinner.set_message(format!("{} ({} frames)", self.label, frames));
        }
    }

    pub fn finish(self, outcome: &str) {
        let message = format!(
            "{} {} after {} frames ({})",
            if outcome.starts_with("scanned") { "✔" } else { "✘" },
            outcome,
            self.frames,
            format_duration(self.start.elapsed())
        );
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
