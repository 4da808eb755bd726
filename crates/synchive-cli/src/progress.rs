use colored::*;
use crossterm::terminal;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use synchive_core::{ProgressReporter, SyncIssue};

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Status phases: spinner with the current phase
/// - Hash phase: progress bar (file count known from the walk)
/// - Actions and errors: printed above whichever bar is active
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn bar(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.bar();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.bar().take() {
            pb.finish_and_clear();
        }
    }

    /// Print a line without tearing the active bar.
    fn print_line(&self, line: String) {
        match self.bar().as_ref() {
            Some(pb) => pb.println(line),
            None => println!("{}", line),
        }
    }

    fn spinner(message: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars(TICK_CHARS),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }
}

impl Default for CliReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for CliReporter {
    fn on_status(&self, message: &str) {
        if message == "Operation completed" {
            self.finish_bar();
            return;
        }
        self.set_bar(Self::spinner(message));
    }

    fn on_processing_file(&self, message: &str) {
        self.print_line(format!("  {}", fit_to_terminal(message)));
    }

    fn on_error(&self, issue: &SyncIssue) {
        let line = format!("  ✗ {}", fit_to_terminal(&issue.to_string()));
        let line = if issue.is_integrity() {
            line.red().bold()
        } else {
            line.yellow()
        };
        self.print_line(line.to_string());
    }

    fn on_hash_start(&self, total_files: usize) {
        let pb = ProgressBar::new(total_files as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "  {spinner:.cyan} Hashing [{bar:30.cyan/dim}] {pos}/{len} files ({eta} remaining)",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━╸─")
            .tick_chars(TICK_CHARS),
        );
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_hash_progress(&self, files_hashed: usize, total_files: usize) {
        if let Some(pb) = self.bar().as_ref() {
            if pb.length() != Some(total_files as u64) {
                pb.set_length(total_files as u64);
            }
            pb.set_position(files_hashed as u64);
        }
    }

    fn on_hash_complete(&self, total_files: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  {} Hashed {} files in {:.2}s",
            "✓".green(),
            total_files,
            duration_secs
        );
    }
}

/// Shorten `message` in the middle so it fits on one terminal line.
fn fit_to_terminal(message: &str) -> String {
    let width = terminal::size()
        .map(|(cols, _)| cols as usize)
        .unwrap_or(120);
    compress_middle(message, width.saturating_sub(4).max(20))
}

fn compress_middle(message: &str, max_chars: usize) -> String {
    let chars: Vec<char> = message.chars().collect();
    if chars.len() <= max_chars {
        return message.to_string();
    }

    let start_len = (max_chars - 3) / 2;
    let end_len = max_chars - start_len - 3;
    let mut compressed: String = chars[..start_len].iter().collect();
    compressed.push_str("...");
    compressed.extend(&chars[chars.len() - end_len..]);
    compressed
}
