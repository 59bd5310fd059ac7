//! Terminal implementation of [`UserInteractionPort`].

use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use super::{CancellationFlag, UserInteractionPort};

#[must_use]
pub fn is_dumb_terminal() -> bool {
    std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false)
}

#[must_use]
pub fn should_use_progress_bar(stderr_is_terminal: bool, quiet: bool, dumb_terminal: bool) -> bool {
    stderr_is_terminal && !quiet && !dumb_terminal
}

/// Progress bar on stderr, prompts read from stdin on a blocking thread.
#[derive(Debug)]
pub struct TerminalInteraction {
    bar: ProgressBar,
    cancel: CancellationFlag,
}

impl TerminalInteraction {
    #[must_use]
    pub fn new(show_progress: bool, cancel: CancellationFlag) -> Self {
        let bar = if show_progress {
            let bar = ProgressBar::new(100);
            bar.set_style(
                ProgressStyle::with_template("{bar:30} {pos:>3}% {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        } else {
            ProgressBar::hidden()
        };
        Self { bar, cancel }
    }

    /// Clears the progress bar from the terminal.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn print(&self, text: &str) {
        self.bar.suspend(|| {
            let mut stderr = io::stderr().lock();
            let _ = writeln!(stderr, "{text}");
            let _ = stderr.flush();
        });
    }
}

#[async_trait]
impl UserInteractionPort for TerminalInteraction {
    fn report_progress(&self, percent: u8, message: &str) {
        self.bar.set_position(u64::from(percent.min(100)));
        self.bar.set_message(message.to_string());
    }

    async fn confirm(&self, prompt: &str) -> bool {
        self.print(&format!("{prompt} [y/N]"));
        let line = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;
        match line {
            Ok(Ok(line)) => parse_confirmation(&line),
            Ok(Err(error)) => {
                warn!(error = %error, "Failed to read confirmation from stdin");
                false
            }
            Err(error) => {
                warn!(error = %error, "Confirmation reader task failed");
                false
            }
        }
    }

    async fn request_manual_input(&self, instructions: &str) -> Option<String> {
        self.print(instructions);
        let input = tokio::task::spawn_blocking(|| read_manual_input(io::stdin().lock())).await;
        match input {
            Ok(input) => input,
            Err(error) => {
                warn!(error = %error, "Manual input reader task failed");
                None
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

fn parse_confirmation(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Reads until a blank line after some content, or EOF.
fn read_manual_input<R: BufRead>(reader: R) -> Option<String> {
    let mut collected = Vec::new();
    for line in reader.lines() {
        let Ok(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            if collected.is_empty() {
                continue;
            }
            break;
        }
        collected.push(line);
    }
    if collected.is_empty() {
        None
    } else {
        Some(collected.join("\n"))
    }
}
