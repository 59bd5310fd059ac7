//! Abstract user interaction used by the acquisition controller.
//!
//! The controller never talks to a terminal or window directly. Progress is
//! fire-and-forget, while `confirm` and `request_manual_input` are awaited.

mod terminal;

pub use terminal::{TerminalInteraction, is_dumb_terminal, should_use_progress_bar};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, info};

/// Capabilities the acquisition controller needs from its host.
#[async_trait]
pub trait UserInteractionPort: Send + Sync {
    /// Reports polling progress; must not block.
    fn report_progress(&self, percent: u8, message: &str);

    /// Asks a yes/no question.
    async fn confirm(&self, prompt: &str) -> bool;

    /// Asks for free-text cookie input; `None` when the user gives nothing.
    async fn request_manual_input(&self, instructions: &str) -> Option<String>;

    /// Cooperative cancellation flag, checked between strategies and while a sweep is in flight.
    fn is_cancelled(&self) -> bool;
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sets the flag on the first Ctrl-C. Requires a running tokio runtime.
    pub fn cancel_on_ctrl_c(&self) -> tokio::task::JoinHandle<()> {
        let flag = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received; cancelling login");
                flag.cancel();
            }
        })
    }
}

/// Non-interactive port with scripted answers.
///
/// Used when no terminal is attached and by tests.
#[derive(Debug, Clone, Default)]
pub struct HeadlessInteraction {
    confirm_answer: bool,
    manual_input: Option<String>,
    cancel: CancellationFlag,
}

impl HeadlessInteraction {
    /// Declines every confirmation and provides no manual input.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_confirm_answer(mut self, answer: bool) -> Self {
        self.confirm_answer = answer;
        self
    }

    #[must_use]
    pub fn with_manual_input(mut self, input: impl Into<String>) -> Self {
        self.manual_input = Some(input.into());
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }
}

#[async_trait]
impl UserInteractionPort for HeadlessInteraction {
    fn report_progress(&self, percent: u8, message: &str) {
        debug!(percent, message, "Login progress");
    }

    async fn confirm(&self, prompt: &str) -> bool {
        debug!(prompt, answer = self.confirm_answer, "Headless confirmation");
        self.confirm_answer
    }

    async fn request_manual_input(&self, _instructions: &str) -> Option<String> {
        self.manual_input.clone()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_flag_is_shared_between_clones() {
        let flag = CancellationFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());
        clone.cancel();
        assert!(flag.is_cancelled());
    }

    #[tokio::test]
    async fn test_headless_defaults_decline() {
        let port = HeadlessInteraction::new();
        assert!(!port.confirm("done?").await);
        assert!(port.request_manual_input("paste").await.is_none());
        assert!(!port.is_cancelled());
    }

    #[tokio::test]
    async fn test_headless_scripted_answers() {
        let cancel = CancellationFlag::new();
        let port = HeadlessInteraction::new()
            .with_confirm_answer(true)
            .with_manual_input("a=1")
            .with_cancellation(cancel.clone());
        assert!(port.confirm("done?").await);
        assert_eq!(port.request_manual_input("paste").await.as_deref(), Some("a=1"));
        cancel.cancel();
        assert!(port.is_cancelled());
    }
}
