//! Notification sinks.
//!
//! The editor core reports every terminal outcome through exactly one call on
//! a [`NotificationSink`]. Sinks are fire-and-forget.

use std::sync::Mutex;

pub trait NotificationSink: Send + Sync {
    fn success(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationLevel {
    Success,
    Warning,
    Error,
}

impl NotificationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Sends notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn success(&self, message: &str) {
        tracing::info!(notification = "success", "{}", message);
    }

    fn warning(&self, message: &str) {
        tracing::warn!(notification = "warning", "{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!(notification = "error", "{}", message);
    }
}

/// Prints notifications for a terminal user.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

impl NotificationSink for ConsoleNotifier {
    fn success(&self, message: &str) {
        println!("✓ {message}");
    }

    fn warning(&self, message: &str) {
        eprintln!("! {message}");
    }

    fn error(&self, message: &str) {
        eprintln!("✗ {message}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

/// Collects notifications in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    received: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, level: NotificationLevel, message: &str) {
        if let Ok(mut received) = self.received.lock() {
            received.push(Notification {
                level,
                message: message.to_string(),
            });
        }
    }

    /// Everything received so far, oldest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.received
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.received.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn count_of(&self, level: NotificationLevel) -> usize {
        self.received
            .lock()
            .map(|r| r.iter().filter(|n| n.level == level).count())
            .unwrap_or(0)
    }

    /// Drain and return everything received so far.
    pub fn take(&self) -> Vec<Notification> {
        self.received
            .lock()
            .map(|mut r| std::mem::take(&mut *r))
            .unwrap_or_default()
    }
}

impl NotificationSink for RecordingNotifier {
    fn success(&self, message: &str) {
        self.push(NotificationLevel::Success, message);
    }

    fn warning(&self, message: &str) {
        self.push(NotificationLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.push(NotificationLevel::Error, message);
    }
}
