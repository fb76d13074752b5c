//! User-facing outcome messages.
//!
//! View-models report the outcome of every user action here. Rendering them (toasts,
//! status lines, log output) is left to whoever subscribes.

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
}

/// Broadcasts notifications to any number of listeners.
///
/// Cloning yields a handle onto the same channel. Messages sent while nobody
/// listens are dropped.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notify(Severity::Success, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(Severity::Error, message.into());
    }

    fn notify(&self, severity: Severity, message: String) {
        // No receivers is fine
        let _ = self.tx.send(Notification { severity, message });
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_one_channel() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();

        notifier.clone().success("Drink added successfully!");
        notifier.error("Failed to add drink.");

        assert_eq!(
            rx.recv().await.unwrap(),
            Notification {
                severity: Severity::Success,
                message: "Drink added successfully!".into()
            }
        );
        assert_eq!(rx.recv().await.unwrap().severity, Severity::Error);
    }

    #[test]
    fn sending_without_listeners_does_not_fail() {
        Notifier::default().error("nobody is listening");
    }
}
