//! Receiving notifications in long-running commands.

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use barkeep::Notification;

/// Next notification, skipping over any the receiver fell behind on.
///
/// `None` once every sender is gone.
pub async fn next(rx: &mut broadcast::Receiver<Notification>) -> Option<Notification> {
    loop {
        match rx.recv().await {
            Ok(notification) => return Some(notification),
            Err(RecvError::Lagged(skipped)) => {
                warn!("Missed {} notifications", skipped);
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use barkeep::{Notifier, Severity};

    #[tokio::test]
    async fn lagging_receiver_keeps_receiving() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        for i in 0..100 {
            notifier.success(format!("note {}", i));
        }

        let first = next(&mut rx).await.unwrap();
        assert_eq!(first.severity, Severity::Success);
        assert_ne!(first.message, "note 0");

        notifier.error("after the gap");
        let mut last = first;
        while last.message != "after the gap" {
            last = next(&mut rx).await.unwrap();
        }
        assert_eq!(last.severity, Severity::Error);
    }

    #[tokio::test]
    async fn closed_notifier_ends_the_stream() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        drop(notifier);
        assert_eq!(next(&mut rx).await, None);
    }
}
