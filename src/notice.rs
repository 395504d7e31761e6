//! User-facing notifications.
//!
//! Errors in this subsystem never surface as failures; they become notices on
//! this bus while the operation degrades to cached data or a later retry.
//! The UI subscribes and renders them however it likes (toasts, a status
//! line). Publishing with no subscribers is fine.

use tokio::sync::broadcast;
use tracing::debug;

/// How prominently a notice should be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
  Info,
  Warning,
  Error,
}

/// A single user-facing notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
  pub severity: Severity,
  pub title: String,
  pub body: String,
}

impl Notice {
  pub fn info(title: impl Into<String>, body: impl Into<String>) -> Self {
    Self {
      severity: Severity::Info,
      title: title.into(),
      body: body.into(),
    }
  }

  pub fn warning(title: impl Into<String>, body: impl Into<String>) -> Self {
    Self {
      severity: Severity::Warning,
      title: title.into(),
      body: body.into(),
    }
  }

  pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
    Self {
      severity: Severity::Error,
      title: title.into(),
      body: body.into(),
    }
  }
}

/// Broadcast bus for notices. Cloning is cheap; every clone publishes into
/// the same stream.
#[derive(Debug, Clone)]
pub struct Notifier {
  tx: broadcast::Sender<Notice>,
}

impl Notifier {
  pub fn new() -> Self {
    let (tx, _) = broadcast::channel(32);
    Self { tx }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
    self.tx.subscribe()
  }

  pub fn publish(&self, notice: Notice) {
    debug!("notice [{:?}] {}: {}", notice.severity, notice.title, notice.body);
    // Err here only means nobody is listening right now.
    let _ = self.tx.send(notice);
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
  async fn subscribers_receive_published_notices() {
    let notifier = Notifier::new();
    let mut rx = notifier.subscribe();
    notifier.publish(Notice::info("Back Online", "Syncing your data..."));
    let notice = rx.recv().await.unwrap();
    assert_eq!(notice.severity, Severity::Info);
    assert_eq!(notice.title, "Back Online");
  }

  #[test]
  fn publish_without_subscribers_is_a_no_op() {
    let notifier = Notifier::new();
    notifier.publish(Notice::error("Sync Failed", "Will retry later."));
  }

  #[tokio::test]
  async fn clones_share_the_stream() {
    let notifier = Notifier::new();
    let mut rx = notifier.subscribe();
    let clone = notifier.clone();
    clone.publish(Notice::warning("You're Offline", "Changes will be saved locally."));
    assert_eq!(rx.recv().await.unwrap().title, "You're Offline");
  }
}
