//! Connectivity monitor, the single source of truth for "can we reach the
//! remote service".
//!
//! The state is injected by whoever observes the platform's network signal
//! rather than read from a global, so tests can flip it deterministically.
//! On an offline-to-online transition the registered reconciliation hook runs
//! to completion before the state observers are woken, so a subscriber that
//! sees `true` knows a sync attempt has already been made for that
//! transition.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::info;

use crate::notice::{Notice, Notifier};

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type ReconnectHook = Arc<dyn Fn() -> BoxFuture + Send + Sync>;

pub struct ConnectivityMonitor {
  online: watch::Sender<bool>,
  hook: Mutex<Option<ReconnectHook>>,
  notices: Notifier,
}

impl ConnectivityMonitor {
  /// `initially_online` comes from the platform's live network status at
  /// startup.
  pub fn new(initially_online: bool, notices: Notifier) -> Self {
    let (online, _) = watch::channel(initially_online);
    Self {
      online,
      hook: Mutex::new(None),
      notices,
    }
  }

  pub fn is_online(&self) -> bool {
    *self.online.borrow()
  }

  /// Observe transitions. For an offline-to-online transition the new value
  /// is visible only after the reconnect hook has finished.
  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.online.subscribe()
  }

  /// Register the routine run on every offline-to-online transition. The
  /// last registration wins.
  pub fn on_reconnect<F, Fut>(&self, hook: F)
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let hook: ReconnectHook = Arc::new(move || Box::pin(hook()) as BoxFuture);
    *self.hook.lock().unwrap_or_else(PoisonError::into_inner) = Some(hook);
  }

  /// Feed a fresh reading of the platform's network status. Unchanged
  /// readings are ignored.
  pub async fn set_online(&self, online: bool) {
    if online == *self.online.borrow() {
      return;
    }
    if online {
      info!("connectivity restored, reconciling before waking observers");
      self
        .notices
        .publish(Notice::info("Back Online", "Syncing your data..."));
      let hook = self
        .hook
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
      if let Some(hook) = hook {
        hook().await;
      }
      self.online.send_replace(true);
    } else {
      info!("connectivity lost, falling back to the local cache");
      self.online.send_replace(false);
      self.notices.publish(Notice::warning(
        "You're Offline",
        "Changes will be saved locally and synced when connection returns.",
      ));
    }
  }
}
