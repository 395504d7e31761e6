//! Transport-level caching, the service-worker analogue.
//!
//! Sits under every outgoing fetch, independent of the data accessors:
//! cache-first for the application shell, network-first with a cache
//! fallback for the remote data host. Responses live in two named, versioned
//! caches; activation prunes versions that are no longer current. A
//! background-sync trigger broadcasts a message telling open application
//! contexts to replay their pending mutations.

mod http_cache;
mod transport;

pub use http_cache::HttpCache;
pub use transport::{FetchRequest, FetchResponse, HttpTransport, RequestMode, Transport};

use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

/// Static shell cache, bumped together with the asset manifest.
pub const CACHE_NAME: &str = "moo-insights-v1";
/// Cached remote data responses.
pub const DATA_CACHE_NAME: &str = "moo-data-v1";

/// Shell URLs precached during install.
pub const STATIC_CACHE_URLS: [&str; 5] = [
  "/",
  "/dashboard",
  "/auth",
  "/manifest.json",
  "/udderly-moolicious-logo.png",
];

/// The background-sync tag that requests a data replay.
pub const SYNC_TAG: &str = "sync-data";

/// Message broadcast from the gateway to open application contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMessage {
  /// Pending local changes should be replayed now.
  SyncData,
}

/// Gateway lifecycle, mirroring a worker's install and activate phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  New,
  /// Precache finished; the gateway serves requests without waiting for
  /// older contexts to wind down.
  Installed,
  /// Stale cache versions pruned; the gateway controls all open contexts.
  Active,
}

pub struct FetchGateway {
  transport: Arc<dyn Transport>,
  cache: HttpCache,
  /// Origin the application shell is served from; resolves the precache
  /// manifest and the navigation fallback.
  shell_origin: Url,
  /// Origin of the remote database service; requests here are
  /// network-first.
  data_origin: Url,
  shell_urls: Vec<String>,
  state: Mutex<WorkerState>,
  messages: broadcast::Sender<WorkerMessage>,
}

impl FetchGateway {
  pub fn new(
    transport: Arc<dyn Transport>,
    cache: HttpCache,
    shell_origin: Url,
    data_origin: Url,
  ) -> Self {
    let (messages, _) = broadcast::channel(8);
    Self {
      transport,
      cache,
      shell_origin,
      data_origin,
      shell_urls: STATIC_CACHE_URLS.iter().map(|s| s.to_string()).collect(),
      state: Mutex::new(WorkerState::New),
      messages,
    }
  }

  /// Override the precache manifest (defaults to `STATIC_CACHE_URLS`).
  pub fn with_shell_urls(mut self, urls: Vec<String>) -> Self {
    self.shell_urls = urls;
    self
  }

  pub fn state(&self) -> WorkerState {
    *self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn set_state(&self, state: WorkerState) {
    *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
  }

  /// Install phase: precache the shell manifest concurrently, then start
  /// serving immediately instead of waiting for older contexts. A shell url
  /// that cannot be fetched is skipped, not fatal. Returns how many entries
  /// were cached.
  pub async fn install(&self) -> usize {
    let fetches = self.shell_urls.iter().map(|path| self.precache_one(path));
    let cached: usize = join_all(fetches).await.into_iter().sum();
    info!("gateway installed, {cached} shell entries cached");
    self.set_state(WorkerState::Installed);
    cached
  }

  async fn precache_one(&self, path: &str) -> usize {
    let url = match self.shell_origin.join(path) {
      Ok(url) => url,
      Err(err) => {
        warn!("skipping unresolvable shell url {path}: {err}");
        return 0;
      }
    };
    match self.transport.fetch(&FetchRequest::resource(url.clone())).await {
      Ok(response) if response.is_success() => {
        match self.cache.put(CACHE_NAME, &url, &response) {
          Ok(()) => 1,
          Err(err) => {
            warn!("could not precache {url}: {err}");
            0
          }
        }
      }
      Ok(response) => {
        warn!("shell url {url} answered {}", response.status);
        0
      }
      Err(err) => {
        warn!("could not fetch shell url {url}: {err}");
        0
      }
    }
  }

  /// Activate phase: drop cached responses from cache versions other than
  /// the current two, then take control of open contexts. Returns how many
  /// entries were dropped.
  pub fn activate(&self) -> usize {
    let pruned = match self.cache.prune_versions(&[CACHE_NAME, DATA_CACHE_NAME]) {
      Ok(pruned) => pruned,
      Err(err) => {
        warn!("could not prune stale cache versions: {err}");
        0
      }
    };
    if pruned > 0 {
      info!("dropped {pruned} entries from stale cache versions");
    }
    self.set_state(WorkerState::Active);
    pruned
  }

  /// Serve one request through the gateway's policies. `None` means neither
  /// the network nor a cache could produce a response.
  pub async fn handle(&self, request: &FetchRequest) -> Option<FetchResponse> {
    if self.is_data_request(&request.url) {
      self.network_first(request).await
    } else {
      self.cache_first(request).await
    }
  }

  /// Handle a background-sync wakeup. The known tag broadcasts `SyncData`
  /// to every subscribed context; unknown tags are ignored.
  pub fn background_sync(&self, tag: &str) {
    if tag != SYNC_TAG {
      debug!("ignoring unknown sync tag {tag}");
      return;
    }
    // Err means no open contexts right now; the queue waits for the next
    // trigger.
    let _ = self.messages.send(WorkerMessage::SyncData);
  }

  /// Subscribe an application context to gateway messages.
  pub fn subscribe(&self) -> broadcast::Receiver<WorkerMessage> {
    self.messages.subscribe()
  }

  fn is_data_request(&self, url: &Url) -> bool {
    url.origin() == self.data_origin.origin()
  }

  /// Data requests: freshest wins. A live 200 replaces the cached copy; a
  /// dead network serves the last cached response.
  async fn network_first(&self, request: &FetchRequest) -> Option<FetchResponse> {
    match self.transport.fetch(request).await {
      Ok(response) => {
        if response.status == 200 {
          if let Err(err) = self.cache.put(DATA_CACHE_NAME, &request.url, &response) {
            warn!("could not cache the data response for {}: {err}", request.url);
          }
        }
        Some(response)
      }
      Err(err) => {
        debug!("network fetch failed for {}, trying the data cache: {err}", request.url);
        self.cache_match(DATA_CACHE_NAME, &request.url)
      }
    }
  }

  /// Shell requests: a cached copy wins outright; otherwise the network.
  /// When both fail, a navigation falls back to the cached root document so
  /// a page load offline still renders the app.
  async fn cache_first(&self, request: &FetchRequest) -> Option<FetchResponse> {
    if let Some(cached) = self.cache_match(CACHE_NAME, &request.url) {
      return Some(cached);
    }
    match self.transport.fetch(request).await {
      Ok(response) => Some(response),
      Err(err) => {
        debug!("network fetch failed for {}: {err}", request.url);
        if request.mode == RequestMode::Navigate {
          if let Ok(root) = self.shell_origin.join("/") {
            return self.cache_match(CACHE_NAME, &root);
          }
        }
        None
      }
    }
  }

  fn cache_match(&self, cache_name: &str, url: &Url) -> Option<FetchResponse> {
    match self.cache.lookup(cache_name, url) {
      Ok(found) => found,
      Err(err) => {
        warn!("cache lookup failed for {url}: {err}");
        None
      }
    }
  }
}
