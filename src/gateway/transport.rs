//! Transport boundary: requests, responses, and the live network fetcher.

use async_trait::async_trait;
use url::Url;

use crate::error::RemoteError;

/// How a request will be used; the gateway's fallback policy only cares
/// about this much of fetch semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
  /// A page navigation, eligible for the cached-root fallback.
  Navigate,
  /// Everything else: assets, API calls.
  Resource,
}

/// A request crossing the gateway.
#[derive(Debug, Clone)]
pub struct FetchRequest {
  pub url: Url,
  pub mode: RequestMode,
}

impl FetchRequest {
  pub fn resource(url: Url) -> Self {
    Self {
      url,
      mode: RequestMode::Resource,
    }
  }

  pub fn navigate(url: Url) -> Self {
    Self {
      url,
      mode: RequestMode::Navigate,
    }
  }
}

/// A response as the gateway caches and serves it.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
}

impl FetchResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// The live network under the gateway.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, RemoteError>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
  http: reqwest::Client,
}

impl HttpTransport {
  pub fn new() -> Result<Self, RemoteError> {
    Ok(Self {
      http: reqwest::Client::builder().build()?,
    })
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, RemoteError> {
    let response = self.http.get(request.url.clone()).send().await?;
    let status = response.status().as_u16();
    let content_type = response
      .headers()
      .get(reqwest::header::CONTENT_TYPE)
      .and_then(|value| value.to_str().ok())
      .map(String::from);
    let body = response.bytes().await?.to_vec();
    Ok(FetchResponse {
      status,
      content_type,
      body,
    })
  }
}
