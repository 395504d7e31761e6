//! PostgREST-style client for the hosted database service.
//!
//! One route per table under `/rest/v1/`, filters as query parameters,
//! errors as a JSON object with a `message` field.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use url::Url;

use crate::entities::EntityKind;
use crate::error::RemoteError;

use super::RemoteService;

#[derive(Clone)]
pub struct RestClient {
  http: reqwest::Client,
  base: Url,
  api_key: String,
}

impl RestClient {
  /// `base` is the service origin, e.g. `https://project.example.co/`.
  pub fn new(base: Url, api_key: String) -> Result<Self, RemoteError> {
    let http = reqwest::Client::builder().build()?;
    Ok(Self { http, base, api_key })
  }

  fn table_url(&self, kind: EntityKind) -> Result<Url, RemoteError> {
    self
      .base
      .join(&format!("rest/v1/{}", kind.table_name()))
      .map_err(|err| RemoteError::new(format!("invalid service url: {err}")))
  }

  fn select_url(&self, kind: EntityKind) -> Result<Url, RemoteError> {
    let mut url = self.table_url(kind)?;
    url
      .query_pairs_mut()
      .append_pair("select", "*")
      .append_pair("order", "created_at.desc");
    Ok(url)
  }

  fn row_url(&self, kind: EntityKind, id: &str) -> Result<Url, RemoteError> {
    let mut url = self.table_url(kind)?;
    url.query_pairs_mut().append_pair("id", &format!("eq.{id}"));
    Ok(url)
  }

  async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, RemoteError> {
    let response = request
      .header("apikey", &self.api_key)
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .send()
      .await?;
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::new(error_message(status.as_u16(), &body)))
  }

  fn json_body(value: &Value) -> Result<Vec<u8>, RemoteError> {
    serde_json::to_vec(value).map_err(|err| RemoteError::new(format!("unencodable payload: {err}")))
  }
}

/// Prefer the service's own `message` field; fall back to the raw body.
fn error_message(status: u16, body: &str) -> String {
  let detail = serde_json::from_str::<Value>(body)
    .ok()
    .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
    .unwrap_or_else(|| body.chars().take(200).collect());
  if detail.is_empty() {
    format!("service returned status {status}")
  } else {
    format!("service returned status {status}: {detail}")
  }
}

#[async_trait]
impl RemoteService for RestClient {
  async fn select_all(&self, kind: EntityKind) -> Result<Vec<Value>, RemoteError> {
    let url = self.select_url(kind)?;
    let response = self.send(self.http.get(url)).await?;
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes)
      .map_err(|err| RemoteError::new(format!("undecodable {kind} response: {err}")))
  }

  async fn insert(&self, kind: EntityKind, record: Value) -> Result<(), RemoteError> {
    let url = self.table_url(kind)?;
    let body = Self::json_body(&Value::Array(vec![record]))?;
    self
      .send(
        self
          .http
          .post(url)
          .header(CONTENT_TYPE, "application/json")
          .header("Prefer", "return=minimal")
          .body(body),
      )
      .await?;
    Ok(())
  }

  async fn update(&self, kind: EntityKind, id: &str, patch: Value) -> Result<(), RemoteError> {
    let url = self.row_url(kind, id)?;
    let body = Self::json_body(&patch)?;
    self
      .send(
        self
          .http
          .patch(url)
          .header(CONTENT_TYPE, "application/json")
          .header("Prefer", "return=minimal")
          .body(body),
      )
      .await?;
    Ok(())
  }

  async fn delete(&self, kind: EntityKind, id: &str) -> Result<(), RemoteError> {
    let url = self.row_url(kind, id)?;
    self.send(self.http.delete(url)).await?;
    Ok(())
  }
}
