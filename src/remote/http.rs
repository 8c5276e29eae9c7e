//! HTTP object storage backend.
//!
//! Speaks the storage REST dialect used by hosted object storage services:
//! path-addressed upload/download under a bucket, folder listing via POST,
//! and signed URL issuance with a TTL. Authentication is a bearer token.

use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::RemoteConfig;
use crate::error::StoreError;

use super::backend::{ObjectInfo, ObjectStore};

/// Objects fetched per list request; folders larger than this are paged.
const LIST_PAGE: u32 = 1000;

#[derive(Serialize)]
struct ListRequest<'a> {
  prefix: &'a str,
  limit: u32,
  offset: u32,
  #[serde(rename = "sortBy")]
  sort_by: SortBy,
}

#[derive(Serialize)]
struct SortBy {
  column: &'static str,
  order: &'static str,
}

#[derive(Deserialize)]
struct ListedObject {
  name: String,
  #[serde(default)]
  metadata: Option<ListedMetadata>,
}

#[derive(Deserialize)]
struct ListedMetadata {
  #[serde(rename = "mimetype")]
  mime_type: Option<String>,
  size: Option<u64>,
}

#[derive(Serialize)]
struct SignRequest {
  #[serde(rename = "expiresIn")]
  expires_in: u64,
}

#[derive(Deserialize)]
struct SignResponse {
  #[serde(rename = "signedURL")]
  signed_url: String,
}

/// Object storage client over HTTP.
#[derive(Clone)]
pub struct HttpObjectStore {
  client: reqwest::Client,
  base_url: Url,
  bucket: String,
  token: String,
}

impl HttpObjectStore {
  /// Build a client for the configured storage endpoint.
  pub fn new(config: &RemoteConfig, token: impl Into<String>) -> Result<Self, StoreError> {
    let base_url =
      Url::parse(&config.base_url).map_err(|e| StoreError::Backend(e.to_string()))?;
    Ok(Self {
      client: reqwest::Client::new(),
      base_url,
      bucket: config.bucket.clone(),
      token: token.into(),
    })
  }

  fn endpoint(&self, segments: &str) -> Result<Url, StoreError> {
    self
      .base_url
      .join(segments)
      .map_err(|e| StoreError::Backend(e.to_string()))
  }

  fn map_status(status: StatusCode, path: &str) -> StoreError {
    match status {
      StatusCode::NOT_FOUND => StoreError::NotFound(path.to_string()),
      StatusCode::CONFLICT => StoreError::AlreadyExists(path.to_string()),
      StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
        StoreError::Denied(format!("{} for {}", status, path))
      }
      other => StoreError::Unavailable(format!("{} for {}", other, path)),
    }
  }

  fn map_transport(err: reqwest::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
  }
}

impl ObjectStore for HttpObjectStore {
  async fn put(
    &self,
    path: &str,
    bytes: Bytes,
    content_type: &str,
    upsert: bool,
  ) -> Result<(), StoreError> {
    let url = self.endpoint(&format!("object/{}/{}", self.bucket, path))?;
    let response = self
      .client
      .post(url)
      .bearer_auth(&self.token)
      .header("content-type", content_type)
      .header("x-upsert", if upsert { "true" } else { "false" })
      .body(bytes)
      .send()
      .await
      .map_err(Self::map_transport)?;

    if response.status().is_success() {
      Ok(())
    } else {
      Err(Self::map_status(response.status(), path))
    }
  }

  async fn get(&self, path: &str) -> Result<Bytes, StoreError> {
    let url = self.endpoint(&format!("object/{}/{}", self.bucket, path))?;
    let response = self
      .client
      .get(url)
      .bearer_auth(&self.token)
      .send()
      .await
      .map_err(Self::map_transport)?;

    if !response.status().is_success() {
      return Err(Self::map_status(response.status(), path));
    }
    response.bytes().await.map_err(Self::map_transport)
  }

  async fn list(&self, folder: &str) -> Result<Vec<ObjectInfo>, StoreError> {
    let url = self.endpoint(&format!("object/list/{}", self.bucket))?;

    // Page in a fixed name order until exhausted, so a folder holding more
    // versions than one page never hides its newest object.
    let mut infos = Vec::new();
    let mut offset = 0;
    loop {
      let response = self
        .client
        .post(url.clone())
        .bearer_auth(&self.token)
        .json(&ListRequest {
          prefix: folder,
          limit: LIST_PAGE,
          offset,
          sort_by: SortBy {
            column: "name",
            order: "asc",
          },
        })
        .send()
        .await
        .map_err(Self::map_transport)?;

      if !response.status().is_success() {
        return Err(Self::map_status(response.status(), folder));
      }

      let listed: Vec<ListedObject> = response.json().await.map_err(Self::map_transport)?;
      let page_len = listed.len();
      infos.extend(listed.into_iter().map(|obj| {
        let (content_type, size_bytes) = obj
          .metadata
          .map(|m| (m.mime_type, m.size))
          .unwrap_or((None, None));
        ObjectInfo {
          name: obj.name,
          content_type,
          size_bytes,
        }
      }));

      if page_len < LIST_PAGE as usize {
        return Ok(infos);
      }
      offset += LIST_PAGE;
    }
  }

  async fn delete(&self, path: &str) -> Result<(), StoreError> {
    let url = self.endpoint(&format!("object/{}/{}", self.bucket, path))?;
    let response = self
      .client
      .delete(url)
      .bearer_auth(&self.token)
      .send()
      .await
      .map_err(Self::map_transport)?;

    if response.status().is_success() {
      Ok(())
    } else {
      Err(Self::map_status(response.status(), path))
    }
  }

  async fn signed_url(&self, path: &str, ttl: Duration) -> Result<Url, StoreError> {
    let url = self.endpoint(&format!("object/sign/{}/{}", self.bucket, path))?;
    let response = self
      .client
      .post(url)
      .bearer_auth(&self.token)
      .json(&SignRequest {
        expires_in: ttl.as_secs(),
      })
      .send()
      .await
      .map_err(Self::map_transport)?;

    if !response.status().is_success() {
      return Err(Self::map_status(response.status(), path));
    }

    let signed: SignResponse = response.json().await.map_err(Self::map_transport)?;
    // The API returns a path relative to the storage root.
    self
      .base_url
      .join(signed.signed_url.trim_start_matches('/'))
      .map_err(|e| StoreError::Backend(e.to_string()))
  }
}
