//! reqwest-backed collaborators for the content API.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{config_bool, config_string, ContentFetcher, NetworkProbe, RemoteConfigClient};
use crate::config::ApiConfig;
use crate::content::ContentKind;
use crate::error::Failure;

/// Reachability checks must answer quickly.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Path of the remote config document, relative to the API root.
const REMOTE_CONFIG_PATH: &str = "config";

fn build_client(timeout: Duration, token: Option<&str>) -> Result<reqwest::Client> {
  let mut headers = HeaderMap::new();
  if let Some(token) = token {
    let value = HeaderValue::from_str(&format!("Bearer {}", token))
      .map_err(|e| eyre!("Invalid API token: {}", e))?;
    headers.insert(AUTHORIZATION, value);
  }

  reqwest::Client::builder()
    .timeout(timeout)
    .default_headers(headers)
    .build()
    .map_err(|e| eyre!("Failed to create HTTP client: {}", e))
}

/// Make sure relative joins append to the base path instead of replacing its
/// last segment.
fn directory_url(base: &Url) -> Url {
  let mut base = base.clone();
  if !base.path().ends_with('/') {
    let path = format!("{}/", base.path());
    base.set_path(&path);
  }
  base
}

fn request_failure(e: reqwest::Error) -> Failure {
  if e.is_connect() {
    Failure::Offline
  } else {
    Failure::request(e)
  }
}

async fn get_json(client: &reqwest::Client, url: Url) -> Result<Value, Failure> {
  client
    .get(url)
    .send()
    .await
    .and_then(|response| response.error_for_status())
    .map_err(request_failure)?
    .json::<Value>()
    .await
    .map_err(Failure::request)
}

/// Content fetcher wrapper
#[derive(Clone)]
pub struct HttpContentFetcher {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpContentFetcher {
  pub fn new(base_url: &Url, api: &ApiConfig, token: Option<&str>) -> Result<Self> {
    let client = build_client(Duration::from_secs(api.timeout_secs), token)?;
    Ok(Self {
      client,
      base_url: directory_url(base_url),
    })
  }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
  async fn fetch(&self, kind: ContentKind) -> Result<Value, Failure> {
    let url = self
      .base_url
      .join(kind.cache_key())
      .map_err(|e| Failure::Request(format!("bad endpoint for {}: {}", kind, e)))?;

    debug!(%url, "fetching content");
    get_json(&self.client, url).await
  }
}

/// Reachability probe that asks the API host for any response.
#[derive(Clone)]
pub struct HttpProbe {
  client: reqwest::Client,
  target: Url,
}

impl HttpProbe {
  pub fn new(target: &Url) -> Result<Self> {
    Ok(Self {
      client: build_client(PROBE_TIMEOUT, None)?,
      target: target.clone(),
    })
  }
}

#[async_trait]
impl NetworkProbe for HttpProbe {
  async fn is_online(&self) -> bool {
    // Any HTTP status proves reachability
    match self.client.head(self.target.clone()).send().await {
      Ok(_) => true,
      Err(e) => {
        debug!(error = %e, "reachability probe failed");
        false
      }
    }
  }
}

/// Remote config fetched as a flat JSON object, layered over local defaults.
pub struct HttpRemoteConfig {
  client: reqwest::Client,
  url: Url,
  defaults: HashMap<String, Value>,
  values: RwLock<HashMap<String, Value>>,
}

impl HttpRemoteConfig {
  pub fn new(
    base_url: &Url,
    api: &ApiConfig,
    token: Option<&str>,
    defaults: HashMap<String, Value>,
  ) -> Result<Self> {
    let url = directory_url(base_url)
      .join(REMOTE_CONFIG_PATH)
      .map_err(|e| eyre!("Invalid remote config URL: {}", e))?;

    Ok(Self {
      client: build_client(Duration::from_secs(api.timeout_secs), token)?,
      url,
      values: RwLock::new(defaults.clone()),
      defaults,
    })
  }
}

#[async_trait]
impl RemoteConfigClient for HttpRemoteConfig {
  async fn initialize(&self, fetch_remote: bool) -> Result<(), Failure> {
    *self.values.write().unwrap_or_else(|e| e.into_inner()) = self.defaults.clone();
    if !fetch_remote {
      return Ok(());
    }

    let remote = get_json(&self.client, self.url.clone()).await?;
    let Value::Object(remote) = remote else {
      return Err(Failure::InvalidPayload(
        "remote config is not an object".to_string(),
      ));
    };

    let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
    values.extend(remote);
    debug!(keys = values.len(), "remote config activated");
    Ok(())
  }

  fn get_string(&self, key: &str) -> Option<String> {
    config_string(self.values.read().unwrap_or_else(|e| e.into_inner()).get(key))
  }

  fn get_bool(&self, key: &str) -> Option<bool> {
    config_bool(self.values.read().unwrap_or_else(|e| e.into_inner()).get(key))
  }
}
