//! Optional remote key-value mirror for learner records.
//!
//! Records live at `{base_url}/users/{key}.json`, written with PUT and read with
//! GET, with an optional `auth` query token. A missing record reads back as JSON
//! `null`. Local storage stays the source of truth: callers log mirror failures
//! and carry on.
//!
//! NOTE: We never log the auth token.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::USER_AGENT;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

use crate::config::MirrorCfg;
use crate::domain::User;
use crate::error::ServiceError;
use crate::store::Versioned;
use crate::util::{sanitize_key, trunc_for_log};

#[derive(Clone)]
pub struct KvMirror {
  pub client: reqwest::Client,
  pub base_url: String,
  auth_token: Option<String>,
}

impl KvMirror {
  /// Build from NST_MIRROR_URL / NST_MIRROR_TOKEN, falling back to the `[mirror]`
  /// config section. Returns None when neither names a base URL.
  pub fn from_env(cfg: Option<&MirrorCfg>) -> Option<Self> {
    let base_url = std::env::var("NST_MIRROR_URL")
      .ok()
      .or_else(|| cfg.map(|c| c.base_url.clone()))?;
    let auth_token = std::env::var("NST_MIRROR_TOKEN")
      .ok()
      .or_else(|| cfg.and_then(|c| c.auth_token.clone()));
    let timeout = cfg.map(|c| c.timeout_secs).unwrap_or(10);
    Self::new(base_url, auth_token, Duration::from_secs(timeout))
  }

  pub fn new(base_url: String, auth_token: Option<String>, timeout: Duration) -> Option<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .ok()?;
    let base_url = base_url.trim_end_matches('/').to_string();
    Some(Self { client, base_url, auth_token })
  }

  pub fn user_url(&self, id: &str) -> String {
    format!("{}/users/{}.json", self.base_url, sanitize_key(id))
  }

  fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    let req = req.header(USER_AGENT, "nst-backend/0.1");
    match &self.auth_token {
      Some(token) => req.query(&[("auth", token.as_str())]),
      None => req,
    }
  }

  #[instrument(level = "info", skip(self, user), fields(id = %user.id))]
  pub async fn push_user(&self, user: &User) -> Result<(), ServiceError> {
    let started = std::time::Instant::now();
    let res = self
      .with_auth(self.client.put(self.user_url(&user.id)))
      .json(user)
      .send()
      .await
      .map_err(|e| ServiceError::Mirror(format!("PUT failed: {e}")))?;

    let status = res.status();
    if !status.is_success() {
      let body = res.text().await.unwrap_or_default();
      return Err(ServiceError::Mirror(format!("PUT returned {}: {}", status, trunc_for_log(&body, 200))));
    }
    info!(target: "mirror", id = %user.id, elapsed_ms = started.elapsed().as_millis() as u64, "User mirrored");
    Ok(())
  }

  #[instrument(level = "info", skip(self))]
  pub async fn fetch_user(&self, id: &str) -> Result<Option<User>, ServiceError> {
    let res = self
      .with_auth(self.client.get(self.user_url(id)))
      .send()
      .await
      .map_err(|e| ServiceError::Mirror(format!("GET failed: {e}")))?;

    let status = res.status();
    if status == reqwest::StatusCode::NOT_FOUND {
      return Ok(None);
    }
    let body = res.text().await.map_err(|e| ServiceError::Mirror(format!("GET body: {e}")))?;
    if !status.is_success() {
      return Err(ServiceError::Mirror(format!("GET returned {}: {}", status, trunc_for_log(&body, 200))));
    }
    serde_json::from_str::<Option<User>>(&body)
      .map_err(|e| ServiceError::Mirror(format!("bad record: {e}; body={}", trunc_for_log(&body, 200))))
  }
}

/// Background writer for the mirror. One task drains the queue in arrival order,
/// so a slow PUT can never be overtaken by a later one. Records queued while a
/// PUT is in flight are coalesced to the newest version per id.
#[derive(Clone)]
pub struct MirrorWriter {
  tx: mpsc::UnboundedSender<Versioned<User>>,
}

impl MirrorWriter {
  /// Must be called from inside a tokio runtime.
  pub fn spawn(mirror: KvMirror) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_writer(mirror, rx));
    Self { tx }
  }

  pub fn enqueue(&self, record: &Versioned<User>) {
    if self.tx.send(record.clone()).is_err() {
      error!(target: "mirror", id = %record.value.id, version = record.version, "Mirror writer stopped; record not mirrored");
    }
  }
}

async fn run_writer(mirror: KvMirror, mut rx: mpsc::UnboundedReceiver<Versioned<User>>) {
  let mut pushed: HashMap<String, u64> = HashMap::new();

  while let Some(first) = rx.recv().await {
    let mut batch = vec![first];
    while let Ok(next) = rx.try_recv() {
      batch.push(next);
    }

    for record in newest_per_id(batch) {
      if pushed.get(&record.value.id).is_some_and(|&v| v >= record.version) {
        debug!(target: "mirror", id = %record.value.id, version = record.version, "Skipping superseded record");
        continue;
      }
      match mirror.push_user(&record.value).await {
        Ok(()) => {
          pushed.insert(record.value.id.clone(), record.version);
        }
        Err(e) => {
          error!(target: "mirror", id = %record.value.id, version = record.version, error = %e, "Mirror write failed; local copy kept");
        }
      }
    }
  }
  debug!(target: "mirror", "Mirror writer finished");
}

/// Keep first-seen order of ids, but only the highest version of each.
fn newest_per_id(batch: Vec<Versioned<User>>) -> Vec<Versioned<User>> {
  let mut latest: Vec<Versioned<User>> = Vec::with_capacity(batch.len());
  for record in batch {
    match latest.iter_mut().find(|r| r.value.id == record.value.id) {
      Some(slot) if slot.version < record.version => *slot = record,
      Some(_) => {}
      None => latest.push(record),
    }
  }
  latest
}
