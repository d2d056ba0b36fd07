//! Cached provider signing keys.
//!
//! The set is fetched lazily: on first use, after the TTL lapses, and when a
//! token names a key id the cached set does not know (rotation). Concurrent
//! misses share a single fetch. A failed refresh keeps serving the last good
//! set and retries after a short back-off.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::JwkSet;
use tokio::sync::{Mutex, RwLock};

use super::SsoError;
use crate::clock::Clock;
use crate::observability::JWKS_FETCHES_TOTAL;

/// Wait this long after a failed refresh before trying the source again.
const FAILED_REFRESH_BACKOFF: Duration = Duration::from_secs(30);

/// Minimum age before an unknown key id may force a refetch.
const ROTATION_REFETCH_AFTER: Duration = Duration::from_secs(30);

#[async_trait]
pub trait KeySetSource: Send + Sync {
    async fn fetch(&self) -> Result<JwkSet, SsoError>;
}

pub struct HttpKeySetSource {
    http: reqwest::Client,
    url: String,
}

impl HttpKeySetSource {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl KeySetSource for HttpKeySetSource {
    async fn fetch(&self) -> Result<JwkSet, SsoError> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| SsoError::KeySetUnavailable(format!("request: {e}")))?;
        if !response.status().is_success() {
            return Err(SsoError::KeySetUnavailable(format!(
                "status {}",
                response.status()
            )));
        }
        response
            .json::<JwkSet>()
            .await
            .map_err(|e| SsoError::KeySetUnavailable(format!("body: {e}")))
    }
}

/// In-memory source for tests and fixed deployments. `None` simulates an outage.
#[derive(Default)]
pub struct StaticKeySet {
    keys: std::sync::Mutex<Option<JwkSet>>,
    fetches: AtomicUsize,
}

impl StaticKeySet {
    pub fn new(keys: JwkSet) -> Self {
        Self {
            keys: std::sync::Mutex::new(Some(keys)),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, keys: Option<JwkSet>) {
        *self.keys.lock().unwrap_or_else(|e| e.into_inner()) = keys;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySetSource for StaticKeySet {
    async fn fetch(&self) -> Result<JwkSet, SsoError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| SsoError::KeySetUnavailable("key source offline".into()))
    }
}

#[derive(Clone)]
struct Cached {
    keys: Arc<JwkSet>,
    fetched_at: DateTime<Utc>,
    /// Next time the source should be asked again.
    refresh_at: DateTime<Utc>,
}

pub struct KeySetCache {
    source: Arc<dyn KeySetSource>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    cached: RwLock<Option<Cached>>,
    refresh: Mutex<()>,
}

impl KeySetCache {
    pub fn new(source: Arc<dyn KeySetSource>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            ttl,
            clock,
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// Decoding key for `kid`. A token without a key id is accepted only
    /// when the set holds exactly one key.
    pub async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, SsoError> {
        let keys = self.keys().await?;
        if let Some(key) = select(&keys, kid)? {
            return Ok(key);
        }

        let keys = self.refetch_for_unknown_kid().await?;
        select(&keys, kid)?.ok_or(SsoError::InvalidSignature)
    }

    /// Current key set, refreshing it if the TTL has lapsed.
    pub async fn keys(&self) -> Result<Arc<JwkSet>, SsoError> {
        if let Some(keys) = self.fresh().await {
            return Ok(keys);
        }
        let _flight = self.refresh.lock().await;
        // Another caller may have refreshed while this one waited.
        if let Some(keys) = self.fresh().await {
            return Ok(keys);
        }
        self.fetch_locked().await
    }

    async fn refetch_for_unknown_kid(&self) -> Result<Arc<JwkSet>, SsoError> {
        let _flight = self.refresh.lock().await;
        if let Some(cached) = self.cached.read().await.clone() {
            let age = self.clock.now() - cached.fetched_at;
            if age < to_chrono(ROTATION_REFETCH_AFTER) {
                return Ok(cached.keys);
            }
        }
        self.fetch_locked().await
    }

    async fn fresh(&self) -> Option<Arc<JwkSet>> {
        let cached = self.cached.read().await;
        let cached = cached.as_ref()?;
        (self.clock.now() < cached.refresh_at).then(|| cached.keys.clone())
    }

    /// Caller holds `self.refresh`.
    async fn fetch_locked(&self) -> Result<Arc<JwkSet>, SsoError> {
        let now = self.clock.now();
        match self.source.fetch().await {
            Ok(set) => {
                metrics::counter!(JWKS_FETCHES_TOTAL, "outcome" => "ok").increment(1);
                tracing::debug!(keys = set.keys.len(), "refreshed SSO signing keys");
                let keys = Arc::new(set);
                *self.cached.write().await = Some(Cached {
                    keys: keys.clone(),
                    fetched_at: now,
                    refresh_at: after(now, self.ttl),
                });
                Ok(keys)
            }
            Err(e) => {
                let mut cached = self.cached.write().await;
                match cached.as_mut() {
                    Some(stale) => {
                        metrics::counter!(JWKS_FETCHES_TOTAL, "outcome" => "stale").increment(1);
                        tracing::warn!(error = %e, "key set refresh failed, serving last known keys");
                        stale.refresh_at = after(now, FAILED_REFRESH_BACKOFF);
                        Ok(stale.keys.clone())
                    }
                    None => {
                        metrics::counter!(JWKS_FETCHES_TOTAL, "outcome" => "error").increment(1);
                        tracing::error!(error = %e, "key set fetch failed");
                        Err(e)
                    }
                }
            }
        }
    }
}

fn select(keys: &JwkSet, kid: Option<&str>) -> Result<Option<DecodingKey>, SsoError> {
    let jwk = match kid {
        Some(kid) => keys.find(kid),
        None => match keys.keys.as_slice() {
            [only] => Some(only),
            _ => return Err(SsoError::Malformed("token header has no key id".into())),
        },
    };
    jwk.map(|jwk| {
        DecodingKey::from_jwk(jwk).map_err(|e| SsoError::KeySetUnavailable(format!("unusable key: {e}")))
    })
    .transpose()
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

fn after(now: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    now.checked_add_signed(to_chrono(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
