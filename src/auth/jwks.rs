// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! ## Security
//!
//! - JWKS is fetched via HTTPS only (enforced in config)
//! - Keys are cached with a configurable TTL
//! - An expired set is served as-is while one background task refetches it
//! - An unknown `kid` triggers a refresh (key rotation), at most once per
//!   minimum refresh interval, so forged `kid`s cannot drive outbound fetches
//! - Every fetch is bounded by the fetch timeout
//!
//! Only signing keys are cached. Token verification results never are.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::{Mutex, RwLock};

use super::error::VerificationError;

/// Default JWKS cache TTL (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default minimum spacing between two fetches.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Default upper bound on one fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(2);

/// JWKS cache entry.
struct CacheEntry {
    jwks: JwkSet,
    fetched_at: Instant,
}

#[derive(Clone)]
enum KeySource {
    Remote { url: String, client: reqwest::Client },
    Static,
}

/// JWKS manager with caching.
///
/// Fetches and caches the identity provider's signing keys for ID token
/// verification.
#[derive(Clone)]
pub struct JwksManager {
    source: KeySource,
    /// Cache TTL
    cache_ttl: Duration,
    min_refresh_interval: Duration,
    fetch_timeout: Duration,
    /// Cached JWKS
    cache: Arc<RwLock<Option<CacheEntry>>>,
    /// Start of the last fetch attempt. Held for the duration of a fetch, so
    /// fetches never overlap.
    last_attempt: Arc<Mutex<Option<Instant>>>,
}

impl JwksManager {
    /// Create a new JWKS manager backed by a remote endpoint.
    ///
    /// # Arguments
    /// - `jwks_url`: The JWKS endpoint URL
    /// - `client`: HTTP client
    pub fn new(jwks_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            source: KeySource::Remote {
                url: jwks_url.into(),
                client,
            },
            cache_ttl: DEFAULT_CACHE_TTL,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            cache: Arc::new(RwLock::new(None)),
            last_attempt: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a manager over a fixed key set that is never refetched.
    pub fn from_static(jwks: JwkSet) -> Self {
        Self {
            source: KeySource::Static,
            cache_ttl: Duration::MAX,
            min_refresh_interval: Duration::MAX,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            cache: Arc::new(RwLock::new(Some(CacheEntry {
                jwks,
                fetched_at: Instant::now(),
            }))),
            last_attempt: Arc::new(Mutex::new(None)),
        }
    }

    /// Create with custom cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        if matches!(self.source, KeySource::Remote { .. }) {
            self.cache_ttl = ttl;
        }
        self
    }

    /// Minimum spacing between fetches triggered by expiry or unknown `kid`s.
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        if matches!(self.source, KeySource::Remote { .. }) {
            self.min_refresh_interval = interval;
        }
        self
    }

    /// Upper bound on one fetch. Keep it below the verification timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Get the JWKS URL (`None` for a static key set).
    pub fn jwks_url(&self) -> Option<&str> {
        match &self.source {
            KeySource::Remote { url, .. } => Some(url),
            KeySource::Static => None,
        }
    }

    /// Current key set.
    ///
    /// A fresh set is returned directly. An expired set is returned too, with
    /// a refetch started in the background. Only a cold cache waits on the
    /// network.
    async fn get_jwks(&self) -> Result<JwkSet, VerificationError> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = &*cache {
                if entry.fetched_at.elapsed() >= self.cache_ttl {
                    self.spawn_background_refresh();
                }
                return Ok(entry.jwks.clone());
            }
        }

        match self.refresh_if_due().await {
            Some(result) => result,
            // Another caller just fetched (or is throttled); use what it got.
            None => self
                .cached()
                .await
                .ok_or_else(|| VerificationError::KeyFetch("no signing keys available".to_string())),
        }
    }

    async fn cached(&self) -> Option<JwkSet> {
        self.cache.read().await.as_ref().map(|e| e.jwks.clone())
    }

    /// Refetch in a detached task unless a fetch is running or ran recently.
    fn spawn_background_refresh(&self) {
        let Ok(mut last_attempt) = self.last_attempt.clone().try_lock_owned() else {
            return;
        };
        if !self.refresh_due(*last_attempt) {
            return;
        }
        *last_attempt = Some(Instant::now());

        let manager = self.clone();
        tokio::spawn(async move {
            match manager.refresh().await {
                Ok(_) => tracing::debug!("JWKS refreshed in background"),
                Err(e) => tracing::warn!(error = %e, "JWKS refresh failed, serving stale keys"),
            }
            drop(last_attempt);
        });
    }

    fn refresh_due(&self, last_attempt: Option<Instant>) -> bool {
        !matches!(self.source, KeySource::Static)
            && last_attempt.is_none_or(|t| t.elapsed() >= self.min_refresh_interval)
    }

    /// Fetch JWKS from the endpoint, bounded by the fetch timeout.
    async fn fetch_jwks(&self) -> Result<JwkSet, VerificationError> {
        let (url, client) = match &self.source {
            KeySource::Remote { url, client } => (url, client),
            KeySource::Static => {
                return Err(VerificationError::KeyFetch(
                    "static key set cannot be refreshed".to_string(),
                ))
            }
        };

        let fetch = async {
            let response = client
                .get(url)
                .send()
                .await
                .map_err(|e| VerificationError::KeyFetch(e.to_string()))?;

            if !response.status().is_success() {
                return Err(VerificationError::KeyFetch(format!(
                    "HTTP {} from JWKS endpoint",
                    response.status()
                )));
            }

            response
                .json::<JwkSet>()
                .await
                .map_err(|e| VerificationError::KeyFetch(e.to_string()))
        };

        tokio::time::timeout(self.fetch_timeout, fetch)
            .await
            .map_err(|_| {
                VerificationError::KeyFetch(format!(
                    "JWKS endpoint did not answer within {} ms",
                    self.fetch_timeout.as_millis()
                ))
            })?
    }

    /// Get a decoding key for the given key ID.
    ///
    /// A cached set without the key is refreshed before giving up, so rotated
    /// keys are picked up before the TTL runs out. Within the minimum refresh
    /// interval the miss is answered from the cache alone.
    pub async fn get_decoding_key(
        &self,
        kid: &str,
    ) -> Result<(DecodingKey, Algorithm), VerificationError> {
        let jwks = self.get_jwks().await?;
        if let Some(jwk) = find_key(&jwks, kid) {
            return jwk_to_decoding_key(jwk);
        }

        let jwks = match self.refresh_if_due().await {
            Some(result) => {
                tracing::debug!(kid, "Unknown key id, refreshed JWKS");
                result?
            }
            None => {
                tracing::debug!(kid, "Unknown key id, JWKS refresh throttled");
                return Err(VerificationError::NoMatchingKey);
            }
        };
        let jwk = find_key(&jwks, kid).ok_or(VerificationError::NoMatchingKey)?;
        jwk_to_decoding_key(jwk)
    }

    /// Get any valid decoding key (for tokens without kid).
    pub async fn get_any_decoding_key(&self) -> Result<(DecodingKey, Algorithm), VerificationError> {
        let jwks = self.get_jwks().await?;

        // Try each key until one works
        for jwk in &jwks.keys {
            if let Ok(result) = jwk_to_decoding_key(jwk) {
                return Ok(result);
            }
        }

        Err(VerificationError::NoMatchingKey)
    }

    /// Fetch now unless a fetch started within the minimum refresh interval.
    ///
    /// Returns `None` when throttled. Concurrent callers wait for the running
    /// fetch and are then throttled.
    pub async fn refresh_if_due(&self) -> Option<Result<JwkSet, VerificationError>> {
        let mut last_attempt = self.last_attempt.lock().await;
        if !self.refresh_due(*last_attempt) {
            return None;
        }
        *last_attempt = Some(Instant::now());
        Some(self.refresh().await)
    }

    /// Fetch unconditionally and replace the cache on success.
    async fn refresh(&self) -> Result<JwkSet, VerificationError> {
        let jwks = self.fetch_jwks().await?;
        let mut cache = self.cache.write().await;
        *cache = Some(CacheEntry {
            jwks: jwks.clone(),
            fetched_at: Instant::now(),
        });
        Ok(jwks)
    }

    /// Check if JWKS is currently cached and valid.
    pub async fn is_cached(&self) -> bool {
        let cache = self.cache.read().await;
        if let Some(entry) = &*cache {
            entry.fetched_at.elapsed() < self.cache_ttl
        } else {
            false
        }
    }

    /// Whether any key set, fresh or expired, is available.
    pub async fn has_keys(&self) -> bool {
        self.cache.read().await.is_some()
    }
}

fn find_key<'a>(jwks: &'a JwkSet, kid: &str) -> Option<&'a Jwk> {
    jwks.keys
        .iter()
        .find(|k| k.common.key_id.as_deref() == Some(kid))
}

/// Convert a JWK to a DecodingKey.
fn jwk_to_decoding_key(jwk: &Jwk) -> Result<(DecodingKey, Algorithm), VerificationError> {
    let declared = jwk.common.key_algorithm;

    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => {
            let key = DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
                .map_err(|e| VerificationError::UnsupportedKey(format!("RSA key: {e}")))?;

            let alg = match declared {
                Some(KeyAlgorithm::RS384) => Algorithm::RS384,
                Some(KeyAlgorithm::RS512) => Algorithm::RS512,
                _ => Algorithm::RS256,
            };

            Ok((key, alg))
        }
        AlgorithmParameters::EllipticCurve(ec) => {
            let key = DecodingKey::from_ec_components(&ec.x, &ec.y)
                .map_err(|e| VerificationError::UnsupportedKey(format!("EC key: {e}")))?;

            let alg = match declared {
                Some(KeyAlgorithm::ES384) => Algorithm::ES384,
                _ => Algorithm::ES256,
            };

            Ok((key, alg))
        }
        AlgorithmParameters::OctetKey(oct) => {
            let key = DecodingKey::from_base64_secret(&oct.value)
                .map_err(|e| VerificationError::UnsupportedKey(format!("oct key: {e}")))?;

            let alg = match declared {
                Some(KeyAlgorithm::HS384) => Algorithm::HS384,
                Some(KeyAlgorithm::HS512) => Algorithm::HS512,
                _ => Algorithm::HS256,
            };

            Ok((key, alg))
        }
        _ => Err(VerificationError::UnsupportedKey(
            "unsupported key type in JWKS".to_string(),
        )),
    }
}
