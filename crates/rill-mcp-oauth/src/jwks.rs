//! JWKS key material: local sets and cached remote sets with rotation.

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::verifier::VerifyError;

/// Fetches a JWKS document from a URL. Abstracted so tests can rotate
/// keys without a network.
#[async_trait]
pub trait JwksFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<JwkSet, VerifyError>;
}

/// The default fetcher, backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpJwksFetcher {
    client: reqwest::Client,
}

impl HttpJwksFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpJwksFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JwksFetcher for HttpJwksFetcher {
    async fn fetch(&self, url: &str) -> Result<JwkSet, VerifyError> {
        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|err| VerifyError::other(format!("JWKS fetch failed: {err}")))?;

        if !response.status().is_success() {
            return Err(VerifyError::other(format!(
                "JWKS endpoint returned status {}",
                response.status()
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|err| VerifyError::other(format!("invalid JWKS document: {err}")))
    }
}

/// A fixed key set loaded from inline JSON and/or a file.
#[derive(Debug, Clone, Default)]
pub struct LocalKeySet {
    keys: Vec<Jwk>,
}

impl LocalKeySet {
    pub fn from_json(json: &str) -> Result<Self, VerifyError> {
        let set: JwkSet = serde_json::from_str(json)
            .map_err(|err| VerifyError::other(format!("invalid JWKS JSON: {err}")))?;
        Ok(Self { keys: set.keys })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, VerifyError> {
        let json = std::fs::read_to_string(path.as_ref())
            .map_err(|err| VerifyError::other(format!("cannot read JWKS file: {err}")))?;
        Self::from_json(&json)
    }

    /// Merge another set in (inline JSON + file are additive).
    pub fn merge(mut self, other: LocalKeySet) -> Self {
        self.keys.extend(other.keys);
        self
    }

    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys
            .iter()
            .find(|key| key.common.key_id.as_deref() == Some(kid))
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Remote key set configuration.
#[derive(Debug, Clone)]
pub struct RemoteKeySetConfig {
    /// JWKS URLs polled on refresh.
    pub urls: Vec<String>,
    /// Issuer→URL overrides, consulted before the flat list.
    pub issuer_urls: HashMap<String, String>,
    /// How long a fetched set stays fresh.
    pub refresh_interval: Duration,
}

impl Default for RemoteKeySetConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            issuer_urls: HashMap::new(),
            refresh_interval: Duration::from_secs(60 * 60),
        }
    }
}

struct CachedKeys {
    keys: Vec<Jwk>,
    fetched_at: Option<Instant>,
    generation: u64,
}

/// Remote JWKS with TTL caching and rotation handling.
///
/// When a token's `kid` is absent from the cached set, the set is
/// force-refreshed exactly once before failing; the refresh is guarded
/// by a single-flight lock so concurrent misses do not stampede the
/// authorization server.
pub struct RemoteKeySet {
    config: RemoteKeySetConfig,
    fetcher: Arc<dyn JwksFetcher>,
    cache: RwLock<CachedKeys>,
    refresh_lock: Mutex<()>,
}

impl RemoteKeySet {
    pub fn new(config: RemoteKeySetConfig) -> Self {
        Self::with_fetcher(config, Arc::new(HttpJwksFetcher::new()))
    }

    pub fn with_fetcher(config: RemoteKeySetConfig, fetcher: Arc<dyn JwksFetcher>) -> Self {
        Self {
            config,
            fetcher,
            cache: RwLock::new(CachedKeys {
                keys: Vec::new(),
                fetched_at: None,
                generation: 0,
            }),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Look up a key by `kid`, fetching or rotating the cache as needed.
    pub async fn key_for(&self, kid: &str, issuer: Option<&str>) -> Result<Option<Jwk>, VerifyError> {
        // fresh-enough cache first
        {
            let cache = self.cache.read().await;
            let fresh = cache
                .fetched_at
                .is_some_and(|at| at.elapsed() < self.config.refresh_interval);
            if fresh {
                if let Some(key) = find_key(&cache.keys, kid) {
                    return Ok(Some(key));
                }
            }
        }

        // stale, empty, or kid miss: refresh once and retry
        self.refresh(issuer).await?;

        let cache = self.cache.read().await;
        Ok(find_key(&cache.keys, kid))
    }

    /// Refresh the cached set. Single-flight: concurrent callers wait
    /// for the in-flight fetch and reuse its result.
    async fn refresh(&self, issuer: Option<&str>) -> Result<(), VerifyError> {
        let observed_generation = self.cache.read().await.generation;
        let _flight = self.refresh_lock.lock().await;

        // someone else refreshed while we waited
        if self.cache.read().await.generation != observed_generation {
            return Ok(());
        }

        let mut urls: Vec<&str> = Vec::new();
        if let Some(url) = issuer.and_then(|iss| self.config.issuer_urls.get(iss)) {
            urls.push(url);
        }
        urls.extend(self.config.urls.iter().map(String::as_str));

        if urls.is_empty() {
            return Err(VerifyError::other("no JWKS URLs configured"));
        }

        let mut keys = Vec::new();
        let mut last_error = None;
        for url in urls {
            match self.fetcher.fetch(url).await {
                Ok(set) => {
                    debug!(url, key_count = set.keys.len(), "fetched JWKS");
                    keys.extend(set.keys);
                }
                Err(err) => {
                    warn!(url, error = %err, "JWKS fetch failed");
                    last_error = Some(err);
                }
            }
        }

        if keys.is_empty() {
            return Err(last_error.unwrap_or_else(|| VerifyError::other("empty JWKS")));
        }

        let mut cache = self.cache.write().await;
        cache.keys = keys;
        cache.fetched_at = Some(Instant::now());
        cache.generation += 1;
        info!(key_count = cache.keys.len(), "JWKS cache refreshed");
        Ok(())
    }
}

fn find_key(keys: &[Jwk], kid: &str) -> Option<Jwk> {
    keys.iter()
        .find(|key| key.common.key_id.as_deref() == Some(kid))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn oct_jwk(kid: &str) -> serde_json::Value {
        // symmetric key entries are enough to exercise cache plumbing
        serde_json::json!({
            "kty": "oct",
            "kid": kid,
            "k": "c2VjcmV0LXNpZ25pbmcta2V5LTAxMjM0NTY3ODlhYmNkZWY"
        })
    }

    struct ScriptedFetcher {
        calls: AtomicUsize,
        sets: Vec<JwkSet>,
    }

    impl ScriptedFetcher {
        fn new(sets: Vec<serde_json::Value>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                sets: sets
                    .into_iter()
                    .map(|keys| serde_json::from_value(serde_json::json!({ "keys": keys })).unwrap())
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl JwksFetcher for ScriptedFetcher {
        async fn fetch(&self, _url: &str) -> Result<JwkSet, VerifyError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let index = call.min(self.sets.len() - 1);
            Ok(self.sets[index].clone())
        }
    }

    fn remote_with(fetcher: Arc<ScriptedFetcher>) -> RemoteKeySet {
        RemoteKeySet::with_fetcher(
            RemoteKeySetConfig {
                urls: vec!["https://as.example.com/jwks".to_string()],
                ..Default::default()
            },
            fetcher,
        )
    }

    #[tokio::test]
    async fn test_initial_fetch_and_cache() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![serde_json::json!([oct_jwk("k1")])]));
        let remote = remote_with(fetcher.clone());

        assert!(remote.key_for("k1", None).await.unwrap().is_some());
        assert!(remote.key_for("k1", None).await.unwrap().is_some());
        // second lookup came from cache
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rotation_refreshes_on_kid_miss() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            serde_json::json!([oct_jwk("old")]),
            serde_json::json!([oct_jwk("old"), oct_jwk("new")]),
        ]));
        let remote = remote_with(fetcher.clone());

        // warm the cache with the pre-rotation set
        assert!(remote.key_for("old", None).await.unwrap().is_some());

        // unknown kid forces exactly one refresh, which finds the new key
        assert!(remote.key_for("new", None).await.unwrap().is_some());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_kid_still_missing_after_refresh() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![serde_json::json!([oct_jwk("k1")])]));
        let remote = remote_with(fetcher.clone());

        assert!(remote.key_for("ghost", None).await.unwrap().is_none());
        // one refresh happened, not a loop
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_issuer_url_override_consulted_first() {
        struct UrlRecorder(std::sync::Mutex<Vec<String>>);

        #[async_trait]
        impl JwksFetcher for UrlRecorder {
            async fn fetch(&self, url: &str) -> Result<JwkSet, VerifyError> {
                self.0.lock().unwrap().push(url.to_string());
                Ok(serde_json::from_value(serde_json::json!({"keys": [oct_jwk("k1")]})).unwrap())
            }
        }

        let recorder = Arc::new(UrlRecorder(std::sync::Mutex::new(Vec::new())));
        let remote = RemoteKeySet::with_fetcher(
            RemoteKeySetConfig {
                urls: vec!["https://fallback.example.com/jwks".to_string()],
                issuer_urls: HashMap::from([(
                    "https://as.example.com".to_string(),
                    "https://as.example.com/jwks".to_string(),
                )]),
                ..Default::default()
            },
            recorder.clone(),
        );

        remote
            .key_for("k1", Some("https://as.example.com"))
            .await
            .unwrap();
        let urls = recorder.0.lock().unwrap().clone();
        assert_eq!(urls[0], "https://as.example.com/jwks");
    }

    #[test]
    fn test_local_keyset_parse_and_find() {
        let set = LocalKeySet::from_json(
            &serde_json::json!({"keys": [oct_jwk("local-1")]}).to_string(),
        )
        .unwrap();
        assert!(set.find("local-1").is_some());
        assert!(set.find("other").is_none());
    }
}
