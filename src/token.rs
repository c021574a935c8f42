//! Access token caching and the OAuth2 refresh-token exchange.
//!
//! The cache is a single slot behind the narrow [`TokenCache`] interface so
//! tests can substitute an in-memory store, and [`TokenBroker::with_token_retry`]
//! makes the one-shot retry-on-expiry budget explicit control flow.

use async_trait::async_trait;
use serde::Deserialize;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::provider::ProviderError;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to refresh token: {status}: {body}")]
    Exchange {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("token endpoint request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Key-value slot holding the one cached access token.
#[async_trait]
pub trait TokenCache: Send + Sync {
    async fn get(&self) -> Option<String>;
    async fn put(&self, value: &str, ttl: Duration);
    async fn clear(&self);
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// In-process cache: a single mutex-guarded slot with a deadline.
#[derive(Debug, Default)]
pub struct MemoryTokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl MemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenCache for MemoryTokenCache {
    async fn get(&self) -> Option<String> {
        let mut slot = self.slot.lock().await;
        match slot.as_ref() {
            Some(cached) if cached.expires_at > Instant::now() => Some(cached.value.clone()),
            Some(_) => {
                *slot = None;
                None
            }
            None => None,
        }
    }

    async fn put(&self, value: &str, ttl: Duration) {
        let mut slot = self.slot.lock().await;
        *slot = Some(CachedToken {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        });
    }

    async fn clear(&self) {
        let mut slot = self.slot.lock().await;
        *slot = None;
    }
}

/// Exchanges long-lived credentials for a fresh access token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn exchange(&self) -> Result<String, TokenError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// OAuth2 refresh-token flow against the provider's token endpoint.
pub struct OauthRefresher {
    http: reqwest::Client,
    token_url: String,
    refresh_token: String,
    client_id: String,
    client_secret: String,
}

impl OauthRefresher {
    pub fn new(
        http: reqwest::Client,
        token_url: String,
        refresh_token: String,
        client_id: String,
        client_secret: String,
    ) -> Self {
        Self {
            http,
            token_url,
            refresh_token,
            client_id,
            client_secret,
        }
    }
}

#[async_trait]
impl TokenSource for OauthRefresher {
    async fn exchange(&self) -> Result<String, TokenError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.refresh_token.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TokenError::Exchange { status, body });
        }
        let data: TokenResponse = response.json().await?;
        Ok(data.access_token)
    }
}

/// Static long-lived token configured directly, no refresh flow.
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: String) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn exchange(&self) -> Result<String, TokenError> {
        Ok(self.token.clone())
    }
}

/// Owns the cached token: all reads go through here, all writes happen here.
pub struct TokenBroker {
    cache: Box<dyn TokenCache>,
    source: Box<dyn TokenSource>,
    ttl: Duration,
}

impl TokenBroker {
    pub fn new(cache: Box<dyn TokenCache>, source: Box<dyn TokenSource>, ttl: Duration) -> Self {
        Self { cache, source, ttl }
    }

    /// Cached token if present, otherwise a fresh exchange.
    pub async fn get_valid_token(&self) -> Result<String, TokenError> {
        if let Some(token) = self.cache.get().await {
            return Ok(token);
        }
        self.refresh().await
    }

    /// Exchange unconditionally, bypassing the cache, and re-cache the result.
    pub async fn refresh(&self) -> Result<String, TokenError> {
        let token = self.source.exchange().await?;
        self.cache.put(&token, self.ttl).await;
        info!("access token refreshed");
        Ok(token)
    }

    /// Run a provider call with a valid token. If the provider signals an
    /// expired token, refresh once and re-run the call exactly once; any
    /// other failure, or a second consecutive expiry, propagates.
    pub async fn with_token_retry<F, Fut, T>(&self, call: F) -> Result<T, ProviderError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let token = self.get_valid_token().await?;
        match call(token).await {
            Err(ProviderError::TokenExpired) => {
                debug!("provider rejected cached token, refreshing once");
                let fresh = self.refresh().await?;
                call(fresh).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use std::sync::Arc;

    /// Mock source handing out "token-1", "token-2", ... and counting
    /// exchanges through a shared handle.
    struct CountingSource {
        exchanges: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn exchange(&self) -> Result<String, TokenError> {
            let n = self.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("token-{n}"))
        }
    }

    struct ExchangeCount(Arc<AtomicUsize>);

    impl ExchangeCount {
        fn get(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn broker(ttl: Duration) -> (TokenBroker, ExchangeCount) {
        let exchanges = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            exchanges: exchanges.clone(),
        };
        let broker = TokenBroker::new(Box::new(MemoryTokenCache::new()), Box::new(source), ttl);
        (broker, ExchangeCount(exchanges))
    }

    #[tokio::test]
    async fn cold_cache_triggers_exactly_one_exchange() {
        let (broker, exchanges) = broker(Duration::from_secs(60));

        let token = broker.get_valid_token().await.expect("token");
        assert_eq!(token, "token-1");
        assert_eq!(exchanges.get(), 1);

        // Second read comes from the cache.
        let token = broker.get_valid_token().await.expect("token");
        assert_eq!(token, "token-1");
        assert_eq!(exchanges.get(), 1);
    }

    #[tokio::test]
    async fn expired_cache_entry_is_replaced() {
        let (broker, exchanges) = broker(Duration::ZERO);

        assert_eq!(broker.get_valid_token().await.expect("token"), "token-1");
        assert_eq!(broker.get_valid_token().await.expect("token"), "token-2");
        assert_eq!(exchanges.get(), 2);
    }

    #[tokio::test]
    async fn refresh_bypasses_cache() {
        let (broker, _exchanges) = broker(Duration::from_secs(60));

        assert_eq!(broker.get_valid_token().await.expect("token"), "token-1");
        assert_eq!(broker.refresh().await.expect("token"), "token-2");
        // The forced refresh replaced the cached value.
        assert_eq!(broker.get_valid_token().await.expect("token"), "token-2");
    }

    #[tokio::test]
    async fn clear_empties_the_slot() {
        let cache = MemoryTokenCache::new();
        cache.put("abc", Duration::from_secs(60)).await;
        assert_eq!(cache.get().await.as_deref(), Some("abc"));
        cache.clear().await;
        assert!(cache.get().await.is_none());
    }

    #[tokio::test]
    async fn expiry_signal_refreshes_and_retries_once() {
        let (broker, exchanges) = broker(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        let result = broker
            .with_token_retry(|token| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(ProviderError::TokenExpired)
                    } else {
                        Ok(token)
                    }
                }
            })
            .await;

        assert_eq!(result.expect("retried call"), "token-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(exchanges.get(), 2);
    }

    #[tokio::test]
    async fn second_consecutive_expiry_propagates() {
        let (broker, exchanges) = broker(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        let result: Result<String, _> = broker
            .with_token_retry(|_token| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::TokenExpired) }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::TokenExpired)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(exchanges.get(), 2);
    }

    #[tokio::test]
    async fn non_expiry_failures_are_not_retried() {
        let (broker, exchanges) = broker(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        let result: Result<String, _> = broker
            .with_token_retry(|_token| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ProviderError::Api {
                        status: reqwest::StatusCode::BAD_GATEWAY,
                        body: "upstream down".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Api { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(exchanges.get(), 1);
    }

    #[tokio::test]
    async fn static_source_always_returns_configured_token() {
        let broker = TokenBroker::new(
            Box::new(MemoryTokenCache::new()),
            Box::new(StaticToken::new("fixed".into())),
            Duration::from_secs(60),
        );
        assert_eq!(broker.get_valid_token().await.expect("token"), "fixed");
        assert_eq!(broker.refresh().await.expect("token"), "fixed");
    }
}
