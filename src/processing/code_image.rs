//! Scannable-code images for the footer.
//!
//! Fetching is best effort: any failure yields `None` and the footer draws a
//! placeholder block instead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use tracing::{debug, warn};

use crate::config::CaptureConfig;
use crate::core::bounded_cache::BoundedCache;
use crate::error::{CaptureError, CaptureResult};

#[async_trait]
pub trait CodeImageProvider: Send + Sync {
    /// Code image encoding `link`, or `None` when unavailable.
    async fn fetch_code(&self, link: &str) -> Option<Arc<RgbaImage>>;
}

/// Always unavailable; footers get the placeholder.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCodeProvider;

#[async_trait]
impl CodeImageProvider for NoCodeProvider {
    async fn fetch_code(&self, _link: &str) -> Option<Arc<RgbaImage>> {
        None
    }
}

/// Fetches code images from an HTTP rendering endpoint, caching successes.
pub struct HttpCodeProvider {
    client: reqwest::Client,
    endpoint: String,
    cache: BoundedCache<String, Arc<RgbaImage>>,
}

impl HttpCodeProvider {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        cache_capacity: usize,
        cache_ttl: Duration,
    ) -> CaptureResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CaptureError::external("reqwest", e))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            cache: BoundedCache::new(cache_capacity, cache_ttl),
        })
    }

    pub fn from_config(config: &CaptureConfig) -> CaptureResult<Self> {
        Self::new(
            config.code_endpoint.clone(),
            config.code_timeout(),
            config.code_cache_capacity,
            config.code_cache_ttl(),
        )
    }

    /// Endpoint URL with `data` set to the form-encoded `link`.
    pub fn request_url(&self, link: &str) -> CaptureResult<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.endpoint).map_err(|e| {
            CaptureError::validation("code_endpoint", "must be a valid URL", e.to_string())
        })?;
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != "data")
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair("data", link);
        Ok(url)
    }

    async fn download(&self, link: &str) -> CaptureResult<RgbaImage> {
        let url = self.request_url(link)?;
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(CaptureError::network(
                "fetch code image",
                Some(url.to_string()),
                None,
            )
            .with_context(format!("status {}", response.status())));
        }
        let bytes = response.bytes().await?;
        Ok(image::load_from_memory(&bytes)?.to_rgba8())
    }

    pub fn cache_stats(&self) -> (usize, usize) {
        self.cache.stats()
    }
}

#[async_trait]
impl CodeImageProvider for HttpCodeProvider {
    async fn fetch_code(&self, link: &str) -> Option<Arc<RgbaImage>> {
        if link.is_empty() {
            return None;
        }
        let key = link.to_string();
        if let Some(image) = self.cache.get(&key) {
            debug!(link, "Code image cache hit");
            return Some(image);
        }
        match self.download(link).await {
            Ok(image) => {
                let image = Arc::new(image);
                self.cache.insert(key, Arc::clone(&image));
                Some(image)
            }
            Err(err) => {
                warn!(link, error = %err, "Code image unavailable, using placeholder");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(endpoint: &str) -> HttpCodeProvider {
        HttpCodeProvider::new(endpoint, Duration::from_millis(200), 4, Duration::from_secs(60))
            .unwrap()
    }

    #[test]
    fn request_url_encodes_link_into_data() {
        let provider = provider(crate::config::config::DEFAULT_CODE_ENDPOINT);
        let url = provider
            .request_url("https://example.com/a b?x=1&y=2")
            .unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(pairs[0], ("size".to_string(), "180x180".to_string()));
        assert_eq!(pairs[1], ("margin".to_string(), "0".to_string()));
        assert_eq!(
            pairs[2],
            ("data".to_string(), "https://example.com/a b?x=1&y=2".to_string())
        );
        assert_eq!(pairs.len(), 3);
    }

    #[test]
    fn bad_endpoint_is_a_validation_error() {
        let provider = provider("not a url");
        let err = provider.request_url("https://example.com").unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[tokio::test]
    async fn unreachable_endpoint_degrades_to_none() {
        let provider = provider("http://127.0.0.1:9/qr?data=");
        assert!(provider.fetch_code("https://example.com").await.is_none());
        assert!(provider.fetch_code("").await.is_none());
        assert_eq!(provider.cache_stats().0, 0);
        assert!(NoCodeProvider.fetch_code("https://example.com").await.is_none());
    }
}
