//! Memoizing resolver decorator.

use std::sync::Arc;

use async_trait::async_trait;

use super::{QueryKind, ResolveError, Resolver, StreamHandle};
use crate::cache::ResolutionCache;
use crate::model::MediaInfo;

/// Shared cache type for resolver lookups.
pub type MediaCache = ResolutionCache<Vec<MediaInfo>>;

/// Wraps a resolver and memoizes direct lookups and searches in a shared
/// [`ResolutionCache`].
///
/// Stream handles always go to the inner resolver; they expire upstream
/// long before a cache entry would. Playlists aren't cached either since
/// they are usually requested once.
pub struct CachingResolver<R> {
    inner: R,
    cache: Arc<MediaCache>,
}

impl<R: Resolver> CachingResolver<R> {
    pub fn new(inner: R, cache: Arc<MediaCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<MediaCache> {
        &self.cache
    }
}

fn direct_key(url: &str) -> String {
    format!("direct:{}", url)
}

fn search_key(query: &str, limit: usize) -> String {
    format!("search:{}:{}", limit, query.trim().to_lowercase())
}

#[async_trait]
impl<R: Resolver> Resolver for CachingResolver<R> {
    fn classify(&self, query: &str) -> QueryKind {
        self.inner.classify(query)
    }

    async fn resolve_direct(&self, url: &str) -> Result<MediaInfo, ResolveError> {
        let key = direct_key(url);
        if let Some(hit) = self.cache.get(&key).and_then(|v| v.into_iter().next()) {
            tracing::debug!(target: "resolver", url, "Cache hit");
            return Ok(hit);
        }
        let info = self.inner.resolve_direct(url).await?;
        self.cache.set(key, vec![info.clone()]);
        Ok(info)
    }

    async fn resolve_playlist(
        &self,
        url: &str,
        max_items: usize,
    ) -> Result<Vec<MediaInfo>, ResolveError> {
        self.inner.resolve_playlist(url, max_items).await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MediaInfo>, ResolveError> {
        let key = search_key(query, limit);
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(target: "resolver", query, "Search cache hit");
            return Ok(hit);
        }
        let results = self.inner.search(query, limit).await?;
        if !results.is_empty() {
            self.cache.set(key, results.clone());
        }
        Ok(results)
    }

    async fn stream_locator(&self, locator: &str) -> Result<StreamHandle, ResolveError> {
        self.inner.stream_locator(locator).await
    }
}
