//! SEO focus-keyword lookup.
//!
//! SEO plugins store a post's focus keyword in post meta under their own
//! key. [`MetaKeyFocusKeyword`] reads one such key; [`FocusKeywordChain`]
//! asks several in order and returns the first non-empty answer.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::SeoConfig;
use crate::traits::{ContentStore, FocusKeywordProvider};

pub const YOAST_FOCUS_KEY: &str = "_yoast_wpseo_focuskw";
pub const RANK_MATH_FOCUS_KEY: &str = "rank_math_focus_keyword";

/// Reads a focus keyword from a single post-meta key.
pub struct MetaKeyFocusKeyword {
    name: String,
    meta_key: String,
    content: Arc<dyn ContentStore>,
}

impl MetaKeyFocusKeyword {
    pub fn new(name: &str, meta_key: &str, content: Arc<dyn ContentStore>) -> Self {
        Self {
            name: name.to_string(),
            meta_key: meta_key.to_string(),
            content,
        }
    }

    pub fn yoast(content: Arc<dyn ContentStore>) -> Self {
        Self::new("yoast", YOAST_FOCUS_KEY, content)
    }

    /// Rank Math allows several comma-separated keywords; the first is primary.
    pub fn rank_math(content: Arc<dyn ContentStore>) -> Self {
        Self::new("rank_math", RANK_MATH_FOCUS_KEY, content)
    }
}

#[async_trait]
impl FocusKeywordProvider for MetaKeyFocusKeyword {
    fn name(&self) -> &str {
        &self.name
    }

    async fn focus_keyword(&self, content_id: i64) -> Result<Option<String>> {
        let raw = self.content.get_meta(content_id, &self.meta_key).await?;
        Ok(raw
            .as_deref()
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string))
    }
}

/// Tries each provider in order; the first non-empty keyword wins.
pub struct FocusKeywordChain {
    providers: Vec<Box<dyn FocusKeywordProvider>>,
}

impl FocusKeywordChain {
    pub fn new(providers: Vec<Box<dyn FocusKeywordProvider>>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl FocusKeywordProvider for FocusKeywordChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn focus_keyword(&self, content_id: i64) -> Result<Option<String>> {
        for provider in &self.providers {
            if let Some(keyword) = provider.focus_keyword(content_id).await? {
                if !keyword.trim().is_empty() {
                    return Ok(Some(keyword));
                }
            }
        }
        Ok(None)
    }
}

/// Always answers "no keyword".
pub struct NoFocusKeyword;

#[async_trait]
impl FocusKeywordProvider for NoFocusKeyword {
    fn name(&self) -> &str {
        "none"
    }

    async fn focus_keyword(&self, _content_id: i64) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Build the provider chain named in `[seo] providers`.
pub fn build_chain(
    config: &SeoConfig,
    content: Arc<dyn ContentStore>,
) -> Result<Arc<dyn FocusKeywordProvider>> {
    if config.providers.is_empty() {
        return Ok(Arc::new(NoFocusKeyword));
    }

    let mut providers: Vec<Box<dyn FocusKeywordProvider>> = Vec::new();
    for name in &config.providers {
        match name.as_str() {
            "yoast" => providers.push(Box::new(MetaKeyFocusKeyword::yoast(content.clone()))),
            "rank_math" => {
                providers.push(Box::new(MetaKeyFocusKeyword::rank_math(content.clone())))
            }
            other => anyhow::bail!(
                "Unknown SEO provider: '{}'. Must be yoast or rank_math.",
                other
            ),
        }
    }
    Ok(Arc::new(FocusKeywordChain::new(providers)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryContentStore;

    fn config(providers: &[&str]) -> SeoConfig {
        SeoConfig {
            providers: providers.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_chain_prefers_first_non_empty() {
        let content = Arc::new(InMemoryContentStore::new());
        content.set_meta(1, YOAST_FOCUS_KEY, "  ").await.unwrap();
        content
            .set_meta(1, RANK_MATH_FOCUS_KEY, "mountain biking, trails")
            .await
            .unwrap();
        content.set_meta(2, YOAST_FOCUS_KEY, "roses").await.unwrap();

        let chain = build_chain(&config(&["yoast", "rank_math"]), content).unwrap();
        assert_eq!(
            chain.focus_keyword(1).await.unwrap().as_deref(),
            Some("mountain biking")
        );
        assert_eq!(chain.focus_keyword(2).await.unwrap().as_deref(), Some("roses"));
        assert_eq!(chain.focus_keyword(3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_chain() {
        let content = Arc::new(InMemoryContentStore::new());
        content.set_meta(1, YOAST_FOCUS_KEY, "roses").await.unwrap();
        let chain = build_chain(&config(&[]), content).unwrap();
        assert_eq!(chain.name(), "none");
        assert_eq!(chain.focus_keyword(1).await.unwrap(), None);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let content = Arc::new(InMemoryContentStore::new());
        let err = build_chain(&config(&["aioseo"]), content).err().unwrap();
        assert!(err.to_string().contains("aioseo"));
    }
}
