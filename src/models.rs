//! Core data models used throughout SmartPics.
//!
//! These types represent the content entities, image attachments, analysis
//! results and cache entries that flow through the alt-text pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// An article-like content entity as resolved from the content store.
#[derive(Debug, Clone, Default)]
pub struct ContentEntity {
    pub id: i64,
    pub title: String,
    /// Body text; may contain HTML markup.
    pub body: String,
    /// Explicit excerpt. Empty means "derive from the body".
    pub excerpt: String,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
}

/// An uploaded media item.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub mime_type: String,
    pub file_path: Option<PathBuf>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Text features derived from a content entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    pub topics: Vec<String>,
    pub keywords: Vec<String>,
    pub sentiment_score: f64,
    pub readability_score: i64,
    /// Reserved for vector embeddings; always empty.
    #[serde(default)]
    pub embeddings: Vec<f32>,
    /// Unix seconds when this analysis was computed.
    pub updated_at: i64,
}

/// Output of an AI provider for one image. Any text field may be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedMetadata {
    #[serde(default)]
    pub alt_text: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub title: String,
    pub provider: String,
    #[serde(default)]
    pub confidence: f64,
}

/// A cache row about to be written.
#[derive(Debug, Clone)]
pub struct NewCacheEntry {
    pub image_hash: String,
    pub similarity_hash: String,
    pub alt_text: String,
    pub caption: String,
    pub title: String,
    pub provider: String,
    pub confidence_score: f64,
    pub context_data: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub expires_at: Option<i64>,
    pub usage_count: i64,
}

/// A previously computed AI result for an image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub id: i64,
    /// Exact-match key (hash of the image file).
    pub image_hash: String,
    /// Hash of the generated alt text, caption and title.
    pub similarity_hash: String,
    pub alt_text: String,
    pub caption: String,
    pub title: String,
    pub provider: String,
    pub confidence_score: f64,
    pub context_data: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub expires_at: Option<i64>,
    pub usage_count: i64,
}

impl CacheEntry {
    pub fn from_new(id: i64, new: &NewCacheEntry) -> Self {
        Self {
            id,
            image_hash: new.image_hash.clone(),
            similarity_hash: new.similarity_hash.clone(),
            alt_text: new.alt_text.clone(),
            caption: new.caption.clone(),
            title: new.title.clone(),
            provider: new.provider.clone(),
            confidence_score: new.confidence_score,
            context_data: new.context_data.clone(),
            created_at: new.created_at,
            updated_at: new.updated_at,
            expires_at: new.expires_at,
            usage_count: new.usage_count,
        }
    }

    /// Whether lookups may return this entry at `now`.
    pub fn is_live(&self, now: i64) -> bool {
        self.expires_at.map_or(true, |expires| expires > now)
    }
}

/// Entries sharing a similarity hash, grouped for reporting only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityCluster {
    pub cluster_id: String,
    pub representative_hash: String,
    pub member_hashes: BTreeSet<String>,
    pub cluster_size: i64,
}

/// Uniform result of processing one image, cached or fresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedImage {
    pub alt_text: String,
    pub caption: String,
    pub title: String,
    pub provider: String,
    pub confidence: f64,
    pub cached: bool,
    pub similarity_match: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
    /// Unix seconds when the cached entry was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_date: Option<i64>,
}

/// One failed item inside a bulk run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkItemError {
    /// Attachment id, or `None` when the candidate query itself failed.
    pub id: Option<i64>,
    /// Stable error code, e.g. `file_not_found`.
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkSummary {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<BulkItemError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_entries: i64,
    pub live_entries: i64,
    pub expired_entries: i64,
    pub total_usage: i64,
    /// Lookups served from cache instead of the AI provider.
    pub api_calls_saved: i64,
    pub clusters: i64,
}
