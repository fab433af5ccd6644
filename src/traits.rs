//! Collaborator seams for the alt-text pipeline.
//!
//! The pipeline's own logic (text analysis, the similarity cache and the
//! per-image workflow) is written against these traits. Everything behind
//! them is replaceable: the CMS that owns posts and attachments, the AI
//! backend that writes descriptions, the image fingerprinting, the
//! similarity ranking and the SEO plugin that knows a post's focus keyword.
//!
//! ```text
//!                 ┌──────────────────┐
//!  attachment ──▶ │  ImageProcessor   │──▶ ContentStore (meta writes)
//!                 └──┬─────┬──────┬──┘
//!                    │     │      │
//!        SimilarityDetector │   AiProvider
//!                    ▼     ▼
//!          SimilarityCache  TextAnalyzer ──▶ FocusKeywordProvider
//!                    │
//!            SimilarityRanker
//! ```
//!
//! Built-in implementations live in [`crate::sqlite_store`],
//! [`crate::store::memory`], [`crate::provider`], [`crate::similarity`] and
//! [`crate::seo`].

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::Path;

use crate::models::{Attachment, CacheEntry, ContentEntity, GeneratedMetadata};

/// Free-form context handed to the AI provider (post title, focus keyword,
/// topics, sentiment, caller overrides).
pub type ImageContext = Map<String, Value>;

// ═══════════════════════════════════════════════════════════════════════
// Content store
// ═══════════════════════════════════════════════════════════════════════

/// The CMS side of the pipeline: posts, attachments and their metadata.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Resolve a content entity with its category and tag names.
    async fn get_content(&self, id: i64) -> Result<Option<ContentEntity>>;

    /// Resolve an attachment, image or not.
    async fn get_attachment(&self, id: i64) -> Result<Option<Attachment>>;

    async fn get_meta(&self, id: i64, key: &str) -> Result<Option<String>>;

    async fn set_meta(&self, id: i64, key: &str, value: &str) -> Result<()>;

    async fn update_title(&self, id: i64, title: &str) -> Result<()>;

    async fn update_excerpt(&self, id: i64, excerpt: &str) -> Result<()>;

    /// Image attachments whose alt-text meta is missing or empty, ordered by
    /// ascending id.
    async fn attachments_missing_alt(&self, limit: i64, offset: i64) -> Result<Vec<i64>>;
}

// ═══════════════════════════════════════════════════════════════════════
// AI provider
// ═══════════════════════════════════════════════════════════════════════

/// A vision backend that describes an image.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Identifier recorded with every result (e.g. `"openai"`).
    fn name(&self) -> &str;

    /// Describe the image at `path`. Errors are forwarded to the caller
    /// untouched.
    async fn analyze_image(&self, path: &Path, context: &ImageContext)
        -> Result<GeneratedMetadata>;
}

// ═══════════════════════════════════════════════════════════════════════
// Similarity
// ═══════════════════════════════════════════════════════════════════════

/// Produces a fingerprint for an image file. Identical bytes must yield
/// identical fingerprints.
#[async_trait]
pub trait SimilarityDetector: Send + Sync {
    async fn generate_hash(&self, path: &Path) -> Result<String>;
}

/// Scores cached entries against a fingerprint.
pub trait SimilarityRanker: Send + Sync {
    /// Return `(entry, score)` pairs sorted by descending score.
    fn rank(&self, fingerprint: &str, candidates: &[CacheEntry]) -> Vec<(CacheEntry, f64)>;
}

// ═══════════════════════════════════════════════════════════════════════
// SEO
// ═══════════════════════════════════════════════════════════════════════

/// Source of a post's SEO focus keyword.
#[async_trait]
pub trait FocusKeywordProvider: Send + Sync {
    fn name(&self) -> &str;

    /// `None` (or an empty string) when the post has no focus keyword.
    async fn focus_keyword(&self, content_id: i64) -> Result<Option<String>>;
}

// ═══════════════════════════════════════════════════════════════════════
// Clock
// ═══════════════════════════════════════════════════════════════════════

/// Wall clock in unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// A clock that only moves when advanced, for tests and replays.
pub struct FixedClock {
    now: std::sync::atomic::AtomicI64,
}

impl FixedClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: std::sync::atomic::AtomicI64::new(now),
        }
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.now.load(std::sync::atomic::Ordering::SeqCst)
    }
}
