//! Storage abstraction for the pipeline's own state.
//!
//! [`CacheStore`] persists similarity-cache entries and clusters;
//! [`AnalysisStore`] persists computed [`ContentAnalysis`] rows. Both are
//! implemented by [`memory::InMemoryStore`] (tests, ephemeral runs) and by
//! [`SqliteStore`](crate::sqlite_store::SqliteStore).
//!
//! Every mutation is atomic at the single-row level only. No operation here
//! spans a read and a write in one transaction, so a lookup followed by a
//! usage increment can race with a concurrent eviction; callers accept that.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CacheEntry, CacheStats, ContentAnalysis, NewCacheEntry, SimilarityCluster};

/// Row filter for bulk deletion. Every populated condition must hold; an
/// empty filter matches every row.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeleteFilter {
    /// `expires_at IS NOT NULL AND expires_at < value`
    pub expired_before: Option<i64>,
    /// `created_at < value`
    pub created_before: Option<i64>,
    /// `usage_count < value`
    pub usage_below: Option<i64>,
}

impl DeleteFilter {
    pub fn matches(&self, entry: &CacheEntry) -> bool {
        let expired = self
            .expired_before
            .map_or(true, |t| entry.expires_at.is_some_and(|e| e < t));
        let created = self.created_before.map_or(true, |t| entry.created_at < t);
        let usage = self.usage_below.map_or(true, |u| entry.usage_count < u);
        expired && created && usage
    }
}

/// Persistence for similarity-cache entries.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`find_by_image_hash`](CacheStore::find_by_image_hash) | Exact lookup, expired rows included |
/// | [`live_entries`](CacheStore::live_entries) | Rows not yet expired at `now` |
/// | [`all_entries`](CacheStore::all_entries) | Every row |
/// | [`upsert_entry`](CacheStore::upsert_entry) | Replace-on-conflict by image hash |
/// | [`increment_usage`](CacheStore::increment_usage) | `usage_count += 1` for one row |
/// | [`delete_entries`](CacheStore::delete_entries) | Bulk delete by filter |
/// | [`replace_clusters`](CacheStore::replace_clusters) | Swap in a rebuilt cluster set |
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn find_by_image_hash(&self, image_hash: &str) -> Result<Option<CacheEntry>>;

    async fn live_entries(&self, now: i64) -> Result<Vec<CacheEntry>>;

    async fn all_entries(&self) -> Result<Vec<CacheEntry>>;

    /// Insert or fully replace the row for `entry.image_hash`. The row id is
    /// kept on replacement.
    async fn upsert_entry(&self, entry: &NewCacheEntry) -> Result<CacheEntry>;

    /// Returns false when the row no longer exists.
    async fn increment_usage(&self, id: i64) -> Result<bool>;

    /// Returns the number of rows deleted.
    async fn delete_entries(&self, filter: DeleteFilter) -> Result<u64>;

    async fn replace_clusters(&self, clusters: &[SimilarityCluster]) -> Result<()>;

    async fn clusters(&self) -> Result<Vec<SimilarityCluster>>;

    /// Aggregate counters; `clusters` is filled from the cluster table.
    async fn stats(&self, now: i64) -> Result<CacheStats> {
        let entries = self.all_entries().await?;
        let live = entries.iter().filter(|e| e.is_live(now)).count() as i64;
        let total_usage: i64 = entries.iter().map(|e| e.usage_count).sum();
        let saved: i64 = entries.iter().map(|e| (e.usage_count - 1).max(0)).sum();
        Ok(CacheStats {
            total_entries: entries.len() as i64,
            live_entries: live,
            expired_entries: entries.len() as i64 - live,
            total_usage,
            api_calls_saved: saved,
            clusters: self.clusters().await?.len() as i64,
        })
    }
}

/// Persistence for per-content analysis results.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn get_analysis(&self, content_id: i64) -> Result<Option<ContentAnalysis>>;

    async fn put_analysis(&self, content_id: i64, analysis: &ContentAnalysis) -> Result<()>;
}
