//! Similarity cache for AI-generated image metadata.
//!
//! Every successful provider call is remembered under the image's
//! fingerprint so the same (or a near-identical) image never pays for a
//! second call while the entry is fresh.
//!
//! # Keys
//!
//! - **Image hash**: exact key, the fingerprint of the file.
//! - **Similarity hash**: SHA-256 of `alt_text + caption + title`. Entries
//!   whose descriptions converge share it; [`SimilarityCache::optimize`]
//!   groups them into [`SimilarityCluster`]s for reporting.
//!
//! # Entry lifecycle
//!
//! ```text
//! store ──▶ fresh ──(expires_at passes)──▶ expired ──(evict)──▶ deleted
//!             │  ▲
//!             └──┘ lookup: usage_count += 1
//! ```
//!
//! Expired rows stay in storage but are never returned by a lookup.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::CacheConfig;
use crate::models::{CacheEntry, CacheStats, GeneratedMetadata, NewCacheEntry, SimilarityCluster};
use crate::store::{CacheStore, DeleteFilter};
use crate::traits::{Clock, SimilarityRanker};

const DAY_SECS: i64 = 86_400;
/// Unused entries younger than this survive low-usage eviction.
const LOW_USAGE_GRACE_DAYS: i64 = 7;
const LOW_USAGE_THRESHOLD: i64 = 2;
const OLD_ENTRY_DAYS: i64 = 90;

/// Which entries an eviction pass deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// `expires_at` set and in the past.
    Expired,
    /// Used fewer than twice and created more than 7 days ago.
    LowUsage,
    /// Created more than 90 days ago.
    Old,
    /// Everything.
    All,
}

impl EvictionPolicy {
    fn filter(self, now: i64) -> DeleteFilter {
        match self {
            EvictionPolicy::Expired => DeleteFilter {
                expired_before: Some(now),
                ..Default::default()
            },
            EvictionPolicy::LowUsage => DeleteFilter {
                created_before: Some(now - LOW_USAGE_GRACE_DAYS * DAY_SECS),
                usage_below: Some(LOW_USAGE_THRESHOLD),
                ..Default::default()
            },
            EvictionPolicy::Old => DeleteFilter {
                created_before: Some(now - OLD_ENTRY_DAYS * DAY_SECS),
                ..Default::default()
            },
            EvictionPolicy::All => DeleteFilter::default(),
        }
    }
}

impl std::str::FromStr for EvictionPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "expired" => Ok(EvictionPolicy::Expired),
            "low-usage" | "low_usage" => Ok(EvictionPolicy::LowUsage),
            "old" => Ok(EvictionPolicy::Old),
            "all" => Ok(EvictionPolicy::All),
            other => anyhow::bail!(
                "Unknown eviction policy: '{}'. Must be expired, low-usage, old, or all.",
                other
            ),
        }
    }
}

/// A cache entry returned by a lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    /// The entry, with `usage_count` including this lookup.
    pub entry: CacheEntry,
    pub cached: bool,
    pub similarity_match: bool,
    pub similarity_score: Option<f64>,
}

/// Counts from one [`SimilarityCache::optimize`] run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptimizeReport {
    pub expired_removed: u64,
    pub low_usage_removed: u64,
    pub clusters: usize,
}

pub struct SimilarityCache {
    store: Arc<dyn CacheStore>,
    ranker: Arc<dyn SimilarityRanker>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
}

impl SimilarityCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        ranker: Arc<dyn SimilarityRanker>,
        clock: Arc<dyn Clock>,
        config: CacheConfig,
    ) -> Self {
        Self {
            store,
            ranker,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Exact lookup by image hash.
    ///
    /// Disabled caching, a missing row and an expired row all read as a
    /// miss.
    pub async fn lookup_exact(&self, image_hash: &str) -> Result<Option<CacheHit>> {
        if !self.config.enable_caching {
            return Ok(None);
        }

        let now = self.clock.now();
        let entry = match self.store.find_by_image_hash(image_hash).await? {
            Some(entry) if entry.is_live(now) => entry,
            _ => return Ok(None),
        };

        let entry = match self.record_use(entry).await? {
            Some(entry) => entry,
            None => return Ok(None),
        };
        tracing::debug!(image_hash, usage = entry.usage_count, "exact cache hit");

        Ok(Some(CacheHit {
            entry,
            cached: true,
            similarity_match: false,
            similarity_score: None,
        }))
    }

    /// Best live entry the ranker scores at or above `threshold`.
    ///
    /// Requires both caching and similarity detection to be enabled.
    pub async fn lookup_similar(
        &self,
        fingerprint: &str,
        threshold: f64,
    ) -> Result<Option<CacheHit>> {
        if !self.config.enable_caching || !self.config.enable_similarity_detection {
            return Ok(None);
        }

        let now = self.clock.now();
        let candidates = self.store.live_entries(now).await?;
        if candidates.is_empty() {
            return Ok(None);
        }

        let best = self
            .ranker
            .rank(fingerprint, &candidates)
            .into_iter()
            .find(|(_, score)| *score >= threshold);

        let (entry, score) = match best {
            Some(pair) => pair,
            None => return Ok(None),
        };

        let entry = match self.record_use(entry).await? {
            Some(entry) => entry,
            None => return Ok(None),
        };
        tracing::debug!(fingerprint, score, matched = %entry.image_hash, "similarity cache hit");

        Ok(Some(CacheHit {
            entry,
            cached: true,
            similarity_match: true,
            similarity_score: Some(score),
        }))
    }

    /// [`lookup_similar`](Self::lookup_similar) at the configured threshold.
    pub async fn lookup_similar_default(&self, fingerprint: &str) -> Result<Option<CacheHit>> {
        self.lookup_similar(fingerprint, self.config.similarity_threshold)
            .await
    }

    /// Remember a provider result under `image_hash`.
    ///
    /// Returns `false` without writing when caching is disabled.
    pub async fn store(
        &self,
        image_hash: &str,
        result: &GeneratedMetadata,
        context_data: &serde_json::Value,
    ) -> Result<bool> {
        if !self.config.enable_caching {
            return Ok(false);
        }

        let now = self.clock.now();
        let entry = NewCacheEntry {
            image_hash: image_hash.to_string(),
            similarity_hash: similarity_hash(result),
            alt_text: result.alt_text.clone(),
            caption: result.caption.clone(),
            title: result.title.clone(),
            provider: result.provider.clone(),
            confidence_score: result.confidence,
            context_data: context_data.to_string(),
            created_at: now,
            updated_at: now,
            expires_at: Some(
                now.saturating_add(self.config.cache_duration_days.saturating_mul(DAY_SECS)),
            ),
            usage_count: 1,
        };

        let stored = self.store.upsert_entry(&entry).await?;
        tracing::debug!(image_hash, id = stored.id, "cache entry stored");
        Ok(true)
    }

    /// Delete the entries selected by `policy`; returns how many.
    pub async fn evict(&self, policy: EvictionPolicy) -> Result<u64> {
        let now = self.clock.now();
        let removed = self.store.delete_entries(policy.filter(now)).await?;
        tracing::info!(?policy, removed, "cache eviction");
        Ok(removed)
    }

    /// Evict expired and low-usage entries, then rebuild clusters.
    pub async fn optimize(&self) -> Result<OptimizeReport> {
        let expired_removed = self.evict(EvictionPolicy::Expired).await?;
        let low_usage_removed = self.evict(EvictionPolicy::LowUsage).await?;

        let live = self.store.live_entries(self.clock.now()).await?;
        let clusters = build_clusters(&live);
        self.store.replace_clusters(&clusters).await?;

        Ok(OptimizeReport {
            expired_removed,
            low_usage_removed,
            clusters: clusters.len(),
        })
    }

    pub async fn clusters(&self) -> Result<Vec<SimilarityCluster>> {
        self.store.clusters().await
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        self.store.stats(self.clock.now()).await
    }

    /// Increment usage and return the entry as the caller should see it.
    /// `None` when the row was deleted between lookup and increment.
    async fn record_use(&self, mut entry: CacheEntry) -> Result<Option<CacheEntry>> {
        if !self.store.increment_usage(entry.id).await? {
            return Ok(None);
        }
        entry.usage_count += 1;
        Ok(Some(entry))
    }
}

/// SHA-256 hex of the generated text, concatenated without separators or
/// normalization.
pub fn similarity_hash(result: &GeneratedMetadata) -> String {
    let mut hasher = Sha256::new();
    hasher.update(result.alt_text.as_bytes());
    hasher.update(result.caption.as_bytes());
    hasher.update(result.title.as_bytes());
    hex::encode(hasher.finalize())
}

/// Group entries by similarity hash, keeping groups with two or more members.
pub fn build_clusters(entries: &[CacheEntry]) -> Vec<SimilarityCluster> {
    let mut groups: BTreeMap<&str, Vec<&CacheEntry>> = BTreeMap::new();
    for entry in entries {
        groups
            .entry(entry.similarity_hash.as_str())
            .or_default()
            .push(entry);
    }

    groups
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .filter_map(|(hash, members)| {
            let representative = members.iter().min_by_key(|e| e.id)?;
            let member_hashes: BTreeSet<String> =
                members.iter().map(|e| e.image_hash.clone()).collect();
            Some(SimilarityCluster {
                cluster_id: hex::encode(Sha256::digest(hash.as_bytes())),
                representative_hash: representative.image_hash.clone(),
                cluster_size: members.len() as i64,
                member_hashes,
            })
        })
        .collect()
}
