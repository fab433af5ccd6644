//! In-memory store implementations for tests and ephemeral runs.
//!
//! [`InMemoryStore`] implements [`CacheStore`] and [`AnalysisStore`];
//! [`InMemoryContentStore`] implements the CMS-side [`ContentStore`].
//! Both use `HashMap`/`BTreeMap` behind `std::sync::RwLock`.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Attachment, CacheEntry, ContentAnalysis, ContentEntity, NewCacheEntry, SimilarityCluster,
};
use crate::processor::ALT_TEXT_META;
use crate::traits::ContentStore;

use super::{AnalysisStore, CacheStore, DeleteFilter};

/// In-memory cache and analysis store.
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<i64, CacheEntry>>,
    next_id: RwLock<i64>,
    clusters: RwLock<Vec<SimilarityCluster>>,
    analyses: RwLock<HashMap<i64, ContentAnalysis>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            next_id: RwLock::new(1),
            clusters: RwLock::new(Vec::new()),
            analyses: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    async fn find_by_image_hash(&self, image_hash: &str) -> Result<Option<CacheEntry>> {
        let entries = self.entries.read().expect("cache lock poisoned");
        Ok(entries
            .values()
            .find(|e| e.image_hash == image_hash)
            .cloned())
    }

    async fn live_entries(&self, now: i64) -> Result<Vec<CacheEntry>> {
        let entries = self.entries.read().expect("cache lock poisoned");
        Ok(entries.values().filter(|e| e.is_live(now)).cloned().collect())
    }

    async fn all_entries(&self) -> Result<Vec<CacheEntry>> {
        let entries = self.entries.read().expect("cache lock poisoned");
        Ok(entries.values().cloned().collect())
    }

    async fn upsert_entry(&self, entry: &NewCacheEntry) -> Result<CacheEntry> {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        let existing_id = entries
            .values()
            .find(|e| e.image_hash == entry.image_hash)
            .map(|e| e.id);
        let id = match existing_id {
            Some(id) => id,
            None => {
                let mut next = self.next_id.write().expect("id lock poisoned");
                let id = *next;
                *next += 1;
                id
            }
        };
        let stored = CacheEntry::from_new(id, entry);
        entries.insert(id, stored.clone());
        Ok(stored)
    }

    async fn increment_usage(&self, id: i64) -> Result<bool> {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        Ok(match entries.get_mut(&id) {
            Some(e) => {
                e.usage_count += 1;
                true
            }
            None => false,
        })
    }

    async fn delete_entries(&self, filter: DeleteFilter) -> Result<u64> {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        let before = entries.len();
        entries.retain(|_, e| !filter.matches(e));
        Ok((before - entries.len()) as u64)
    }

    async fn replace_clusters(&self, clusters: &[SimilarityCluster]) -> Result<()> {
        let mut stored = self.clusters.write().expect("cluster lock poisoned");
        *stored = clusters.to_vec();
        Ok(())
    }

    async fn clusters(&self) -> Result<Vec<SimilarityCluster>> {
        Ok(self.clusters.read().expect("cluster lock poisoned").clone())
    }
}

#[async_trait]
impl AnalysisStore for InMemoryStore {
    async fn get_analysis(&self, content_id: i64) -> Result<Option<ContentAnalysis>> {
        let analyses = self.analyses.read().expect("analysis lock poisoned");
        Ok(analyses.get(&content_id).cloned())
    }

    async fn put_analysis(&self, content_id: i64, analysis: &ContentAnalysis) -> Result<()> {
        let mut analyses = self.analyses.write().expect("analysis lock poisoned");
        analyses.insert(content_id, analysis.clone());
        Ok(())
    }
}

// ─── Content store ──────────────────────────────────────────────────

struct StoredPost {
    entity: ContentEntity,
    attachment: Option<Attachment>,
}

/// In-memory stand-in for the CMS.
pub struct InMemoryContentStore {
    posts: RwLock<BTreeMap<i64, StoredPost>>,
    meta: RwLock<HashMap<(i64, String), String>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self {
            posts: RwLock::new(BTreeMap::new()),
            meta: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert_content(&self, entity: ContentEntity) {
        let mut posts = self.posts.write().expect("posts lock poisoned");
        posts.insert(
            entity.id,
            StoredPost {
                entity,
                attachment: None,
            },
        );
    }

    pub fn insert_attachment(
        &self,
        id: i64,
        parent_id: Option<i64>,
        mime_type: &str,
        file_path: Option<PathBuf>,
    ) {
        let mut posts = self.posts.write().expect("posts lock poisoned");
        posts.insert(
            id,
            StoredPost {
                entity: ContentEntity {
                    id,
                    ..Default::default()
                },
                attachment: Some(Attachment {
                    id,
                    parent_id,
                    mime_type: mime_type.to_string(),
                    file_path,
                }),
            },
        );
    }

    /// Current title of any post or attachment.
    pub fn title(&self, id: i64) -> Option<String> {
        let posts = self.posts.read().expect("posts lock poisoned");
        posts.get(&id).map(|p| p.entity.title.clone())
    }

    /// Current excerpt of any post or attachment.
    pub fn excerpt(&self, id: i64) -> Option<String> {
        let posts = self.posts.read().expect("posts lock poisoned");
        posts.get(&id).map(|p| p.entity.excerpt.clone())
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn get_content(&self, id: i64) -> Result<Option<ContentEntity>> {
        let posts = self.posts.read().expect("posts lock poisoned");
        Ok(posts
            .get(&id)
            .filter(|p| p.attachment.is_none())
            .map(|p| p.entity.clone()))
    }

    async fn get_attachment(&self, id: i64) -> Result<Option<Attachment>> {
        let posts = self.posts.read().expect("posts lock poisoned");
        Ok(posts.get(&id).and_then(|p| p.attachment.clone()))
    }

    async fn get_meta(&self, id: i64, key: &str) -> Result<Option<String>> {
        let meta = self.meta.read().expect("meta lock poisoned");
        Ok(meta.get(&(id, key.to_string())).cloned())
    }

    async fn set_meta(&self, id: i64, key: &str, value: &str) -> Result<()> {
        let mut meta = self.meta.write().expect("meta lock poisoned");
        meta.insert((id, key.to_string()), value.to_string());
        Ok(())
    }

    async fn update_title(&self, id: i64, title: &str) -> Result<()> {
        let mut posts = self.posts.write().expect("posts lock poisoned");
        if let Some(p) = posts.get_mut(&id) {
            p.entity.title = title.to_string();
        }
        Ok(())
    }

    async fn update_excerpt(&self, id: i64, excerpt: &str) -> Result<()> {
        let mut posts = self.posts.write().expect("posts lock poisoned");
        if let Some(p) = posts.get_mut(&id) {
            p.entity.excerpt = excerpt.to_string();
        }
        Ok(())
    }

    async fn attachments_missing_alt(&self, limit: i64, offset: i64) -> Result<Vec<i64>> {
        let posts = self.posts.read().expect("posts lock poisoned");
        let meta = self.meta.read().expect("meta lock poisoned");
        Ok(posts
            .values()
            .filter_map(|p| p.attachment.as_ref())
            .filter(|a| a.is_image())
            .filter(|a| {
                meta.get(&(a.id, ALT_TEXT_META.to_string()))
                    .map_or(true, |v| v.is_empty())
            })
            .map(|a| a.id)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}
