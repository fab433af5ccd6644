//! SQLite-backed store implementations.
//!
//! [`SqliteStore`] wraps a [`SqlitePool`] and implements all three
//! persistence seams against the schema created by [`crate::migrate`]:
//!
//! - [`CacheStore`] over `image_cache` and `similarity_clusters`
//! - [`AnalysisStore`] over `content_analysis`
//! - [`ContentStore`] over `posts`, `post_meta` and `post_terms`

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::models::{
    Attachment, CacheEntry, ContentAnalysis, ContentEntity, NewCacheEntry, SimilarityCluster,
};
use crate::processor::ALT_TEXT_META;
use crate::store::{AnalysisStore, CacheStore, DeleteFilter};
use crate::traits::{Clock, ContentStore, SystemClock};

const ENTRY_COLUMNS: &str = "id, image_hash, similarity_hash, alt_text, caption, title, provider, \
     confidence_score, context_data, created_at, updated_at, expires_at, usage_count";

pub struct SqliteStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    /// Stamp `updated_at` columns from `clock` instead of the wall clock.
    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace a content entity together with its terms.
    pub async fn insert_content(&self, entity: &ContentEntity, now: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO posts (id, post_type, title, body, excerpt, created_at, updated_at)
            VALUES (?, 'post', ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                body = excluded.body,
                excerpt = excluded.excerpt,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(entity.id)
        .bind(&entity.title)
        .bind(&entity.body)
        .bind(&entity.excerpt)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM post_terms WHERE post_id = ?")
            .bind(entity.id)
            .execute(&mut *tx)
            .await?;

        let terms = entity
            .categories
            .iter()
            .map(|c| ("category", c))
            .chain(entity.tags.iter().map(|t| ("post_tag", t)));
        for (position, (taxonomy, name)) in terms.enumerate() {
            sqlx::query(
                "INSERT OR IGNORE INTO post_terms (post_id, taxonomy, name, position) VALUES (?, ?, ?, ?)",
            )
            .bind(entity.id)
            .bind(taxonomy)
            .bind(name)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Insert or replace an attachment row.
    pub async fn insert_attachment(&self, attachment: &Attachment, now: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO posts (id, post_type, parent_id, mime_type, file_path, created_at, updated_at)
            VALUES (?, 'attachment', ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                parent_id = excluded.parent_id,
                mime_type = excluded.mime_type,
                file_path = excluded.file_path,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(attachment.id)
        .bind(attachment.parent_id)
        .bind(&attachment.mime_type)
        .bind(
            attachment
                .file_path
                .as_ref()
                .map(|p| p.to_string_lossy().to_string()),
        )
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn terms(&self, post_id: i64, taxonomy: &str) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM post_terms WHERE post_id = ? AND taxonomy = ? ORDER BY position ASC",
        )
        .bind(post_id)
        .bind(taxonomy)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }
}

fn entry_from_row(row: &SqliteRow) -> CacheEntry {
    CacheEntry {
        id: row.get("id"),
        image_hash: row.get("image_hash"),
        similarity_hash: row.get("similarity_hash"),
        alt_text: row.get("alt_text"),
        caption: row.get("caption"),
        title: row.get("title"),
        provider: row.get("provider"),
        confidence_score: row.get("confidence_score"),
        context_data: row.get("context_data"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        expires_at: row.get("expires_at"),
        usage_count: row.get("usage_count"),
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn find_by_image_hash(&self, image_hash: &str) -> Result<Option<CacheEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM image_cache WHERE image_hash = ?",
            ENTRY_COLUMNS
        ))
        .bind(image_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(entry_from_row))
    }

    async fn live_entries(&self, now: i64) -> Result<Vec<CacheEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM image_cache WHERE expires_at IS NULL OR expires_at > ? ORDER BY id ASC",
            ENTRY_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(entry_from_row).collect())
    }

    async fn all_entries(&self) -> Result<Vec<CacheEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM image_cache ORDER BY id ASC",
            ENTRY_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(entry_from_row).collect())
    }

    async fn upsert_entry(&self, entry: &NewCacheEntry) -> Result<CacheEntry> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO image_cache (image_hash, similarity_hash, alt_text, caption, title,
                                     provider, confidence_score, context_data,
                                     created_at, updated_at, expires_at, usage_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(image_hash) DO UPDATE SET
                similarity_hash = excluded.similarity_hash,
                alt_text = excluded.alt_text,
                caption = excluded.caption,
                title = excluded.title,
                provider = excluded.provider,
                confidence_score = excluded.confidence_score,
                context_data = excluded.context_data,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                expires_at = excluded.expires_at,
                usage_count = excluded.usage_count
            RETURNING id
            "#,
        )
        .bind(&entry.image_hash)
        .bind(&entry.similarity_hash)
        .bind(&entry.alt_text)
        .bind(&entry.caption)
        .bind(&entry.title)
        .bind(&entry.provider)
        .bind(entry.confidence_score)
        .bind(&entry.context_data)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .bind(entry.expires_at)
        .bind(entry.usage_count)
        .fetch_one(&self.pool)
        .await?;

        Ok(CacheEntry::from_new(id, entry))
    }

    async fn increment_usage(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE image_cache SET usage_count = usage_count + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_entries(&self, filter: DeleteFilter) -> Result<u64> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM image_cache WHERE 1 = 1");
        if let Some(t) = filter.expired_before {
            qb.push(" AND expires_at IS NOT NULL AND expires_at < ")
                .push_bind(t);
        }
        if let Some(t) = filter.created_before {
            qb.push(" AND created_at < ").push_bind(t);
        }
        if let Some(u) = filter.usage_below {
            qb.push(" AND usage_count < ").push_bind(u);
        }
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn replace_clusters(&self, clusters: &[SimilarityCluster]) -> Result<()> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM similarity_clusters")
            .execute(&mut *tx)
            .await?;

        for cluster in clusters {
            let members = serde_json::to_string(&cluster.member_hashes)?;
            sqlx::query(
                r#"
                INSERT INTO similarity_clusters (cluster_id, representative_hash, member_hashes,
                                                 cluster_size, updated_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(cluster_id) DO UPDATE SET
                    representative_hash = excluded.representative_hash,
                    member_hashes = excluded.member_hashes,
                    cluster_size = excluded.cluster_size,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&cluster.cluster_id)
            .bind(&cluster.representative_hash)
            .bind(&members)
            .bind(cluster.cluster_size)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn clusters(&self) -> Result<Vec<SimilarityCluster>> {
        let rows = sqlx::query(
            "SELECT cluster_id, representative_hash, member_hashes, cluster_size \
             FROM similarity_clusters ORDER BY cluster_size DESC, cluster_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let members: String = row.get("member_hashes");
                let member_hashes: BTreeSet<String> = serde_json::from_str(&members)
                    .with_context(|| "Corrupt member_hashes in similarity_clusters")?;
                Ok(SimilarityCluster {
                    cluster_id: row.get("cluster_id"),
                    representative_hash: row.get("representative_hash"),
                    member_hashes,
                    cluster_size: row.get("cluster_size"),
                })
            })
            .collect()
    }
}

#[async_trait]
impl AnalysisStore for SqliteStore {
    async fn get_analysis(&self, content_id: i64) -> Result<Option<ContentAnalysis>> {
        let row = sqlx::query(
            "SELECT topics_json, keywords_json, sentiment_score, readability_score, \
             embeddings_json, updated_at FROM content_analysis WHERE content_id = ?",
        )
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let topics: String = row.get("topics_json");
        let keywords: String = row.get("keywords_json");
        let embeddings: String = row.get("embeddings_json");

        Ok(Some(ContentAnalysis {
            topics: serde_json::from_str(&topics)?,
            keywords: serde_json::from_str(&keywords)?,
            sentiment_score: row.get("sentiment_score"),
            readability_score: row.get("readability_score"),
            embeddings: serde_json::from_str(&embeddings)?,
            updated_at: row.get("updated_at"),
        }))
    }

    async fn put_analysis(&self, content_id: i64, analysis: &ContentAnalysis) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO content_analysis (content_id, topics_json, keywords_json, sentiment_score,
                                          readability_score, embeddings_json, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(content_id) DO UPDATE SET
                topics_json = excluded.topics_json,
                keywords_json = excluded.keywords_json,
                sentiment_score = excluded.sentiment_score,
                readability_score = excluded.readability_score,
                embeddings_json = excluded.embeddings_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(content_id)
        .bind(serde_json::to_string(&analysis.topics)?)
        .bind(serde_json::to_string(&analysis.keywords)?)
        .bind(analysis.sentiment_score)
        .bind(analysis.readability_score)
        .bind(serde_json::to_string(&analysis.embeddings)?)
        .bind(analysis.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn get_content(&self, id: i64) -> Result<Option<ContentEntity>> {
        let row = sqlx::query(
            "SELECT id, title, body, excerpt FROM posts WHERE id = ? AND post_type != 'attachment'",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        Ok(Some(ContentEntity {
            id: row.get("id"),
            title: row.get("title"),
            body: row.get("body"),
            excerpt: row.get("excerpt"),
            categories: self.terms(id, "category").await?,
            tags: self.terms(id, "post_tag").await?,
        }))
    }

    async fn get_attachment(&self, id: i64) -> Result<Option<Attachment>> {
        let row = sqlx::query(
            "SELECT id, parent_id, mime_type, file_path FROM posts \
             WHERE id = ? AND post_type = 'attachment'",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            let mime: Option<String> = r.get("mime_type");
            let path: Option<String> = r.get("file_path");
            Attachment {
                id: r.get("id"),
                parent_id: r.get("parent_id"),
                mime_type: mime.unwrap_or_default(),
                file_path: path.filter(|p| !p.is_empty()).map(PathBuf::from),
            }
        }))
    }

    async fn get_meta(&self, id: i64, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT meta_value FROM post_meta WHERE post_id = ? AND meta_key = ?",
        )
        .bind(id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn set_meta(&self, id: i64, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO post_meta (post_id, meta_key, meta_value) VALUES (?, ?, ?)
            ON CONFLICT(post_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value
            "#,
        )
        .bind(id)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_title(&self, id: i64, title: &str) -> Result<()> {
        sqlx::query("UPDATE posts SET title = ?, updated_at = ? WHERE id = ?")
            .bind(title)
            .bind(self.clock.now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_excerpt(&self, id: i64, excerpt: &str) -> Result<()> {
        sqlx::query("UPDATE posts SET excerpt = ?, updated_at = ? WHERE id = ?")
            .bind(excerpt)
            .bind(self.clock.now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn attachments_missing_alt(&self, limit: i64, offset: i64) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT p.id FROM posts p
            LEFT JOIN post_meta m ON m.post_id = p.id AND m.meta_key = ?
            WHERE p.post_type = 'attachment'
              AND p.mime_type LIKE 'image/%'
              AND (m.meta_value IS NULL OR m.meta_value = '')
            ORDER BY p.id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(ALT_TEXT_META)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
