use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index on an open pool. Idempotent.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Content entities and image attachments share one table, like the CMS
    // they stand in for. Attachments carry a MIME type and a file path.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY,
            post_type TEXT NOT NULL DEFAULT 'post',
            parent_id INTEGER,
            title TEXT NOT NULL DEFAULT '',
            body TEXT NOT NULL DEFAULT '',
            excerpt TEXT NOT NULL DEFAULT '',
            mime_type TEXT,
            file_path TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS post_meta (
            post_id INTEGER NOT NULL,
            meta_key TEXT NOT NULL,
            meta_value TEXT NOT NULL,
            PRIMARY KEY (post_id, meta_key),
            FOREIGN KEY (post_id) REFERENCES posts(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS post_terms (
            post_id INTEGER NOT NULL,
            taxonomy TEXT NOT NULL,
            name TEXT NOT NULL,
            position INTEGER NOT NULL DEFAULT 0,
            UNIQUE(post_id, taxonomy, name),
            FOREIGN KEY (post_id) REFERENCES posts(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content_analysis (
            content_id INTEGER PRIMARY KEY,
            topics_json TEXT NOT NULL,
            keywords_json TEXT NOT NULL,
            sentiment_score REAL NOT NULL,
            readability_score INTEGER NOT NULL,
            embeddings_json TEXT NOT NULL DEFAULT '[]',
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS image_cache (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            image_hash TEXT NOT NULL UNIQUE,
            similarity_hash TEXT NOT NULL,
            alt_text TEXT NOT NULL DEFAULT '',
            caption TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL DEFAULT '',
            provider TEXT NOT NULL,
            confidence_score REAL NOT NULL DEFAULT 0,
            context_data TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            expires_at INTEGER,
            usage_count INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS similarity_clusters (
            cluster_id TEXT PRIMARY KEY,
            representative_hash TEXT NOT NULL,
            member_hashes TEXT NOT NULL,
            cluster_size INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_type ON posts(post_type, mime_type)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_post_terms_post ON post_terms(post_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_image_cache_similarity ON image_cache(similarity_hash)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_image_cache_expires ON image_cache(expires_at)")
        .execute(pool)
        .await?;

    Ok(())
}
