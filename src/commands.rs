//! CLI command handlers.
//!
//! Each `run_*` function opens the pipeline, performs one operation and
//! prints its result to stdout as pretty JSON.

use anyhow::Result;
use serde::Serialize;

use crate::app::App;
use crate::cache::EvictionPolicy;
use crate::config::Config;
use crate::traits::ImageContext;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `smartpics analyze <content_id>`
pub async fn run_analyze(config: &Config, content_id: i64) -> Result<()> {
    let app = App::open(config).await?;
    match app.analyzer.analyze(content_id).await? {
        Some(analysis) => print_json(&analysis),
        None => {
            println!("content {} not found", content_id);
            Ok(())
        }
    }
}

/// `smartpics process <attachment_id> [--context key=value]...`
///
/// A typed processing failure is returned as an error so the process exits
/// non-zero.
pub async fn run_process(
    config: &Config,
    attachment_id: i64,
    context: Vec<(String, String)>,
) -> Result<()> {
    let app = App::open(config).await?;
    let processor = app.configured_processor(config)?;

    let mut ctx = ImageContext::new();
    for (key, value) in context {
        ctx.insert(key, value.into());
    }

    match processor.process_image(attachment_id, ctx).await {
        Ok(result) => print_json(&result),
        Err(e) => Err(e.into()),
    }
}

/// `smartpics bulk [--limit N] [--offset N]`
pub async fn run_bulk(config: &Config, limit: i64, offset: i64) -> Result<()> {
    let app = App::open(config).await?;
    let summary = app
        .configured_processor(config)?
        .bulk_process(limit, offset)
        .await;
    print_json(&summary)
}

/// `smartpics cache stats`
pub async fn run_cache_stats(config: &Config) -> Result<()> {
    let app = App::open(config).await?;
    print_json(&app.cache.stats().await?)
}

/// `smartpics cache evict <policy>`
pub async fn run_cache_evict(config: &Config, policy: &str) -> Result<()> {
    let policy: EvictionPolicy = policy.parse()?;
    let app = App::open(config).await?;
    let removed = app.cache.evict(policy).await?;
    println!("Evicted {} cache entries.", removed);
    Ok(())
}

/// `smartpics cache optimize`
pub async fn run_cache_optimize(config: &Config) -> Result<()> {
    let app = App::open(config).await?;
    print_json(&app.cache.optimize().await?)
}

/// `smartpics cache clusters`
pub async fn run_cache_clusters(config: &Config) -> Result<()> {
    let app = App::open(config).await?;
    let clusters = app.cache.clusters().await?;
    if clusters.is_empty() {
        println!("No similarity clusters. Run `smartpics cache optimize` to build them.");
        return Ok(());
    }
    print_json(&clusters)
}
