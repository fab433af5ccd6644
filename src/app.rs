//! Composition root: wires the SQLite store and the configured
//! collaborators into the pipeline components.

use std::sync::Arc;

use anyhow::Result;

use crate::analyzer::TextAnalyzer;
use crate::cache::SimilarityCache;
use crate::config::Config;
use crate::db;
use crate::processor::ImageProcessor;
use crate::provider::create_provider;
use crate::seo::build_chain;
use crate::similarity::{HammingRanker, Sha256Detector};
use crate::sqlite_store::SqliteStore;
use crate::traits::{AiProvider, Clock, FocusKeywordProvider, SystemClock};

/// Pipeline components sharing one database pool.
///
/// The AI provider is only built when an [`ImageProcessor`] is requested,
/// so cache and analysis commands run without provider credentials.
pub struct App {
    pub store: Arc<SqliteStore>,
    pub analyzer: Arc<TextAnalyzer>,
    pub cache: Arc<SimilarityCache>,
    focus: Arc<dyn FocusKeywordProvider>,
    clock: Arc<dyn Clock>,
}

impl App {
    /// Connect to the configured database and build every component with
    /// the system clock. The schema must already exist (`smartpics init`).
    pub async fn open(config: &Config) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let pool = db::connect(config).await?;
        let store = Arc::new(SqliteStore::with_clock(pool, clock.clone()));

        let analyzer = Arc::new(TextAnalyzer::new(
            store.clone(),
            store.clone(),
            clock.clone(),
            config.analysis.freshness_hours,
        ));
        let cache = Arc::new(SimilarityCache::new(
            store.clone(),
            Arc::new(HammingRanker),
            clock.clone(),
            config.cache.clone(),
        ));
        let focus = build_chain(&config.seo, store.clone())?;

        Ok(Self {
            store,
            analyzer,
            cache,
            focus,
            clock,
        })
    }

    /// An orchestrator backed by the provider named in `config`.
    pub fn configured_processor(&self, config: &Config) -> Result<ImageProcessor> {
        let provider: Arc<dyn AiProvider> = Arc::from(create_provider(&config.provider)?);
        Ok(self.processor(provider))
    }

    pub fn processor(&self, provider: Arc<dyn AiProvider>) -> ImageProcessor {
        ImageProcessor::new(
            self.store.clone(),
            self.cache.clone(),
            self.analyzer.clone(),
            Arc::new(Sha256Detector),
            provider,
            self.focus.clone(),
            self.clock.clone(),
        )
    }
}
