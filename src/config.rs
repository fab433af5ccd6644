use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub seo: SeoConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Similarity cache settings.
///
/// These are the only options the cache and the orchestrator read. They are
/// loaded once and handed to the components at construction time.
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enable_caching: bool,
    #[serde(default = "default_true")]
    pub enable_similarity_detection: bool,
    #[serde(default = "default_cache_duration_days")]
    pub cache_duration_days: i64,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_caching: true,
            enable_similarity_detection: true,
            cache_duration_days: default_cache_duration_days(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_cache_duration_days() -> i64 {
    30
}
fn default_similarity_threshold() -> f64 {
    0.85
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_freshness_hours")]
    pub freshness_hours: i64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            freshness_hours: default_freshness_hours(),
        }
    }
}

fn default_freshness_hours() -> i64 {
    24
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_kind")]
    pub kind: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            model: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider_kind() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    60
}

impl ProviderConfig {
    pub fn is_enabled(&self) -> bool {
        self.kind != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeoConfig {
    /// Focus-keyword sources in priority order.
    #[serde(default = "default_seo_providers")]
    pub providers: Vec<String>,
}

impl Default for SeoConfig {
    fn default() -> Self {
        Self {
            providers: default_seo_providers(),
        }
    }
}

fn default_seo_providers() -> Vec<String> {
    vec!["yoast".to_string(), "rank_math".to_string()]
}

impl Config {
    /// Config used when no file is available: a local database and defaults
    /// everywhere else.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/smartpics.sqlite"),
            },
            cache: CacheConfig::default(),
            analysis: AnalysisConfig::default(),
            provider: ProviderConfig::default(),
            seo: SeoConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Upper bounds keep expiry arithmetic well inside `i64` seconds.
const MAX_CACHE_DURATION_DAYS: i64 = 36_500;
const MAX_FRESHNESS_HOURS: i64 = 876_000;

fn validate(config: &Config) -> Result<()> {
    if !(1..=MAX_CACHE_DURATION_DAYS).contains(&config.cache.cache_duration_days) {
        anyhow::bail!(
            "cache.cache_duration_days must be in [1, {}]",
            MAX_CACHE_DURATION_DAYS
        );
    }

    if !(0.0..=1.0).contains(&config.cache.similarity_threshold) {
        anyhow::bail!("cache.similarity_threshold must be in [0.0, 1.0]");
    }

    if !(1..=MAX_FRESHNESS_HOURS).contains(&config.analysis.freshness_hours) {
        anyhow::bail!(
            "analysis.freshness_hours must be in [1, {}]",
            MAX_FRESHNESS_HOURS
        );
    }

    match config.provider.kind.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown provider kind: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    if config.provider.is_enabled() && config.provider.model.is_none() {
        anyhow::bail!(
            "provider.model must be specified when kind is '{}'",
            config.provider.kind
        );
    }

    for name in &config.seo.providers {
        match name.as_str() {
            "yoast" | "rank_math" => {}
            other => anyhow::bail!(
                "Unknown SEO provider: '{}'. Must be yoast or rank_math.",
                other
            ),
        }
    }

    Ok(())
}
