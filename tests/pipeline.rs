use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use smartpics::analyzer::TextAnalyzer;
use smartpics::cache::SimilarityCache;
use smartpics::config::{CacheConfig, SeoConfig};
use smartpics::error::ProcessError;
use smartpics::models::{CacheEntry, ContentEntity, GeneratedMetadata};
use smartpics::processor::{ImageProcessor, ALT_TEXT_META, PROCESSED_META, PROVIDER_META};
use smartpics::seo::{build_chain, YOAST_FOCUS_KEY};
use smartpics::similarity::Sha256Detector;
use smartpics::store::memory::{InMemoryContentStore, InMemoryStore};
use smartpics::store::CacheStore;
use smartpics::traits::{AiProvider, ContentStore, FixedClock, ImageContext, SimilarityRanker};

const NOW: i64 = 1_700_000_000;

/// Returns a fixed result and records every call.
struct RecordingProvider {
    result: GeneratedMetadata,
    calls: AtomicUsize,
    last_context: Mutex<Option<ImageContext>>,
}

impl RecordingProvider {
    fn new(alt_text: &str, caption: &str, title: &str) -> Self {
        Self {
            result: GeneratedMetadata {
                alt_text: alt_text.to_string(),
                caption: caption.to_string(),
                title: title.to_string(),
                provider: "vertex_ai".to_string(),
                confidence: 0.92,
            },
            calls: AtomicUsize::new(0),
            last_context: Mutex::new(None),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AiProvider for RecordingProvider {
    fn name(&self) -> &str {
        "vertex_ai"
    }

    async fn analyze_image(&self, _path: &Path, context: &ImageContext) -> Result<GeneratedMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_context.lock().unwrap() = Some(context.clone());
        Ok(self.result.clone())
    }
}

struct FailingProvider;

#[async_trait]
impl AiProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn analyze_image(&self, _path: &Path, _context: &ImageContext) -> Result<GeneratedMetadata> {
        anyhow::bail!("quota exceeded")
    }
}

/// Scores every candidate the same.
struct FlatRanker(f64);

impl SimilarityRanker for FlatRanker {
    fn rank(&self, _fp: &str, candidates: &[CacheEntry]) -> Vec<(CacheEntry, f64)> {
        candidates.iter().map(|e| (e.clone(), self.0)).collect()
    }
}

struct Harness {
    _tmp: TempDir,
    dir: PathBuf,
    content: Arc<InMemoryContentStore>,
    store: Arc<InMemoryStore>,
    processor: ImageProcessor,
}

impl Harness {
    fn new(provider: Arc<dyn AiProvider>, similarity_score: f64) -> Self {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_path_buf();
        let content = Arc::new(InMemoryContentStore::new());
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(FixedClock::new(NOW));

        let analyzer = Arc::new(TextAnalyzer::new(
            content.clone(),
            store.clone(),
            clock.clone(),
            24,
        ));
        let cache = Arc::new(SimilarityCache::new(
            store.clone(),
            Arc::new(FlatRanker(similarity_score)),
            clock.clone(),
            CacheConfig::default(),
        ));
        let focus = build_chain(&SeoConfig::default(), content.clone()).unwrap();

        let processor = ImageProcessor::new(
            content.clone(),
            cache,
            analyzer,
            Arc::new(Sha256Detector),
            provider,
            focus,
            clock,
        );

        Self {
            _tmp: tmp,
            dir,
            content,
            store,
            processor,
        }
    }

    fn add_post(&self, id: i64) {
        self.content.insert_content(ContentEntity {
            id,
            title: "Mountain Trails".to_string(),
            body: "<h2>Trail guide</h2><p>Mountain biking trails offer riders steep climbs.</p>"
                .to_string(),
            excerpt: String::new(),
            categories: vec!["Outdoors".to_string()],
            tags: vec!["cycling".to_string()],
        });
    }

    /// Image attachment whose file holds `bytes`.
    fn add_image(&self, id: i64, parent_id: Option<i64>, bytes: &[u8]) -> PathBuf {
        let path = self.dir.join(format!("image-{}.jpg", id));
        std::fs::write(&path, bytes).unwrap();
        self.content
            .insert_attachment(id, parent_id, "image/jpeg", Some(path.clone()));
        path
    }

    async fn alt_text(&self, id: i64) -> Option<String> {
        self.content.get_meta(id, ALT_TEXT_META).await.unwrap()
    }
}

#[tokio::test]
async fn test_cache_miss_generates_and_applies_metadata() {
    let provider = Arc::new(RecordingProvider::new("A red bicycle", "", ""));
    let h = Harness::new(provider.clone(), 0.0);
    h.add_post(1);
    h.add_image(10, Some(1), b"bicycle bytes");
    h.content.update_title(10, "IMG_0042").await.unwrap();
    h.content.update_excerpt(10, "Uploaded caption").await.unwrap();

    let result = h.processor.process_image(10, ImageContext::new()).await.unwrap();

    assert_eq!(result.alt_text, "A red bicycle");
    assert_eq!(result.provider, "vertex_ai");
    assert!((result.confidence - 0.92).abs() < 1e-9);
    assert!(!result.cached);
    assert!(!result.similarity_match);
    assert_eq!(provider.calls(), 1);

    assert_eq!(h.alt_text(10).await.as_deref(), Some("A red bicycle"));
    // empty caption and title leave the attachment fields alone
    assert_eq!(h.content.title(10).as_deref(), Some("IMG_0042"));
    assert_eq!(h.content.excerpt(10).as_deref(), Some("Uploaded caption"));
    assert_eq!(
        h.content.get_meta(10, PROCESSED_META).await.unwrap().as_deref(),
        Some("1")
    );
    assert_eq!(
        h.content.get_meta(10, PROVIDER_META).await.unwrap().as_deref(),
        Some("vertex_ai")
    );

    let entries = h.store.all_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].usage_count, 1);
    assert_eq!(entries[0].alt_text, "A red bicycle");
}

#[tokio::test]
async fn test_caption_and_title_are_applied_when_present() {
    let provider = Arc::new(RecordingProvider::new(
        "A red bicycle",
        "A red bicycle leaning on a wall.",
        "Red Bicycle",
    ));
    let h = Harness::new(provider, 0.0);
    h.add_image(10, None, b"bicycle bytes");

    h.processor.process_image(10, ImageContext::new()).await.unwrap();

    assert_eq!(h.content.title(10).as_deref(), Some("Red Bicycle"));
    assert_eq!(
        h.content.excerpt(10).as_deref(),
        Some("A red bicycle leaning on a wall.")
    );
}

#[tokio::test]
async fn test_identical_file_hits_exact_cache() {
    let provider = Arc::new(RecordingProvider::new("A red bicycle", "", ""));
    let h = Harness::new(provider.clone(), 0.0);
    h.add_image(10, None, b"same bytes");
    h.add_image(11, None, b"same bytes");

    h.processor.process_image(10, ImageContext::new()).await.unwrap();
    let second = h.processor.process_image(11, ImageContext::new()).await.unwrap();

    assert_eq!(provider.calls(), 1);
    assert!(second.cached);
    assert!(!second.similarity_match);
    assert_eq!(second.cache_date, Some(NOW));
    assert_eq!(h.alt_text(11).await.as_deref(), Some("A red bicycle"));
    assert_eq!(h.store.all_entries().await.unwrap()[0].usage_count, 2);
}

#[tokio::test]
async fn test_similar_image_skips_provider() {
    let provider = Arc::new(RecordingProvider::new("A red bicycle", "", ""));
    let h = Harness::new(provider.clone(), 0.9);
    h.add_image(10, None, b"original bytes");
    h.add_image(11, None, b"slightly different bytes");

    h.processor.process_image(10, ImageContext::new()).await.unwrap();
    let second = h.processor.process_image(11, ImageContext::new()).await.unwrap();

    assert_eq!(provider.calls(), 1);
    assert!(second.cached);
    assert!(second.similarity_match);
    assert_eq!(second.similarity_score, Some(0.9));
    assert_eq!(second.alt_text, "A red bicycle");
    assert_eq!(h.alt_text(11).await.as_deref(), Some("A red bicycle"));
}

#[tokio::test]
async fn test_context_gathered_from_parent_post() {
    let provider = Arc::new(RecordingProvider::new("A mountain bike", "", ""));
    let h = Harness::new(provider.clone(), 0.0);
    h.add_post(1);
    h.content
        .set_meta(1, YOAST_FOCUS_KEY, "mountain biking")
        .await
        .unwrap();
    h.add_image(10, Some(1), b"bike bytes");

    let mut overrides = ImageContext::new();
    overrides.insert("post_title".into(), "Caller Title".into());
    h.processor.process_image(10, overrides).await.unwrap();

    let ctx = provider.last_context.lock().unwrap().clone().unwrap();
    assert_eq!(ctx["post_title"], "Caller Title");
    assert_eq!(ctx["post_id"], 1);
    assert_eq!(ctx["focus_keyword"], "mountain biking");
    let topics = ctx["topics"].as_array().unwrap();
    assert_eq!(topics[0], "Outdoors");
    assert_eq!(topics[1], "cycling");
    assert!(ctx["post_content"].as_str().unwrap().contains("steep climbs"));
    assert!(ctx.contains_key("sentiment"));
}

#[tokio::test]
async fn test_orphan_attachment_gets_empty_context() {
    let provider = Arc::new(RecordingProvider::new("A cat", "", ""));
    let h = Harness::new(provider.clone(), 0.0);
    h.add_image(10, Some(999), b"cat bytes");

    h.processor.process_image(10, ImageContext::new()).await.unwrap();
    let ctx = provider.last_context.lock().unwrap().clone().unwrap();
    assert!(ctx.is_empty());
}

#[tokio::test]
async fn test_already_processed_is_rejected_before_provider() {
    let provider = Arc::new(RecordingProvider::new("A red bicycle", "", ""));
    let h = Harness::new(provider.clone(), 0.0);
    h.add_image(10, None, b"bytes");
    h.content
        .set_meta(10, ALT_TEXT_META, "Hand-written alt")
        .await
        .unwrap();

    let err = h
        .processor
        .process_image(10, ImageContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::AlreadyProcessed(10)));
    assert_eq!(provider.calls(), 0);
    assert_eq!(h.alt_text(10).await.as_deref(), Some("Hand-written alt"));
}

#[tokio::test]
async fn test_whitespace_alt_text_is_never_overwritten() {
    let provider = Arc::new(RecordingProvider::new("A red bicycle", "", ""));
    let h = Harness::new(provider.clone(), 0.0);
    h.add_image(10, None, b"bytes");
    h.content.set_meta(10, ALT_TEXT_META, "   ").await.unwrap();

    let err = h
        .processor
        .process_image(10, ImageContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::AlreadyProcessed(10)));
    assert_eq!(provider.calls(), 0);
    assert_eq!(h.alt_text(10).await.as_deref(), Some("   "));

    // bulk selection skips it too
    let summary = h.processor.bulk_process(10, 0).await;
    assert_eq!(summary.processed, 0);
}

#[tokio::test]
async fn test_empty_alt_text_counts_as_missing() {
    let provider = Arc::new(RecordingProvider::new("A red bicycle", "", ""));
    let h = Harness::new(provider.clone(), 0.0);
    h.add_image(10, None, b"bytes");
    h.content.set_meta(10, ALT_TEXT_META, "").await.unwrap();

    h.processor.process_image(10, ImageContext::new()).await.unwrap();
    assert_eq!(h.alt_text(10).await.as_deref(), Some("A red bicycle"));
}

#[tokio::test]
async fn test_invalid_attachments() {
    let provider = Arc::new(RecordingProvider::new("x", "", ""));
    let h = Harness::new(provider.clone(), 0.0);
    h.add_post(1);
    h.content
        .insert_attachment(20, None, "application/pdf", Some(h.dir.join("doc.pdf")));

    for id in [1, 20, 404] {
        let err = h
            .processor
            .process_image(id, ImageContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_attachment", "id {}", id);
    }
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_missing_file() {
    let provider = Arc::new(RecordingProvider::new("x", "", ""));
    let h = Harness::new(provider.clone(), 0.0);
    h.content
        .insert_attachment(10, None, "image/png", Some(h.dir.join("gone.png")));
    h.content.insert_attachment(11, None, "image/png", None);

    for id in [10, 11] {
        let err = h
            .processor
            .process_image(id, ImageContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "file_not_found");
    }
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_provider_error_leaves_no_writes() {
    let h = Harness::new(Arc::new(FailingProvider), 0.0);
    h.add_image(10, None, b"bytes");

    let err = h
        .processor
        .process_image(10, ImageContext::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "collaborator_error");
    assert_eq!(err.to_string(), "quota exceeded");

    assert_eq!(h.alt_text(10).await, None);
    assert_eq!(h.content.get_meta(10, PROCESSED_META).await.unwrap(), None);
    assert!(h.store.all_entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_bulk_records_per_item_failures() {
    let provider = Arc::new(RecordingProvider::new("A photo", "", ""));
    let h = Harness::new(provider.clone(), 0.0);
    h.add_image(30, None, b"first");
    h.content
        .insert_attachment(31, None, "image/jpeg", Some(h.dir.join("missing.jpg")));
    h.add_image(32, None, b"third");
    h.content
        .insert_attachment(33, None, "video/mp4", Some(h.dir.join("clip.mp4")));

    let summary = h.processor.bulk_process(3, 0).await;

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.successful, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].id, Some(31));
    assert_eq!(summary.errors[0].error, "file_not_found");
    assert_eq!(provider.calls(), 2);

    // processed images drop out of the candidate list
    let again = h.processor.bulk_process(10, 0).await;
    assert_eq!(again.processed, 1);
    assert_eq!(again.errors[0].id, Some(31));
}

#[tokio::test]
async fn test_bulk_offset_and_limit() {
    let provider = Arc::new(RecordingProvider::new("A photo", "", ""));
    let h = Harness::new(provider.clone(), 0.0);
    for id in 40..45 {
        h.add_image(id, None, format!("image {}", id).as_bytes());
    }

    let summary = h.processor.bulk_process(2, 1).await;
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.successful, 2);
    assert_eq!(h.alt_text(40).await, None);
    assert_eq!(h.alt_text(41).await.as_deref(), Some("A photo"));
    assert_eq!(h.alt_text(42).await.as_deref(), Some("A photo"));
    assert_eq!(h.alt_text(43).await, None);
}
