//! Per-image alt-text workflow.
//!
//! [`ImageProcessor`] is the only component that writes attachment
//! metadata. One call runs these steps in order and stops at the first
//! failure:
//!
//! 1. Resolve the attachment; it must exist and be `image/*`.
//! 2. The file must exist on disk.
//! 3. Existing non-empty alt text is never overwritten.
//! 4. Fingerprint the file and consult the cache (exact, then similar).
//!    A hit is applied and returned without calling the AI provider.
//! 5. Gather context from the parent post: title, stripped content, SEO
//!    focus keyword, topics and sentiment. Caller-supplied keys win.
//! 6. Call the AI provider. Its error is returned unchanged.
//! 7. Cache the result, then write alt text, caption and title (each only
//!    when non-empty) and the bookkeeping meta (always).
//!
//! No step before 7 writes anything, so a failed provider call leaves the
//! attachment untouched.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::analyzer::TextAnalyzer;
use crate::cache::{CacheHit, SimilarityCache};
use crate::error::ProcessError;
use crate::extract::{strip_tags, trim_words};
use crate::models::{BulkItemError, BulkSummary, GeneratedMetadata, ProcessedImage};
use crate::traits::{
    AiProvider, Clock, ContentStore, FocusKeywordProvider, ImageContext, SimilarityDetector,
};

/// Attachment alt text, as the CMS stores it.
pub const ALT_TEXT_META: &str = "_wp_attachment_image_alt";
pub const PROCESSED_META: &str = "_smartpics_processed";
pub const PROVIDER_META: &str = "_smartpics_provider";
pub const CONFIDENCE_META: &str = "_smartpics_confidence";
pub const PROCESSED_AT_META: &str = "_smartpics_processed_at";

/// Parent post text sent to the provider is cut to this many words.
const CONTEXT_CONTENT_WORDS: usize = 200;

pub struct ImageProcessor {
    content: Arc<dyn ContentStore>,
    cache: Arc<SimilarityCache>,
    analyzer: Arc<TextAnalyzer>,
    detector: Arc<dyn SimilarityDetector>,
    provider: Arc<dyn AiProvider>,
    focus: Arc<dyn FocusKeywordProvider>,
    clock: Arc<dyn Clock>,
}

impl ImageProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        content: Arc<dyn ContentStore>,
        cache: Arc<SimilarityCache>,
        analyzer: Arc<TextAnalyzer>,
        detector: Arc<dyn SimilarityDetector>,
        provider: Arc<dyn AiProvider>,
        focus: Arc<dyn FocusKeywordProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            content,
            cache,
            analyzer,
            detector,
            provider,
            focus,
            clock,
        }
    }

    /// Generate and apply metadata for one image attachment.
    pub async fn process_image(
        &self,
        attachment_id: i64,
        context: ImageContext,
    ) -> Result<ProcessedImage, ProcessError> {
        let attachment = self
            .content
            .get_attachment(attachment_id)
            .await
            .map_err(ProcessError::Storage)?
            .filter(|a| a.is_image())
            .ok_or(ProcessError::InvalidAttachment(attachment_id))?;

        let path = attachment
            .file_path
            .clone()
            .ok_or_else(|| ProcessError::FileNotFound(PathBuf::new()))?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(ProcessError::FileNotFound(path));
        }

        let existing_alt = self
            .content
            .get_meta(attachment_id, ALT_TEXT_META)
            .await
            .map_err(ProcessError::Storage)?;
        if existing_alt.is_some_and(|alt| !alt.is_empty()) {
            return Err(ProcessError::AlreadyProcessed(attachment_id));
        }

        let fingerprint = self
            .detector
            .generate_hash(&path)
            .await
            .map_err(ProcessError::Collaborator)?;

        if let Some(hit) = self.lookup(&fingerprint).await? {
            let metadata = GeneratedMetadata {
                alt_text: hit.entry.alt_text.clone(),
                caption: hit.entry.caption.clone(),
                title: hit.entry.title.clone(),
                provider: hit.entry.provider.clone(),
                confidence: hit.entry.confidence_score,
            };
            self.apply_metadata(attachment_id, &metadata).await?;
            tracing::info!(
                attachment_id,
                similarity_match = hit.similarity_match,
                "applied cached metadata"
            );
            return Ok(ProcessedImage {
                alt_text: metadata.alt_text,
                caption: metadata.caption,
                title: metadata.title,
                provider: metadata.provider,
                confidence: metadata.confidence,
                cached: hit.cached,
                similarity_match: hit.similarity_match,
                similarity_score: hit.similarity_score,
                cache_date: Some(hit.entry.created_at),
            });
        }

        let mut full_context = self.gather_context(attachment.parent_id).await?;
        for (key, value) in context {
            full_context.insert(key, value);
        }

        let result = self
            .provider
            .analyze_image(&path, &full_context)
            .await
            .map_err(ProcessError::Collaborator)?;

        let context_data = serde_json::json!({
            "post_id": attachment.parent_id,
            "topics": full_context.get("topics").cloned().unwrap_or(Value::Null),
            "sentiment": full_context.get("sentiment").cloned().unwrap_or(Value::Null),
        });
        self.cache
            .store(&fingerprint, &result, &context_data)
            .await
            .map_err(ProcessError::Storage)?;

        self.apply_metadata(attachment_id, &result).await?;
        tracing::info!(
            attachment_id,
            provider = %result.provider,
            confidence = result.confidence,
            "generated image metadata"
        );

        Ok(ProcessedImage {
            alt_text: result.alt_text,
            caption: result.caption,
            title: result.title,
            provider: result.provider,
            confidence: result.confidence,
            cached: false,
            similarity_match: false,
            similarity_score: None,
            cache_date: None,
        })
    }

    /// Process up to `limit` image attachments missing alt text, skipping
    /// `offset`, one at a time in ascending id order.
    ///
    /// Never fails: item errors, and a failure to list candidates, are
    /// reported in the summary.
    pub async fn bulk_process(&self, limit: i64, offset: i64) -> BulkSummary {
        let mut summary = BulkSummary::default();

        let ids = match self.content.attachments_missing_alt(limit, offset).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list attachments for bulk run");
                summary.errors.push(BulkItemError {
                    id: None,
                    error: "storage_error".to_string(),
                    message: format!("{:#}", e),
                });
                return summary;
            }
        };

        for id in ids {
            summary.processed += 1;
            match self.process_image(id, ImageContext::new()).await {
                Ok(_) => summary.successful += 1,
                Err(e) => {
                    tracing::warn!(attachment_id = id, code = e.code(), error = %e, "bulk item failed");
                    summary.failed += 1;
                    summary.errors.push(BulkItemError {
                        id: Some(id),
                        error: e.code().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            processed = summary.processed,
            successful = summary.successful,
            failed = summary.failed,
            "bulk run finished"
        );
        summary
    }

    async fn lookup(&self, fingerprint: &str) -> Result<Option<CacheHit>, ProcessError> {
        if let Some(hit) = self
            .cache
            .lookup_exact(fingerprint)
            .await
            .map_err(ProcessError::Storage)?
        {
            return Ok(Some(hit));
        }
        self.cache
            .lookup_similar_default(fingerprint)
            .await
            .map_err(ProcessError::Storage)
    }

    async fn gather_context(&self, parent_id: Option<i64>) -> Result<ImageContext, ProcessError> {
        let mut context = ImageContext::new();
        let post_id = match parent_id {
            Some(id) => id,
            None => return Ok(context),
        };

        let post = self
            .content
            .get_content(post_id)
            .await
            .map_err(ProcessError::Storage)?;
        let post = match post {
            Some(post) => post,
            None => return Ok(context),
        };

        context.insert("post_id".into(), post_id.into());
        context.insert("post_title".into(), strip_tags(&post.title).into());
        context.insert(
            "post_content".into(),
            trim_words(&strip_tags(&post.body), CONTEXT_CONTENT_WORDS).into(),
        );

        let keyword = self
            .focus
            .focus_keyword(post_id)
            .await
            .map_err(ProcessError::Collaborator)?;
        if let Some(keyword) = keyword.filter(|k| !k.trim().is_empty()) {
            context.insert("focus_keyword".into(), keyword.into());
        }

        if let Some(analysis) = self
            .analyzer
            .analyze(post_id)
            .await
            .map_err(ProcessError::Storage)?
        {
            context.insert("topics".into(), analysis.topics.into());
            context.insert("sentiment".into(), analysis.sentiment_score.into());
        }

        Ok(context)
    }

    async fn apply_metadata(
        &self,
        attachment_id: i64,
        metadata: &GeneratedMetadata,
    ) -> Result<(), ProcessError> {
        self.write_metadata(attachment_id, metadata)
            .await
            .map_err(ProcessError::Storage)
    }

    async fn write_metadata(
        &self,
        attachment_id: i64,
        metadata: &GeneratedMetadata,
    ) -> anyhow::Result<()> {
        if !metadata.alt_text.is_empty() {
            self.content
                .set_meta(attachment_id, ALT_TEXT_META, &metadata.alt_text)
                .await?;
        }
        if !metadata.caption.is_empty() {
            self.content
                .update_excerpt(attachment_id, &metadata.caption)
                .await?;
        }
        if !metadata.title.is_empty() {
            self.content
                .update_title(attachment_id, &metadata.title)
                .await?;
        }

        self.content
            .set_meta(attachment_id, PROCESSED_META, "1")
            .await?;
        self.content
            .set_meta(attachment_id, PROVIDER_META, &metadata.provider)
            .await?;
        self.content
            .set_meta(attachment_id, CONFIDENCE_META, &metadata.confidence.to_string())
            .await?;
        self.content
            .set_meta(
                attachment_id,
                PROCESSED_AT_META,
                &self.clock.now().to_string(),
            )
            .await?;
        Ok(())
    }
}
