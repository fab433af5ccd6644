//! Text feature extraction for content entities.
//!
//! [`TextAnalyzer::analyze`] turns a content entity into a
//! [`ContentAnalysis`] (topics, keywords, sentiment, readability) and keeps
//! the result in an [`AnalysisStore`] so repeated calls within the freshness
//! window are served without recomputation.
//!
//! The four passes are pure functions and are exported for direct use:
//!
//! | Function | Output |
//! |----------|--------|
//! | [`extract_topics`] | topics + keywords from word and phrase frequency |
//! | [`sentiment_score`] | positive share of sentiment words, `0.5` when none |
//! | [`readability_score`] | Flesch Reading Ease clamped to `0..=100` |
//! | [`count_syllables`] | vowel-group syllable estimate for one word |

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use crate::extract::StructuredContent;
use crate::models::ContentAnalysis;
use crate::store::AnalysisStore;
use crate::traits::{Clock, ContentStore};

/// Maximum number of topics kept.
pub const MAX_TOPICS: usize = 10;

const CANDIDATE_WORDS: usize = 20;
const TOPIC_WORDS: usize = 10;
const TOPIC_PHRASES: usize = 5;
/// Two-word phrases must be longer than this, joining space included.
const MIN_PHRASE_LEN: usize = 8;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "him", "his", "how", "its", "may", "who", "did", "she", "been",
    "have", "this", "that", "from", "they", "were", "will", "with", "into", "than", "then", "them",
    "what", "when", "your", "which", "their", "there", "would", "about", "could", "other", "these",
    "those",
];

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "amazing", "wonderful", "fantastic", "awesome", "best", "love",
    "beautiful", "happy", "perfect", "brilliant", "outstanding", "superb", "delightful", "positive",
    "success", "successful", "enjoy",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "awful", "horrible", "worst", "hate", "ugly", "poor", "disappointing",
    "sad", "negative", "failure", "failed", "broken", "wrong", "problem", "difficult", "angry",
    "annoying", "useless",
];

// ═══════════════════════════════════════════════════════════════════════
// Analyzer
// ═══════════════════════════════════════════════════════════════════════

/// Computes and caches [`ContentAnalysis`] rows.
pub struct TextAnalyzer {
    content: Arc<dyn ContentStore>,
    store: Arc<dyn AnalysisStore>,
    clock: Arc<dyn Clock>,
    freshness_secs: i64,
}

impl TextAnalyzer {
    pub fn new(
        content: Arc<dyn ContentStore>,
        store: Arc<dyn AnalysisStore>,
        clock: Arc<dyn Clock>,
        freshness_hours: i64,
    ) -> Self {
        Self {
            content,
            store,
            clock,
            freshness_secs: freshness_hours.saturating_mul(3600),
        }
    }

    /// Analyze a content entity.
    ///
    /// Returns `Ok(None)` when `content_id` does not resolve. A stored
    /// analysis younger than the freshness window is returned as-is.
    pub async fn analyze(&self, content_id: i64) -> Result<Option<ContentAnalysis>> {
        let now = self.clock.now();

        if let Some(stored) = self.store.get_analysis(content_id).await? {
            if now.saturating_sub(stored.updated_at) < self.freshness_secs {
                tracing::debug!(content_id, "analysis cache hit");
                return Ok(Some(stored));
            }
        }

        let entity = match self.content.get_content(content_id).await? {
            Some(entity) => entity,
            None => {
                tracing::debug!(content_id, "content not found");
                return Ok(None);
            }
        };

        let structured = StructuredContent::from_entity(&entity);
        let analysis = analyze_structured(&structured, now);
        self.store.put_analysis(content_id, &analysis).await?;

        tracing::debug!(
            content_id,
            topics = analysis.topics.len(),
            readability = analysis.readability_score,
            "analysis computed"
        );
        Ok(Some(analysis))
    }
}

/// Run all passes over already-extracted content.
pub fn analyze_structured(content: &StructuredContent, now: i64) -> ContentAnalysis {
    let combined = content.combined_text();
    let (topics, keywords) = extract_topics(&combined, &content.categories, &content.tags);
    let sentiment_input = format!("{} {}", content.title, content.body);

    ContentAnalysis {
        topics,
        keywords,
        sentiment_score: sentiment_score(&sentiment_input),
        readability_score: readability_score(&content.body),
        embeddings: Vec::new(),
        updated_at: now,
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Topics and keywords
// ═══════════════════════════════════════════════════════════════════════

/// Extract `(topics, keywords)` from text plus taxonomy names.
///
/// Topics start with categories then tags, followed by the most frequent
/// words and two-word phrases; duplicates are dropped and the list is capped
/// at [`MAX_TOPICS`]. Keywords are the single-word candidates only.
pub fn extract_topics(
    text: &str,
    categories: &[String],
    tags: &[String],
) -> (Vec<String>, Vec<String>) {
    let tokens = filtered_tokens(text);

    let phrases: Vec<String> = tokens
        .windows(2)
        .map(|pair| format!("{} {}", pair[0], pair[1]))
        .filter(|p| p.len() > MIN_PHRASE_LEN)
        .collect();

    let words = rank_by_frequency(&tokens);
    let phrases = rank_by_frequency(&phrases);

    let mut topics: Vec<String> = Vec::new();
    let topic_sources = categories
        .iter()
        .chain(tags.iter())
        .chain(words.iter().take(TOPIC_WORDS))
        .chain(phrases.iter().take(TOPIC_PHRASES));
    for candidate in topic_sources {
        if !candidate.is_empty() && !topics.contains(candidate) {
            topics.push(candidate.clone());
        }
    }
    topics.truncate(MAX_TOPICS);

    let keywords: Vec<String> = words
        .iter()
        .take(CANDIDATE_WORDS)
        .chain(phrases.iter().take(TOPIC_PHRASES))
        .filter(|k| !k.contains(char::is_whitespace))
        .cloned()
        .collect();

    (topics, keywords)
}

/// Lowercased ASCII alphanumeric tokens longer than three characters,
/// stop words removed, in text order.
fn filtered_tokens(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();

    cleaned
        .split_whitespace()
        .filter(|t| t.len() > 3 && !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Distinct items by descending count; ties keep first-encounter order.
fn rank_by_frequency(items: &[String]) -> Vec<String> {
    let mut order: Vec<&String> = Vec::new();
    let mut counts: HashMap<&String, usize> = HashMap::new();
    for item in items {
        let count = counts.entry(item).or_insert(0);
        if *count == 0 {
            order.push(item);
        }
        *count += 1;
    }
    // sort_by is stable, which preserves encounter order among equal counts
    order.sort_by(|a, b| counts[b].cmp(&counts[a]));
    order.into_iter().cloned().collect()
}

// ═══════════════════════════════════════════════════════════════════════
// Sentiment
// ═══════════════════════════════════════════════════════════════════════

/// Share of positive words among all sentiment-bearing words, in `[0, 1]`.
/// Exactly `0.5` when the text contains none.
pub fn sentiment_score(text: &str) -> f64 {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphabetic() || c.is_whitespace())
        .collect();

    let mut positive = 0usize;
    let mut negative = 0usize;
    for token in cleaned.split_whitespace() {
        if POSITIVE_WORDS.contains(&token) {
            positive += 1;
        } else if NEGATIVE_WORDS.contains(&token) {
            negative += 1;
        }
    }

    if positive + negative == 0 {
        return 0.5;
    }
    positive as f64 / (positive + negative) as f64
}

// ═══════════════════════════════════════════════════════════════════════
// Readability
// ═══════════════════════════════════════════════════════════════════════

/// Flesch Reading Ease of plain text, truncated and clamped to `0..=100`.
/// Empty text scores 0.
pub fn readability_score(text: &str) -> i64 {
    if text.trim().is_empty() {
        return 0;
    }

    // Splitting on delimiter runs yields runs + 1 segments, the last of which
    // is not a sentence, so the sentence count is the number of runs.
    let sentences = delimiter_runs(text).max(1);

    let words: Vec<&str> = text.split_whitespace().collect();
    let word_count = words.len().max(1);
    let syllables: usize = words.iter().map(|w| count_syllables(w)).sum();

    let score = 206.835
        - 1.015 * (word_count as f64 / sentences as f64)
        - 84.6 * (syllables as f64 / word_count as f64);

    (score.trunc() as i64).clamp(0, 100)
}

/// Number of maximal runs of `.`, `!` and `?`.
fn delimiter_runs(text: &str) -> usize {
    let mut runs = 0;
    let mut in_run = false;
    for c in text.chars() {
        let delimiter = matches!(c, '.' | '!' | '?');
        if delimiter && !in_run {
            runs += 1;
        }
        in_run = delimiter;
    }
    runs
}

/// Estimated syllables in one word, never less than 1.
pub fn count_syllables(word: &str) -> usize {
    let word: String = word
        .chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(char::to_lowercase)
        .collect();

    if word.chars().count() <= 3 {
        return 1;
    }

    let mut count = 0usize;
    let mut previous_vowel = false;
    for c in word.chars() {
        let vowel = matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
        if vowel && !previous_vowel {
            count += 1;
        }
        previous_vowel = vowel;
    }

    if word.ends_with('e') && count > 1 {
        count -= 1;
    }
    count.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentEntity;
    use crate::store::memory::{InMemoryContentStore, InMemoryStore};
    use crate::traits::FixedClock;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_readability_fixture_clamped() {
        // 6 one-syllable words, 2 sentences: 206.835 - 3.045 - 84.6 = 119.19
        assert_eq!(readability_score("The cat sat. The dog ran."), 100);
    }

    #[test]
    fn test_readability_fixture_mid_range() {
        // 15 words, 2 sentences, 20 syllables:
        // 206.835 - 1.015 * 7.5 - 84.6 * 20/15 = 86.4225
        let text = "The quick brown fox jumps over the lazy dog. Cats sleep during the warm afternoon.";
        assert_eq!(readability_score(text), 86);
    }

    #[test]
    fn test_readability_empty_is_zero() {
        assert_eq!(readability_score(""), 0);
        assert_eq!(readability_score("   \n "), 0);
    }

    #[test]
    fn test_readability_floor_clamps_to_zero() {
        let text = "Programming languages require careful consideration. \
                    Developers appreciate reliable tooling.";
        assert_eq!(readability_score(text), 0);
    }

    #[test]
    fn test_readability_without_terminal_punctuation() {
        // one segment, no delimiter: still counted as one sentence
        assert_eq!(readability_score("the cat sat"), 100);
    }

    #[test]
    fn test_readability_in_bounds() {
        for text in ["a", "Hello world!!! Again?", "x. y. z.", "Supercalifragilistic."] {
            let score = readability_score(text);
            assert!((0..=100).contains(&score), "{} -> {}", text, score);
        }
    }

    #[test]
    fn test_count_syllables() {
        assert_eq!(count_syllables("cat"), 1);
        assert_eq!(count_syllables("the"), 1);
        assert_eq!(count_syllables("over"), 2);
        assert_eq!(count_syllables("afternoon"), 3);
        assert_eq!(count_syllables("consideration"), 5);
        assert_eq!(count_syllables("require"), 2);
        assert_eq!(count_syllables("table"), 1);
        assert_eq!(count_syllables("queue"), 1);
        assert_eq!(count_syllables("Developers,"), 4);
        assert_eq!(count_syllables("1234"), 1);
    }

    #[test]
    fn test_sentiment_neutral_without_sentiment_words() {
        assert_eq!(sentiment_score("The train leaves at noon."), 0.5);
        assert_eq!(sentiment_score(""), 0.5);
    }

    #[test]
    fn test_sentiment_ratio() {
        assert_eq!(sentiment_score("Great food, terrible service."), 0.5);
        assert_eq!(sentiment_score("An amazing, beautiful day!"), 1.0);
        assert_eq!(sentiment_score("bad BAD awful"), 0.0);
        let s = sentiment_score("good good good bad");
        assert!((s - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sentiment_whole_tokens_only() {
        // "goodness" and "badge" are not list words
        assert_eq!(sentiment_score("goodness badge"), 0.5);
    }

    #[test]
    fn test_sentiment_joins_punctuated_tokens() {
        // "well-good" reads as "wellgood", which is not a list word
        assert_eq!(sentiment_score("a well-good result"), 0.5);
        assert_eq!(sentiment_score("it wasn't bad-tempered"), 0.5);
        assert_eq!(sentiment_score("good-"), 1.0);
    }

    #[test]
    fn test_topics_fixture() {
        let text = "Mountain Biking Trails Mountain biking trails offer riders steep climbs \
                    and fast descents. Every mountain trail rewards patience.";
        let (topics, keywords) =
            extract_topics(text, &strings(&["Outdoors"]), &strings(&["cycling"]));
        assert_eq!(
            topics,
            strings(&[
                "Outdoors", "cycling", "mountain", "biking", "trails", "offer", "riders", "steep",
                "climbs", "fast"
            ])
        );
        assert_eq!(
            keywords,
            strings(&[
                "mountain", "biking", "trails", "offer", "riders", "steep", "climbs", "fast",
                "descents", "every", "trail", "rewards", "patience"
            ])
        );
    }

    #[test]
    fn test_topics_empty_input() {
        let (topics, keywords) = extract_topics("", &[], &[]);
        assert!(topics.is_empty());
        assert!(keywords.is_empty());
    }

    #[test]
    fn test_topics_dedup_against_taxonomy() {
        let (topics, _) = extract_topics(
            "travel travel travel guide",
            &strings(&["travel"]),
            &strings(&["travel", "guide"]),
        );
        assert_eq!(
            topics,
            strings(&["travel", "guide", "travel travel", "travel guide"])
        );
    }

    #[test]
    fn test_topics_cap_and_uniqueness_on_large_input() {
        let text = (0..500)
            .map(|i| format!("word{} token{}", i % 37, i % 11))
            .collect::<Vec<_>>()
            .join(" ");
        let categories: Vec<String> = (0..4).map(|i| format!("cat{}", i)).collect();
        let (topics, keywords) = extract_topics(&text, &categories, &categories);
        assert!(topics.len() <= MAX_TOPICS);
        let mut unique = topics.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), topics.len());
        assert!(keywords.len() <= CANDIDATE_WORDS);
        assert!(keywords.iter().all(|k| !k.contains(' ')));
    }

    #[test]
    fn test_stop_words_and_short_tokens_dropped() {
        let (_, keywords) = extract_topics("the cat with their large house", &[], &[]);
        assert_eq!(keywords, strings(&["large", "house"]));
    }

    #[test]
    fn test_frequency_ties_keep_encounter_order() {
        let items = strings(&["beta", "alpha", "gamma", "alpha", "beta"]);
        assert_eq!(rank_by_frequency(&items), strings(&["beta", "alpha", "gamma"]));
    }

    /// Content store wrapper that counts entity resolutions.
    struct CountingContent {
        inner: InMemoryContentStore,
        resolves: AtomicUsize,
    }

    #[async_trait]
    impl ContentStore for CountingContent {
        async fn get_content(&self, id: i64) -> Result<Option<ContentEntity>> {
            self.resolves.fetch_add(1, Ordering::SeqCst);
            self.inner.get_content(id).await
        }
        async fn get_attachment(&self, id: i64) -> Result<Option<crate::models::Attachment>> {
            self.inner.get_attachment(id).await
        }
        async fn get_meta(&self, id: i64, key: &str) -> Result<Option<String>> {
            self.inner.get_meta(id, key).await
        }
        async fn set_meta(&self, id: i64, key: &str, value: &str) -> Result<()> {
            self.inner.set_meta(id, key, value).await
        }
        async fn update_title(&self, id: i64, title: &str) -> Result<()> {
            self.inner.update_title(id, title).await
        }
        async fn update_excerpt(&self, id: i64, excerpt: &str) -> Result<()> {
            self.inner.update_excerpt(id, excerpt).await
        }
        async fn attachments_missing_alt(&self, limit: i64, offset: i64) -> Result<Vec<i64>> {
            self.inner.attachments_missing_alt(limit, offset).await
        }
    }

    fn analyzer_with_post(now: i64) -> (TextAnalyzer, Arc<CountingContent>, Arc<FixedClock>) {
        let content = Arc::new(CountingContent {
            inner: InMemoryContentStore::new(),
            resolves: AtomicUsize::new(0),
        });
        content.inner.insert_content(ContentEntity {
            id: 7,
            title: "A wonderful garden".into(),
            body: "<h2>Spring planting</h2><p>Tulips bloom early. Roses follow later.</p>".into(),
            excerpt: String::new(),
            categories: strings(&["Gardening"]),
            tags: strings(&["flowers"]),
        });
        let clock = Arc::new(FixedClock::new(now));
        let analyzer = TextAnalyzer::new(
            content.clone(),
            Arc::new(InMemoryStore::new()),
            clock.clone(),
            24,
        );
        (analyzer, content, clock)
    }

    #[tokio::test]
    async fn test_analyze_cached_within_freshness_window() {
        let (analyzer, content, clock) = analyzer_with_post(1_000_000);

        let first = analyzer.analyze(7).await.unwrap().unwrap();
        clock.advance(23 * 3600);
        let second = analyzer.analyze(7).await.unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(content.resolves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_analyze_recomputes_when_stale() {
        let (analyzer, content, clock) = analyzer_with_post(1_000_000);

        analyzer.analyze(7).await.unwrap().unwrap();
        clock.advance(24 * 3600);
        let refreshed = analyzer.analyze(7).await.unwrap().unwrap();

        assert_eq!(content.resolves.load(Ordering::SeqCst), 2);
        assert_eq!(refreshed.updated_at, 1_000_000 + 24 * 3600);
    }

    #[tokio::test]
    async fn test_analyze_not_found_is_none() {
        let (analyzer, _, _) = analyzer_with_post(0);
        assert!(analyzer.analyze(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_analyze_fields() {
        let (analyzer, _, _) = analyzer_with_post(42);
        let analysis = analyzer.analyze(7).await.unwrap().unwrap();

        assert_eq!(analysis.topics[0], "Gardening");
        assert_eq!(analysis.topics[1], "flowers");
        assert!(analysis.topics.contains(&"spring".to_string()));
        assert_eq!(analysis.sentiment_score, 1.0);
        assert!((0..=100).contains(&analysis.readability_score));
        assert!(analysis.embeddings.is_empty());
        assert_eq!(analysis.updated_at, 42);
    }
}
