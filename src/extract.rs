//! Structured text extraction from HTML content bodies.
//!
//! Content bodies arrive as HTML (or plain text). The analyzer needs the
//! visible text with all markup removed, the text of every heading, and an
//! excerpt. Extraction never fails: malformed markup degrades to whatever
//! text survives tag removal.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::ContentEntity;

/// Number of words kept when an excerpt is derived from the body.
pub const EXCERPT_WORDS: usize = 50;

static SCRIPT_STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script>|<style\b[^>]*>.*?</style>")
        .expect("valid script/style regex")
});

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<h([1-6])\b[^>]*>(.*?)</h[1-6]\s*>").expect("valid heading regex")
});

/// Text pulled out of a [`ContentEntity`], ready for analysis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredContent {
    pub title: String,
    pub body: String,
    pub excerpt: String,
    pub headings: Vec<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
}

impl StructuredContent {
    pub fn from_entity(entity: &ContentEntity) -> Self {
        let body = strip_tags(&entity.body);
        let explicit_excerpt = strip_tags(&entity.excerpt);
        let excerpt = if explicit_excerpt.is_empty() {
            trim_words(&body, EXCERPT_WORDS)
        } else {
            explicit_excerpt
        };

        Self {
            title: strip_tags(&entity.title),
            headings: extract_headings(&entity.body),
            body,
            excerpt,
            categories: entity.categories.clone(),
            tags: entity.tags.clone(),
        }
    }

    /// Title, body and headings joined into one analysis input.
    pub fn combined_text(&self) -> String {
        let mut parts: Vec<&str> = vec![self.title.as_str(), self.body.as_str()];
        parts.extend(self.headings.iter().map(String::as_str));
        parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Remove all markup, including script and style contents.
///
/// Tags are replaced by a space so adjacent block elements do not fuse
/// their words; runs of whitespace collapse to one space.
pub fn strip_tags(html: &str) -> String {
    let without_code = SCRIPT_STYLE_RE.replace_all(html, " ");
    let without_tags = TAG_RE.replace_all(&without_code, " ");
    without_tags.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of every `<h1>`..`<h6>` element in document order, tags stripped.
pub fn extract_headings(html: &str) -> Vec<String> {
    HEADING_RE
        .captures_iter(html)
        .filter_map(|cap| cap.get(2))
        .map(|m| strip_tags(m.as_str()))
        .filter(|h| !h.is_empty())
        .collect()
}

/// Keep the first `max_words` words, appending an ellipsis when trimmed.
pub fn trim_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        words.join(" ")
    } else {
        format!("{}…", words[..max_words].join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_tags_removes_markup() {
        let html = "<p>Hello <strong>world</strong></p><p>Second</p>";
        assert_eq!(strip_tags(html), "Hello world Second");
    }

    #[test]
    fn test_strip_tags_drops_script_contents() {
        let html = "<p>Visible</p><script>var hidden = 1;</script><style>p{}</style>";
        assert_eq!(strip_tags(html), "Visible");
    }

    #[test]
    fn test_strip_tags_plain_text_passthrough() {
        assert_eq!(strip_tags("  plain   text \n here "), "plain text here");
    }

    #[test]
    fn test_extract_headings_all_levels() {
        let html = "<h1>Top</h1><p>x</p><h2 class=\"a\">Second <em>level</em></h2><H6>Deep</H6>";
        assert_eq!(extract_headings(html), vec!["Top", "Second level", "Deep"]);
    }

    #[test]
    fn test_extract_headings_none() {
        assert!(extract_headings("<p>No headings here</p>").is_empty());
    }

    #[test]
    fn test_trim_words() {
        assert_eq!(trim_words("one two three", 5), "one two three");
        assert_eq!(trim_words("one two three", 2), "one two…");
    }

    #[test]
    fn test_excerpt_derived_from_body() {
        let body = (0..80).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let entity = ContentEntity {
            id: 1,
            title: "T".into(),
            body: format!("<p>{}</p>", body),
            ..Default::default()
        };
        let content = StructuredContent::from_entity(&entity);
        assert_eq!(content.excerpt.split_whitespace().count(), EXCERPT_WORDS);
        assert!(content.excerpt.ends_with('…'));
    }

    #[test]
    fn test_explicit_excerpt_wins() {
        let entity = ContentEntity {
            id: 1,
            body: "<p>Body text</p>".into(),
            excerpt: "Hand written".into(),
            ..Default::default()
        };
        assert_eq!(StructuredContent::from_entity(&entity).excerpt, "Hand written");
    }

    #[test]
    fn test_combined_text_includes_headings() {
        let entity = ContentEntity {
            id: 1,
            title: "Title".into(),
            body: "<h2>Head</h2><p>Body</p>".into(),
            ..Default::default()
        };
        let content = StructuredContent::from_entity(&entity);
        assert_eq!(content.combined_text(), "Title Head Body Head");
    }
}
