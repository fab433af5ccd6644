//! Built-in image fingerprinting and similarity ranking.
//!
//! [`Sha256Detector`] fingerprints the raw file bytes, so only byte-identical
//! files collide. [`HammingRanker`] scores hex fingerprints by the share of
//! matching bits, which is meaningful for perceptual hashes supplied by a
//! different [`SimilarityDetector`] and degrades to "exact or nothing" for
//! cryptographic ones.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::models::CacheEntry;
use crate::traits::{SimilarityDetector, SimilarityRanker};

/// SHA-256 of the image file contents, hex encoded.
pub struct Sha256Detector;

#[async_trait]
impl SimilarityDetector for Sha256Detector {
    async fn generate_hash(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image: {}", path.display()))?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// Ranks candidates by normalized Hamming similarity of hex fingerprints.
///
/// Each candidate is scored against both its image hash and its similarity
/// hash; the better of the two counts.
pub struct HammingRanker;

impl SimilarityRanker for HammingRanker {
    fn rank(&self, fingerprint: &str, candidates: &[CacheEntry]) -> Vec<(CacheEntry, f64)> {
        let mut scored: Vec<(CacheEntry, f64)> = candidates
            .iter()
            .map(|entry| {
                let score = hex_similarity(fingerprint, &entry.image_hash)
                    .max(hex_similarity(fingerprint, &entry.similarity_hash));
                (entry.clone(), score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored
    }
}

/// Fraction of equal bits between two hex strings of equal length.
///
/// Returns 0.0 for empty input, a length mismatch or non-hex characters.
pub fn hex_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut differing = 0u32;
    for (x, y) in a.chars().zip(b.chars()) {
        match (x.to_digit(16), y.to_digit(16)) {
            (Some(x), Some(y)) => differing += (x ^ y).count_ones(),
            _ => return 0.0,
        }
    }

    let total_bits = (a.len() * 4) as f64;
    1.0 - differing as f64 / total_bits
}
