//! Brute-force cosine scan over one user's embeddings.

use crate::error::{Error, Result};
use crate::store::types::{RankedDoc, StoredEmbedding};

/// Added to the norm product so a zero vector scores 0 instead of NaN.
const EPSILON: f64 = 1e-8;

/// `dot(a, b) / (‖a‖·‖b‖ + ε)`, accumulated in f64.
///
/// Both slices must have the same length; [`dense_search`] checks this.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt() + EPSILON)
}

/// Score every corpus item against `query`, best first, keeping `top_k`.
///
/// The sort is stable, so equal scores keep corpus order. O(corpus × dim).
/// A stored vector whose dimension differs from the query's (vectors from an
/// older embedding model) fails the whole scan.
pub fn dense_search(
    query: &[f32],
    corpus: &[StoredEmbedding],
    top_k: usize,
) -> Result<Vec<RankedDoc>> {
    let mut scored = Vec::with_capacity(corpus.len());
    for item in corpus {
        if item.vector.len() != query.len() {
            return Err(Error::DimensionMismatch {
                chunk_id: item.chunk_id,
                expected: query.len(),
                actual: item.vector.len(),
            });
        }
        scored.push(RankedDoc {
            id: item.chunk_id,
            text: item.text.clone(),
            date: item.date.clone(),
            score: cosine_similarity(query, &item.vector),
        });
    }

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(top_k);
    Ok(scored)
}
