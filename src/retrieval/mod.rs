//! Ranking core: dense scoring, rank fusion, recency, and prompt assembly.
//!
//! Everything here is pure and in-memory; the [`crate::engine`] module feeds it
//! from the store and the embedding provider.

pub mod dense;
pub mod fusion;
pub mod prompt;

pub use dense::{cosine_similarity, dense_search};
pub use fusion::{reciprocal_rank_fusion, recency_boost, RecencyParams};
pub use prompt::{build_prompt, Prompt};
