//! Reciprocal Rank Fusion over the two ranked doc-id lists.

use std::collections::HashMap;

/// Standard RRF constant from Cormack, Clarke and Buettcher (SIGIR 2009).
pub const DEFAULT_RRF_K: f32 = 60.0;

/// Fuse two ranked doc-id lists. Each list contributes
/// `weight / (rrf_k + rank)` per id, with ranks 1-indexed. The result is
/// ordered by fused score descending; ties break on ascending doc id so
/// runs are reproducible.
pub fn reciprocal_rank_fusion(
    text_ranked: &[u64],
    vector_ranked: &[u64],
    rrf_k: f32,
    text_weight: f32,
    vector_weight: f32,
) -> Vec<(u64, f32)> {
    let mut scores: HashMap<u64, f32> = HashMap::new();
    for (rank, id) in text_ranked.iter().enumerate() {
        *scores.entry(*id).or_insert(0.0) += text_weight / (rrf_k + (rank + 1) as f32);
    }
    for (rank, id) in vector_ranked.iter().enumerate() {
        *scores.entry(*id).or_insert(0.0) += vector_weight / (rrf_k + (rank + 1) as f32);
    }

    let mut fused: Vec<(u64, f32)> = scores.into_iter().collect();
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    fused
}
