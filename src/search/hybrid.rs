//! Hybrid retrieval: vector and lexical phases fused with Reciprocal Rank
//! Fusion, then gated by a relevance floor.

use crate::models::SearchResult;
use crate::search::lexical::LexicalIndex;
use crate::search::vector::VectorIndex;

/// RRF rank constant.
const K_RRF: f32 = 60.0;
/// Fused-score floor for documents that fail the cosine threshold.
const FUSED_FLOOR: f32 = 0.005;

/// Both indices over one corpus, built and swapped together.
#[derive(Debug, Default)]
pub struct SearchIndices {
    pub vector: VectorIndex,
    pub lexical: LexicalIndex,
}

impl SearchIndices {
    pub fn len(&self) -> usize {
        debug_assert_eq!(self.vector.len(), self.lexical.len());
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub top_k: usize,
    pub relevance_threshold: f32,
    pub vector_weight: f32,
    pub lexical_weight: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            relevance_threshold: 0.3,
            vector_weight: 0.7,
            lexical_weight: 0.3,
        }
    }
}

/// Fused candidate accumulator, keyed by document index.
#[derive(Debug, Clone, Copy, Default)]
struct Fused {
    score: f32,
    vector_score: f32,
}

/// Run both phases and fuse. The query is embedded exactly once by the
/// caller; this function is pure CPU work.
pub fn hybrid_search(
    indices: &SearchIndices,
    query_embedding: &[f32],
    query_text: &str,
    opts: &SearchOptions,
) -> Vec<SearchResult> {
    if indices.is_empty() || opts.top_k == 0 {
        return Vec::new();
    }

    let fetch = opts.top_k * 2;
    let vector_hits = indices.vector.search(query_embedding, fetch);
    let lexical_hits = indices.lexical.search(query_text, fetch);

    let mut fused: Vec<Option<Fused>> = vec![None; indices.len()];

    for (rank, (doc_idx, score)) in vector_hits.iter().enumerate() {
        let entry = fused[*doc_idx].get_or_insert_with(Fused::default);
        entry.score += opts.vector_weight / (K_RRF + rank as f32 + 1.0);
        entry.vector_score = entry.vector_score.max(*score);
    }

    for (rank, (doc_idx, _)) in lexical_hits.iter().enumerate() {
        let entry = fused[*doc_idx].get_or_insert_with(Fused::default);
        entry.score += opts.lexical_weight / (K_RRF + rank as f32 + 1.0);
    }

    let mut candidates: Vec<(usize, Fused)> = fused
        .into_iter()
        .enumerate()
        .filter_map(|(idx, entry)| entry.map(|e| (idx, e)))
        .filter(|(_, e)| e.vector_score >= opts.relevance_threshold || e.score > FUSED_FLOOR)
        .collect();

    // Fused score descending, ties by vector score, then stable corpus order.
    candidates.sort_by(|a, b| {
        b.1.score
            .partial_cmp(&a.1.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                b.1.vector_score
                    .partial_cmp(&a.1.vector_score)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(a.0.cmp(&b.0))
    });
    candidates.truncate(opts.top_k);

    candidates
        .into_iter()
        .filter_map(|(idx, e)| {
            indices.vector.document(idx).map(|doc| SearchResult {
                document: doc.clone(),
                score: e.score,
                vector_score: e.vector_score,
            })
        })
        .collect()
}
