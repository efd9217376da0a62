//! TF-IDF lexical index over the same document corpus as the vector index.

use std::collections::HashMap;

/// Per-document term frequencies plus corpus document frequencies.
/// Built once per ingestion run; read-only while serving.
#[derive(Debug, Default)]
pub struct LexicalIndex {
    doc_terms: Vec<HashMap<String, f32>>,
    doc_freq: HashMap<String, usize>,
    doc_count: usize,
}

impl LexicalIndex {
    pub fn build<'a>(texts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut doc_terms = Vec::new();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for text in texts {
            let tokens = tokenize(text);
            let total = tokens.len().max(1) as f32;

            let mut counts: HashMap<String, f32> = HashMap::new();
            for token in tokens {
                *counts.entry(token).or_insert(0.0) += 1.0;
            }
            for (term, count) in counts.iter_mut() {
                *count /= total;
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            doc_terms.push(counts);
        }

        let doc_count = doc_terms.len();
        Self {
            doc_terms,
            doc_freq,
            doc_count,
        }
    }

    pub fn len(&self) -> usize {
        self.doc_count
    }

    pub fn is_empty(&self) -> bool {
        self.doc_count == 0
    }

    /// Score every document against the query terms; returns the top
    /// `limit` as `(document index, score)`, best first. Documents with a
    /// zero score are omitted.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(usize, f32)> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() || self.doc_count == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .doc_terms
            .iter()
            .enumerate()
            .map(|(i, terms)| {
                let score: f32 = query_terms
                    .iter()
                    .map(|term| terms.get(term).copied().unwrap_or(0.0) * self.idf(term))
                    .sum();
                (i, score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }

    /// Smoothed inverse document frequency.
    fn idf(&self, term: &str) -> f32 {
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f32;
        let n = self.doc_count as f32;
        ((1.0 + n) / (1.0 + df)).ln() + 1.0
    }
}

/// Lowercased alphanumeric tokens; everything else is a separator.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_splits_on_punctuation() {
        assert_eq!(
            tokenize("PMP-25: mounting holes!"),
            vec!["pmp", "25", "mounting", "holes"]
        );
    }

    #[test]
    fn test_empty_query_returns_nothing() {
        let index = LexicalIndex::build(["some document"]);
        assert!(index.search("", 10).is_empty());
        assert!(index.search("!!!", 10).is_empty());
    }

    #[test]
    fn test_exact_term_ranks_highest() {
        let index = LexicalIndex::build([
            "the bracket mounts with four screws",
            "warranty terms and conditions apply",
            "bracket bracket bracket dimensions",
        ]);

        let hits = index.search("bracket", 10);
        assert_eq!(hits[0].0, 2, "highest term frequency should rank first");
        assert!(hits.iter().any(|(i, _)| *i == 0));
        assert!(!hits.iter().any(|(i, _)| *i == 1));
    }

    #[test]
    fn test_rare_terms_outweigh_common() {
        let index = LexicalIndex::build([
            "panel setup panel install panel",
            "panel quickstart",
            "fiberglass panel maintenance",
        ]);

        // "fiberglass" appears in one doc, "panel" in all three.
        let hits = index.search("fiberglass panel", 10);
        assert_eq!(hits[0].0, 2);
    }

    #[test]
    fn test_search_respects_limit() {
        let index = LexicalIndex::build(["a b", "a c", "a d", "a e"]);
        assert_eq!(index.search("a", 2).len(), 2);
    }

    #[test]
    fn test_scores_descending() {
        let index = LexicalIndex::build(["screw screw screw", "screw once", "unrelated text"]);
        let hits = index.search("screw", 10);
        for pair in hits.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }
}
