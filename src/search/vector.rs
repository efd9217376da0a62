//! In-memory vector index: brute-force cosine top-K over the document
//! corpus, persisted as a single JSON snapshot.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::Document;

/// Documents and their embeddings, parallel by position. Built once per
/// ingestion run; read-only while serving.
#[derive(Debug, Default)]
pub struct VectorIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    documents: Vec<Document>,
}

/// On-disk snapshot shape.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    dimension: usize,
    created_at: DateTime<Utc>,
    vectors: Vec<Vec<f32>>,
    documents: Vec<Document>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            documents: Vec::new(),
        }
    }

    pub fn push(&mut self, document: Document, embedding: Vec<f32>) -> Result<()> {
        anyhow::ensure!(
            embedding.len() == self.dimension,
            "embedding dimension {} does not match index dimension {}",
            embedding.len(),
            self.dimension
        );
        self.vectors.push(embedding);
        self.documents.push(document);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn document(&self, idx: usize) -> Option<&Document> {
        self.documents.get(idx)
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Cosine similarity against every stored vector; returns the top
    /// `limit` as `(document index, score)`, best first.
    pub fn search(&self, query: &[f32], limit: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query, v)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }

    /// Write the snapshot atomically (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let snapshot = Snapshot {
            dimension: self.dimension,
            created_at: Utc::now(),
            vectors: self.vectors.clone(),
            documents: self.documents.clone(),
        };
        let data = serde_json::to_string(&snapshot).context("Failed to serialize index snapshot")?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, data).context("Failed to write index snapshot")?;
        std::fs::rename(&tmp_path, path).context("Failed to move index snapshot into place")?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).context("Failed to read index snapshot")?;
        let snapshot: Snapshot =
            serde_json::from_str(&data).context("Failed to parse index snapshot")?;
        anyhow::ensure!(
            snapshot.vectors.len() == snapshot.documents.len(),
            "snapshot is inconsistent: {} vectors for {} documents",
            snapshot.vectors.len(),
            snapshot.documents.len()
        );
        tracing::debug!(created_at = %snapshot.created_at, "snapshot loaded");
        Ok(Self {
            dimension: snapshot.dimension,
            vectors: snapshot.vectors,
            documents: snapshot.documents,
        })
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocType, DocumentMetadata};

    fn doc(id: &str) -> Document {
        Document {
            id: id.to_string(),
            text: format!("text of {id}"),
            metadata: DocumentMetadata {
                source: format!("{id}.md"),
                category: "general".to_string(),
                doc_type: DocType::Text,
                chunk_index: 0,
                total_chunks: 1,
            },
        }
    }

    #[test]
    fn test_cosine_identity() {
        let v = vec![0.6, 0.8, 0.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let mut index = VectorIndex::new(3);
        index.push(doc("a"), vec![1.0, 0.0, 0.0]).unwrap();
        index.push(doc("b"), vec![0.0, 1.0, 0.0]).unwrap();
        index.push(doc("c"), vec![0.7, 0.7, 0.0]).unwrap();

        let hits = index.search(&[1.0, 0.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 0);
        assert_eq!(hits[1].0, 2);
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn test_push_rejects_wrong_dimension() {
        let mut index = VectorIndex::new(3);
        assert!(index.push(doc("a"), vec![1.0, 0.0]).is_err());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");

        let mut index = VectorIndex::new(2);
        index.push(doc("a"), vec![1.0, 0.0]).unwrap();
        index.push(doc("b"), vec![0.0, 1.0]).unwrap();
        index.save(&path).unwrap();

        let loaded = VectorIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.dimension(), 2);
        assert_eq!(loaded.document(0).unwrap().id, "a");

        let hits = loaded.search(&[0.0, 1.0], 1);
        assert_eq!(hits[0].0, 1);
    }
}
