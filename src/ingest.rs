//! Ingestion pipeline: walks the documentation root, chunks each file,
//! embeds the chunks, and builds both indices plus the on-disk snapshot.

use anyhow::{Context, Result};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::Config;
use crate::llm::embeddings::EmbeddingProvider;
use crate::models::{DocType, Document, DocumentMetadata};
use crate::search::hybrid::SearchIndices;
use crate::search::lexical::LexicalIndex;
use crate::search::vector::VectorIndex;

const INDEXABLE_EXTENSIONS: &[&str] = &["md", "markdown", "txt", "csv"];
const EMBED_BATCH: usize = 32;

/// Walk the corpus, build fresh indices, and write the snapshot.
/// Unreadable files are logged and skipped; they never abort the run.
pub async fn run(config: &Config, embedder: &EmbeddingProvider) -> Result<SearchIndices> {
    let documents = collect_documents(
        &config.docs_dir,
        config.retrieval.chunk_size,
        config.retrieval.chunk_overlap,
    );
    tracing::info!(documents = documents.len(), "corpus chunked");

    let mut vector = VectorIndex::new(embedder.dimension());
    for batch in documents.chunks(EMBED_BATCH) {
        let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
        let embeddings = embedder
            .embed_batch(&texts)
            .await
            .context("Failed to embed document batch")?;
        for (doc, embedding) in batch.iter().zip(embeddings) {
            vector.push(doc.clone(), embedding)?;
        }
    }

    let lexical = LexicalIndex::build(vector.documents().iter().map(|d| d.text.as_str()));
    let indices = SearchIndices { vector, lexical };

    indices.vector.save(&config.snapshot_path())?;
    tracing::info!(
        path = %config.snapshot_path().display(),
        documents = indices.len(),
        "index snapshot written"
    );

    Ok(indices)
}

/// Load the snapshot written by a previous run and rebuild the lexical
/// index from the stored documents.
pub fn load_snapshot(config: &Config) -> Result<SearchIndices> {
    let vector = VectorIndex::load(&config.snapshot_path())?;
    let lexical = LexicalIndex::build(vector.documents().iter().map(|d| d.text.as_str()));
    Ok(SearchIndices { vector, lexical })
}

fn collect_documents(root: &Path, chunk_size: usize, chunk_overlap: usize) -> Vec<Document> {
    let mut documents = Vec::new();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();
        if !INDEXABLE_EXTENSIONS.contains(&ext.as_str()) {
            continue;
        }

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
                continue;
            }
        };
        if text.trim().is_empty() {
            tracing::debug!(path = %path.display(), "skipping empty file");
            continue;
        }

        let source = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        let category = path
            .parent()
            .and_then(|p| p.strip_prefix(root).ok())
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "general".to_string());
        let rel_path = path
            .strip_prefix(root)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|_| source.clone());

        let chunks = chunk_text(&text, chunk_size, chunk_overlap);
        let total_chunks = chunks.len();
        for (i, chunk) in chunks.into_iter().enumerate() {
            let doc_type = classify_doc_type(&category, &chunk);
            documents.push(Document {
                id: format!("{rel_path}#{i}"),
                text: chunk,
                metadata: DocumentMetadata {
                    source: source.clone(),
                    category: category.clone(),
                    doc_type,
                    chunk_index: i,
                    total_chunks,
                },
            });
        }
    }

    documents
}

/// Split text into word-budgeted chunks with overlap carried between
/// adjacent windows. Paragraph boundaries are preserved inside a chunk;
/// the window slides over the flat word sequence.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    if words.len() <= chunk_size {
        return vec![words.join(" ")];
    }

    let overlap = chunk_overlap.min(chunk_size.saturating_sub(1));
    let step = chunk_size - overlap;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }
    chunks
}

fn classify_doc_type(category: &str, chunk: &str) -> DocType {
    if category == "products" || category.starts_with("products/") {
        DocType::Product
    } else if chunk.lines().any(is_table_separator) {
        DocType::Table
    } else {
        DocType::Text
    }
}

/// A Markdown table separator row: `|---|---|` and friends.
fn is_table_separator(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|')
        && trimmed.len() > 2
        && trimmed
            .chars()
            .all(|c| matches!(c, '|' | '-' | ':' | ' '))
        && trimmed.contains('-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_short_text_single_chunk() {
        let chunks = chunk_text("just a few words", 512, 50);
        assert_eq!(chunks, vec!["just a few words"]);
    }

    #[test]
    fn test_chunk_empty_text() {
        assert!(chunk_text("", 512, 50).is_empty());
        assert!(chunk_text("   \n\n ", 512, 50).is_empty());
    }

    #[test]
    fn test_chunk_respects_size_and_overlap() {
        let words: Vec<String> = (0..25).map(|i| format!("w{i}")).collect();
        let text = words.join(" ");
        let chunks = chunk_text(&text, 10, 3);

        for chunk in &chunks {
            assert!(chunk.split_whitespace().count() <= 10);
        }
        // Second chunk starts 7 words in (10 - 3 overlap).
        assert!(chunks[1].starts_with("w7 "));
        // Every word appears somewhere.
        let joined = chunks.join(" ");
        for word in &words {
            assert!(joined.contains(word.as_str()));
        }
    }

    #[test]
    fn test_chunk_overlap_clamped_below_size() {
        // Degenerate config must still terminate.
        let words: Vec<String> = (0..30).map(|i| format!("w{i}")).collect();
        let chunks = chunk_text(&words.join(" "), 10, 10);
        assert!(chunks.len() >= 3);
    }

    #[test]
    fn test_table_separator_detection() {
        assert!(is_table_separator("|---|---|"));
        assert!(is_table_separator("| :--- | ---: |"));
        assert!(!is_table_separator("| data | row |"));
        assert!(!is_table_separator("plain text"));
    }

    #[test]
    fn test_doc_type_classification() {
        assert_eq!(classify_doc_type("products", "anything"), DocType::Product);
        assert_eq!(
            classify_doc_type("specs", "| a | b |\n|---|---|\n| 1 | 2 |"),
            DocType::Table
        );
        assert_eq!(classify_doc_type("guides", "plain prose"), DocType::Text);
    }

    #[test]
    fn test_collect_documents_walks_and_categorizes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("mounts")).unwrap();
        std::fs::write(
            dir.path().join("mounts/pmp-25.md"),
            "The PMP-25 mounting holes are 6 mm in diameter.",
        )
        .unwrap();
        std::fs::write(dir.path().join("readme.md"), "General information.").unwrap();
        std::fs::write(dir.path().join("ignored.bin"), "binary").unwrap();

        let docs = collect_documents(dir.path(), 512, 50);
        assert_eq!(docs.len(), 2);

        let pmp = docs
            .iter()
            .find(|d| d.metadata.source == "pmp-25.md")
            .unwrap();
        assert_eq!(pmp.metadata.category, "mounts");
        assert_eq!(pmp.id, "mounts/pmp-25.md#0");
        assert_eq!(pmp.metadata.total_chunks, 1);

        let readme = docs
            .iter()
            .find(|d| d.metadata.source == "readme.md")
            .unwrap();
        assert_eq!(readme.metadata.category, "general");
    }

    #[tokio::test]
    async fn test_run_builds_parallel_indices_and_snapshot() {
        let docs_dir = tempfile::tempdir().unwrap();
        let index_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            docs_dir.path().join("guide.md"),
            "Install the bracket with four M6 screws.",
        )
        .unwrap();

        let config = Config {
            docs_dir: docs_dir.path().to_path_buf(),
            index_dir: index_dir.path().to_path_buf(),
            ..Config::default()
        };
        let embedder = EmbeddingProvider::local(64);

        let indices = run(&config, &embedder).await.unwrap();
        assert_eq!(indices.len(), 1);
        assert_eq!(indices.vector.len(), indices.lexical.len());
        assert!(config.snapshot_path().exists());

        let reloaded = load_snapshot(&config).unwrap();
        assert_eq!(reloaded.len(), 1);
    }
}
