//! Formats retrieval results into the LLM context block and the
//! source-reference cards sent to the client.

use std::collections::HashSet;
use std::fmt::Write;

use crate::models::{SearchResult, SourceRef};

/// Maximum unique sources referenced per answer.
const MAX_SOURCE_REFS: usize = 4;
/// Characters of the chunk shown as the section preview.
const SECTION_PREVIEW_CHARS: usize = 120;

/// Render numbered context blocks for the LLM prompt.
pub fn build_context(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "(No relevant documentation was found for this question.)\n".to_string();
    }

    let mut ctx = String::from("Documentation excerpts:\n\n");
    for (i, result) in results.iter().enumerate() {
        let meta = &result.document.metadata;
        write!(
            ctx,
            "[Source {}: {}/{} ({})]\n{}\n\n",
            i + 1,
            meta.category,
            meta.source,
            doc_type_label(result),
            result.document.text.trim()
        )
        .unwrap();
    }
    ctx
}

/// Deduplicated source references, one per originating file, best score
/// first, capped at four.
pub fn build_source_refs(results: &[SearchResult], base_url: &str) -> Vec<SourceRef> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut refs = Vec::new();

    for result in results {
        let meta = &result.document.metadata;
        if !seen.insert(meta.source.as_str()) {
            continue;
        }

        let section: String = result
            .document
            .text
            .chars()
            .take(SECTION_PREVIEW_CHARS)
            .collect();

        refs.push(SourceRef {
            filename: meta.source.clone(),
            category: meta.category.clone(),
            section,
            url: format!(
                "{}/{}/{}",
                base_url.trim_end_matches('/'),
                meta.category,
                meta.source
            ),
            score: result.score,
        });

        if refs.len() >= MAX_SOURCE_REFS {
            break;
        }
    }

    refs
}

fn doc_type_label(result: &SearchResult) -> &'static str {
    use crate::models::DocType;
    match result.document.metadata.doc_type {
        DocType::Text => "text",
        DocType::Table => "table",
        DocType::Product => "product",
    }
}
