use serde::{Deserialize, Serialize};

/// A chunk of product documentation. Immutable after ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique across the corpus: `<relative path>#<chunk index>`.
    pub id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// File name of the originating document.
    pub source: String,
    /// Logical folder the file lives in, relative to the doc root.
    pub category: String,
    #[serde(rename = "type")]
    pub doc_type: DocType,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Text,
    Table,
    Product,
}

/// A scored retrieval hit. Transient, produced per query.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub document: Document,
    /// Fused RRF score.
    pub score: f32,
    /// Raw cosine similarity from the vector phase.
    pub vector_score: f32,
}

/// One message in an LLM conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat request body for both the JSON and streaming endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// A document reference attached to an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub filename: String,
    pub category: String,
    /// First 120 characters of the referenced chunk.
    pub section: String,
    pub url: String,
    pub score: f32,
}

/// Response body for the non-streaming chat endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub sources: Vec<SourceRef>,
    pub metadata: ChatMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMetadata {
    pub classification: String,
    pub cached: bool,
    #[serde(rename = "tokensUsed")]
    pub tokens_used: u32,
}

/// Response body when the security pipeline refuses a request.
#[derive(Debug, Clone, Serialize)]
pub struct BlockedResponse {
    pub response: String,
    pub blocked: bool,
    pub classification: String,
}
