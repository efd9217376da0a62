//! Embedding provider: an OpenAI-compatible HTTP backend for production
//! and a deterministic feature-hashing backend for offline use and tests.
//! Both return L2-normalized vectors of the configured dimension.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;

/// Maximum characters sent per text to the embedding API. Dense prose
/// tokenizes around 3 chars/token, which keeps this safely inside common
/// 8k-token embedding contexts.
const MAX_EMBED_CHARS: usize = 8_000;

pub struct EmbeddingProvider {
    config: EmbeddingConfig,
    client: reqwest::Client,
}

impl EmbeddingProvider {
    pub fn new(config: EmbeddingConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// A provider backed by the deterministic local embedder, for tests.
    pub fn local(dimension: usize) -> Self {
        Self {
            config: EmbeddingConfig {
                provider: "hash".to_string(),
                dimension,
                ..EmbeddingConfig::default()
            },
            client: reqwest::Client::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// Embed a batch of texts. Output is parallel with the input.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let truncated: Vec<String> = texts
            .iter()
            .map(|t| truncate_chars(t, MAX_EMBED_CHARS))
            .collect();

        match self.config.provider.as_str() {
            "hash" => Ok(truncated
                .iter()
                .map(|t| hash_embedding(t, self.config.dimension))
                .collect()),
            "openai" => self.embed_openai(&truncated).await,
            other => anyhow::bail!("Unknown embedding provider: {other}"),
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results.into_iter().next().context("No embedding returned")
    }

    async fn embed_openai(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.config.base_url);

        let batch_size = 64;
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(batch_size) {
            let req = EmbedRequest {
                model: self.config.model.clone(),
                input: chunk.to_vec(),
            };

            let resp = self
                .client
                .post(&url)
                .json(&req)
                .send()
                .await
                .context("Failed to call embeddings API")?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("Embeddings API returned {status}: {body}");
            }

            let body: EmbedResponse = resp
                .json()
                .await
                .context("Failed to parse embeddings response")?;

            all_embeddings.extend(body.data.into_iter().map(|d| l2_normalize(d.embedding)));
        }

        Ok(all_embeddings)
    }
}

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

/// Deterministic feature-hashed bag-of-words embedding. Each token lands
/// in a bucket with a hash-derived sign; the result is L2-normalized so it
/// satisfies the same unit-vector contract as the HTTP backend.
pub fn hash_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dimension.max(1)];

    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let h = fnv1a(token.as_bytes());
        let bucket = (h % dimension as u64) as usize;
        let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;

        // A second rotated bucket smooths collisions for short texts.
        let h2 = fnv1a(&h.to_le_bytes());
        let bucket2 = (h2 % dimension as u64) as usize;
        let sign2 = if (h2 >> 32) & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket2] += 0.5 * sign2;
    }

    l2_normalize(vector)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

pub fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
