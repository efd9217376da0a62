use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Port the HTTP server binds on (0.0.0.0).
    pub port: u16,
    /// Origins allowed by the CORS layer in front of this service.
    pub allowed_origins: Vec<String>,
    /// Root directory of the documentation corpus.
    pub docs_dir: PathBuf,
    /// Where the index snapshot is stored.
    pub index_dir: PathBuf,
    /// Base URL that source-reference links are built from.
    pub source_base_url: String,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub cache: CacheConfig,
    /// Rate-limit window for the reverse proxy / middleware in front of us.
    pub rate_limit_window_ms: u64,
    pub rate_limit_max_requests: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completion endpoint base URL.
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "hash" for the built-in deterministic embedder, "openai" for an
    /// OpenAI-compatible embeddings endpoint.
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub dimension: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Chunk budget in words.
    pub chunk_size: usize,
    /// Words carried over between adjacent chunks of the same file.
    pub chunk_overlap: usize,
    pub top_k: usize,
    /// Minimum cosine similarity for a hit to pass the relevance gate.
    pub relevance_threshold: f32,
    pub max_context_tokens: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_size: usize,
    pub ttl_ms: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            allowed_origins: Vec::new(),
            docs_dir: PathBuf::from("./docs"),
            index_dir: PathBuf::from("./data/index"),
            source_base_url: "/docs".to_string(),
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            cache: CacheConfig::default(),
            rate_limit_window_ms: 60_000,
            rate_limit_max_requests: 20,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            api_key: None,
            temperature: 0.3,
            max_tokens: 1024,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hash".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            dimension: 384,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
            top_k: 5,
            relevance_threshold: 0.3,
            max_context_tokens: 4096,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            ttl_ms: 3_600_000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PORT") {
            if let Ok(v) = val.parse() {
                config.port = v;
            }
        }
        if let Ok(origins) = std::env::var("ALLOWED_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        if let Ok(dir) = std::env::var("DOCS_DIR") {
            config.docs_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("INDEX_DIR") {
            config.index_dir = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var("SOURCE_BASE_URL") {
            config.source_base_url = url;
        }

        if let Ok(key) = std::env::var("DEEPSEEK_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("DEEPSEEK_MODEL") {
            config.llm.model = model;
        }
        if let Ok(url) = std::env::var("DEEPSEEK_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(val) = std::env::var("LLM_TEMPERATURE") {
            if let Ok(v) = val.parse() {
                config.llm.temperature = v;
            }
        }
        if let Ok(val) = std::env::var("LLM_MAX_TOKENS") {
            if let Ok(v) = val.parse() {
                config.llm.max_tokens = v;
            }
        }

        if let Ok(provider) = std::env::var("EMBEDDING_PROVIDER") {
            config.embedding.provider = provider;
        }
        if let Ok(url) = std::env::var("EMBEDDING_BASE_URL") {
            config.embedding.base_url = url;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        if let Ok(val) = std::env::var("EMBEDDING_DIM") {
            if let Ok(v) = val.parse() {
                config.embedding.dimension = v;
            }
        }

        if let Ok(val) = std::env::var("MAX_CONTEXT_TOKENS") {
            if let Ok(v) = val.parse() {
                config.retrieval.max_context_tokens = v;
            }
        }
        if let Ok(val) = std::env::var("CHUNK_SIZE") {
            if let Ok(v) = val.parse() {
                config.retrieval.chunk_size = v;
            }
        }
        if let Ok(val) = std::env::var("CHUNK_OVERLAP") {
            if let Ok(v) = val.parse() {
                config.retrieval.chunk_overlap = v;
            }
        }
        if let Ok(val) = std::env::var("TOP_K") {
            if let Ok(v) = val.parse() {
                config.retrieval.top_k = v;
            }
        }
        if let Ok(val) = std::env::var("RELEVANCE_THRESHOLD") {
            if let Ok(v) = val.parse() {
                config.retrieval.relevance_threshold = v;
            }
        }

        if let Ok(val) = std::env::var("RATE_LIMIT_WINDOW_MS") {
            if let Ok(v) = val.parse() {
                config.rate_limit_window_ms = v;
            }
        }
        if let Ok(val) = std::env::var("RATE_LIMIT_MAX_REQUESTS") {
            if let Ok(v) = val.parse() {
                config.rate_limit_max_requests = v;
            }
        }
        if let Ok(val) = std::env::var("CACHE_MAX_SIZE") {
            if let Ok(v) = val.parse() {
                config.cache.max_size = v;
            }
        }
        if let Ok(val) = std::env::var("CACHE_TTL_MS") {
            if let Ok(v) = val.parse() {
                config.cache.ttl_ms = v;
            }
        }

        config
    }

    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.index_dir.join("index.json")
    }
}
