use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::QueryCache;
use crate::config::Config;
use crate::ingest;
use crate::llm::chat::LlmClient;
use crate::llm::embeddings::EmbeddingProvider;
use crate::search::hybrid::SearchIndices;
use crate::security::SecurityMiddleware;

/// Shared application state. Indices are behind a copy-on-write handle:
/// readers clone the inner `Arc` and keep using it even while a rebuild
/// swaps a fresh set in.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    indices: Arc<RwLock<Arc<SearchIndices>>>,
    pub cache: Arc<QueryCache>,
    pub security: Arc<SecurityMiddleware>,
    pub embedder: Arc<EmbeddingProvider>,
    pub llm: Arc<LlmClient>,
    init: Arc<tokio::sync::OnceCell<()>>,
    started_at: Instant,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.index_dir)?;

        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        Ok(Self {
            cache: Arc::new(QueryCache::new(config.cache.max_size, config.cache.ttl())),
            security: Arc::new(SecurityMiddleware::new()),
            embedder: Arc::new(EmbeddingProvider::new(
                config.embedding.clone(),
                http_client.clone(),
            )),
            llm: Arc::new(LlmClient::new(config.llm.clone(), http_client)),
            indices: Arc::new(RwLock::new(Arc::new(SearchIndices::default()))),
            init: Arc::new(tokio::sync::OnceCell::new()),
            started_at: Instant::now(),
            config,
        })
    }

    /// Initialize the indices exactly once. Concurrent callers all await
    /// the same in-flight initialization; later callers return immediately.
    /// Prefers the snapshot from a previous run, otherwise ingests.
    pub async fn ensure_ready(&self) -> anyhow::Result<()> {
        self.init
            .get_or_try_init(|| async {
                let indices = match ingest::load_snapshot(&self.config) {
                    Ok(indices) => {
                        tracing::info!(documents = indices.len(), "loaded index snapshot");
                        indices
                    }
                    Err(_) => ingest::run(&self.config, &self.embedder).await?,
                };
                self.swap_indices(indices);
                Ok::<(), anyhow::Error>(())
            })
            .await?;
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.init.initialized()
    }

    /// Snapshot of the current indices; holders keep the corpus they
    /// started with across a concurrent rebuild.
    pub fn current_indices(&self) -> Arc<SearchIndices> {
        self.indices.read().clone()
    }

    pub fn swap_indices(&self, new_indices: SearchIndices) {
        *self.indices.write() = Arc::new(new_indices);
    }

    pub fn document_count(&self) -> usize {
        self.current_indices().len()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_config(docs: &std::path::Path, index: &std::path::Path) -> Config {
        Config {
            docs_dir: PathBuf::from(docs),
            index_dir: PathBuf::from(index),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_ensure_ready_is_idempotent() {
        let docs = tempfile::tempdir().unwrap();
        let index = tempfile::tempdir().unwrap();
        std::fs::write(docs.path().join("a.md"), "alpha beta gamma").unwrap();

        let state = AppState::new(test_config(docs.path(), index.path())).unwrap();
        assert!(!state.is_ready());

        state.ensure_ready().await.unwrap();
        assert!(state.is_ready());
        let first = state.document_count();

        // Second call must not re-ingest or change anything.
        state.ensure_ready().await.unwrap();
        assert_eq!(state.document_count(), first);
    }

    #[tokio::test]
    async fn test_concurrent_waiters_share_one_init() {
        let docs = tempfile::tempdir().unwrap();
        let index = tempfile::tempdir().unwrap();
        std::fs::write(docs.path().join("a.md"), "alpha beta gamma").unwrap();

        let state = AppState::new(test_config(docs.path(), index.path())).unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                tokio::spawn(async move { state.ensure_ready().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(state.document_count(), 1);
    }

    #[tokio::test]
    async fn test_swap_preserves_readers() {
        let docs = tempfile::tempdir().unwrap();
        let index = tempfile::tempdir().unwrap();
        std::fs::write(docs.path().join("a.md"), "alpha beta gamma").unwrap();

        let state = AppState::new(test_config(docs.path(), index.path())).unwrap();
        state.ensure_ready().await.unwrap();

        let held = state.current_indices();
        std::fs::write(docs.path().join("b.md"), "delta epsilon").unwrap();
        let rebuilt = ingest::run(&state.config, &state.embedder).await.unwrap();
        state.swap_indices(rebuilt);

        // The held handle still sees the old corpus.
        assert_eq!(held.len(), 1);
        assert_eq!(state.document_count(), 2);
    }
}
