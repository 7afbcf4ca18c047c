//! Embedding provider contract, plus the failover wrapper.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider error: {0}")]
    Provider(String),
    #[error("no embedding providers configured")]
    NoProviders,
}

/// A text-to-vector provider that also advertises its batching limit;
/// `MemoryManager` uses `max_batch_size` to size batched embedding calls.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
    fn dimension(&self) -> usize;
    fn max_batch_size(&self) -> usize {
        16
    }
}

/// Wraps an ordered list of embedders. Tries the active one; on success it
/// stays active, on failure it advances the cursor to the next provider.
/// `dimension`/`max_batch_size` reflect whichever provider is currently active.
pub struct FailoverEmbedder {
    providers: Vec<Box<dyn Embedder>>,
    active: std::sync::atomic::AtomicUsize,
}

impl FailoverEmbedder {
    pub fn new(providers: Vec<Box<dyn Embedder>>) -> Self {
        Self {
            providers,
            active: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    fn active_index(&self) -> usize {
        self.active.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FailoverEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if self.providers.is_empty() {
            return Err(EmbeddingError::NoProviders);
        }
        let start = self.active_index();
        let mut last_err = None;
        for offset in 0..self.providers.len() {
            let idx = (start + offset) % self.providers.len();
            match self.providers[idx].embed(texts).await {
                Ok(vectors) => {
                    self.active.store(idx, std::sync::atomic::Ordering::SeqCst);
                    return Ok(vectors);
                }
                Err(e) => {
                    let next = (idx + 1) % self.providers.len();
                    self.active.store(next, std::sync::atomic::Ordering::SeqCst);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(EmbeddingError::NoProviders))
    }

    fn dimension(&self) -> usize {
        self.providers
            .get(self.active_index())
            .map(|p| p.dimension())
            .unwrap_or(0)
    }

    fn max_batch_size(&self) -> usize {
        self.providers
            .get(self.active_index())
            .map(|p| p.max_batch_size())
            .unwrap_or(1)
    }
}

/// Deterministic hash-based embedder for tests: never calls a real API, but
/// produces stable vectors so similarity comparisons in tests are meaningful.
pub struct MockEmbedder {
    dimension: usize,
    max_batch_size: usize,
    fail_with: Option<String>,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            max_batch_size: 16,
            fail_with: None,
        }
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn failing(dimension: usize, reason: impl Into<String>) -> Self {
        Self {
            dimension,
            max_batch_size: 16,
            fail_with: Some(reason.into()),
        }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(text.as_bytes());
        (0..self.dimension)
            .map(|i| {
                let byte = digest[i % digest.len()];
                (byte as f32 / 255.0) * 2.0 - 1.0
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if let Some(reason) = &self.fail_with {
            return Err(EmbeddingError::Provider(reason.clone()));
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}
