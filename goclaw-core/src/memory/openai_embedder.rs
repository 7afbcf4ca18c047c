//! OpenAI Embeddings implementation of [`Embedder`].
//!
//! Supports `text-embedding-3-small`, `text-embedding-3-large`, and
//! `text-embedding-ada-002`. Requires `OPENAI_API_KEY` (or a custom config).

use async_openai::{
    config::OpenAIConfig,
    types::embeddings::{CreateEmbeddingRequest, EmbeddingInput},
    Client,
};
use async_trait::async_trait;

use crate::memory::embedder::{Embedder, EmbeddingError};

/// Batch size the OpenAI embeddings endpoint is comfortable with in one request;
/// `MemoryManager` chunks larger batches to this size.
const DEFAULT_MAX_BATCH_SIZE: usize = 64;

pub struct OpenAIEmbedder {
    config: OpenAIConfig,
    model: String,
    dimensions: usize,
}

impl OpenAIEmbedder {
    /// Creates a new OpenAI embedder. The API key is read from `OPENAI_API_KEY`.
    pub fn new(model: impl Into<String>) -> Self {
        let model = model.into();
        let dimensions = Self::model_dimensions(&model);
        Self {
            config: OpenAIConfig::new(),
            model,
            dimensions,
        }
    }

    /// Creates an embedder against a custom config (different key or base URL,
    /// e.g. an OpenAI-compatible provider).
    pub fn with_config(config: OpenAIConfig, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimensions = Self::model_dimensions(&model);
        Self {
            config,
            model,
            dimensions,
        }
    }

    fn model_dimensions(model: &str) -> usize {
        match model {
            "text-embedding-3-large" => 3072,
            "text-embedding-3-small" | "text-embedding-ada-002" => 1536,
            _ => 1536,
        }
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let inputs: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();
        let input = match inputs.len() {
            1 => EmbeddingInput::String(inputs.into_iter().next().unwrap()),
            _ => EmbeddingInput::StringArray(inputs),
        };

        let request = CreateEmbeddingRequest {
            input,
            model: self.model.clone(),
            ..Default::default()
        };

        let client = Client::with_config(self.config.clone());
        let response = client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| EmbeddingError::Provider(format!("openai: {e}")))?;

        Ok(response.data.into_iter().map(|e| e.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimensions
    }

    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH_SIZE
    }
}
