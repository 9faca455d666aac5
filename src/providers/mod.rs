//! AI provider collaborator.
//!
//! The pipeline talks to one [`AiProvider`]: embeddings for chunks and
//! queries, chat completions for answers. [`MockProvider`] is a deterministic
//! in-process implementation for tests and offline development;
//! [`openai::OpenAiProvider`] speaks to any OpenAI-compatible HTTP API.

pub mod openai;

use async_trait::async_trait;

use crate::types::{Message, RagError};

pub use openai::OpenAiProvider;

/// Embedding and chat-completion interface.
///
/// Vectors have a fixed configured dimensionality. Batch sizing is the
/// caller's responsibility; providers may reject oversized batches.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Embeds a single text into a fixed-dimensionality vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;

    /// Embeds a batch of texts, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// Produces a completion for an ordered, role-tagged message sequence.
    async fn complete(&self, messages: &[Message]) -> Result<String, RagError>;
}

/// Deterministic provider for tests.
///
/// Embeddings are hash-seeded unit vectors: identical text always produces an
/// identical vector, different text almost always differs. Completions echo a
/// canned reply. Failure modes can be switched on to exercise the retrieval
/// cascade's demotion paths.
#[derive(Clone, Debug)]
pub struct MockProvider {
    dimensions: usize,
    reply: String,
    fail_embeddings: bool,
    fail_completions: bool,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dimensions: 16,
            reply: "mock completion".to_string(),
            fail_embeddings: false,
            fail_completions: false,
        }
    }

    #[must_use]
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    #[must_use]
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = reply.into();
        self
    }

    /// Every embedding call fails, forcing the keyword fallback tier.
    #[must_use]
    pub fn failing_embeddings(mut self) -> Self {
        self.fail_embeddings = true;
        self
    }

    /// Every completion call fails, exercising the apology degradation.
    #[must_use]
    pub fn failing_completions(mut self) -> Self {
        self.fail_completions = true;
        self
    }

    fn embed_deterministic(&self, text: &str) -> Vec<f32> {
        // FNV-1a over the bytes seeds a small LCG; normalized so cosine
        // similarity of identical texts is exactly 1.0.
        let mut seed: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in text.bytes() {
            seed ^= u64::from(byte);
            seed = seed.wrapping_mul(0x0000_0100_0000_01b3);
        }

        let mut state = seed.max(1);
        let mut vector: Vec<f32> = (0..self.dimensions)
            .map(|_| {
                state = state
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                ((state >> 33) as f32 / (u32::MAX as f32)) - 0.5
            })
            .collect();

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl AiProvider for MockProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        if self.fail_embeddings {
            return Err(RagError::Embedding("mock embedding failure".into()));
        }
        Ok(self.embed_deterministic(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if self.fail_embeddings {
            return Err(RagError::Embedding("mock embedding failure".into()));
        }
        Ok(texts.iter().map(|t| self.embed_deterministic(t)).collect())
    }

    async fn complete(&self, _messages: &[Message]) -> Result<String, RagError> {
        if self.fail_completions {
            return Err(RagError::Completion("mock completion failure".into()));
        }
        Ok(self.reply.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_embeddings_are_deterministic() {
        let provider = MockProvider::new();
        let a1 = provider.embed("hello world").await.unwrap();
        let a2 = provider.embed("hello world").await.unwrap();
        let b = provider.embed("goodbye world").await.unwrap();

        assert_eq!(a1, a2, "identical text must embed identically");
        assert_ne!(a1, b, "different text should embed differently");
        assert_eq!(a1.len(), 16);
    }

    #[tokio::test]
    async fn mock_embeddings_are_unit_vectors() {
        let provider = MockProvider::new();
        let vector = provider.embed("normalize me").await.unwrap();
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn batch_preserves_order_and_matches_single() {
        let provider = MockProvider::new();
        let texts = vec!["first".to_string(), "second".to_string()];
        let batch = provider.embed_batch(&texts).await.unwrap();
        assert_eq!(batch[0], provider.embed("first").await.unwrap());
        assert_eq!(batch[1], provider.embed("second").await.unwrap());
    }

    #[tokio::test]
    async fn failure_modes_surface_the_right_error() {
        let provider = MockProvider::new().failing_embeddings();
        assert!(matches!(
            provider.embed("x").await,
            Err(RagError::Embedding(_))
        ));

        let provider = MockProvider::new().failing_completions();
        assert!(matches!(
            provider.complete(&[]).await,
            Err(RagError::Completion(_))
        ));
    }
}
