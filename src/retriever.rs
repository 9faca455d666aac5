//! Retrieval and ranking cascade.
//!
//! [`Retriever::find_relevant`] turns a free-text question into a ranked,
//! deduplicated set of [`SourceCitation`]s through a two-tier cascade:
//!
//! ```text
//! query ──► Tier 1: embed + vector search (similarity ≥ threshold)
//!              │ zero results / embed error / store error
//!              ▼
//!           Tier 2: keyword substring match (flat 0.45)
//!              │ no usable tokens / zero matches
//!              ▼
//!           recency fallback (flat 0.1) ──► Retrieval::NoMatch when empty
//! ```
//!
//! Tier errors are demoted, logged, and never surfaced to the caller: the
//! worst possible outcome of a query is the explicit [`Retrieval::NoMatch`]
//! signal, which callers must treat differently from an empty success (it
//! means "answer from no sources", not "show nothing").

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::providers::AiProvider;
use crate::stores::Store;
use crate::types::{ChunkRecord, RetrievedChunk, SourceCitation};

/// Minimum cosine similarity for a vector match to count.
pub const SIMILARITY_THRESHOLD: f32 = 0.5;
/// Flat score for keyword-tier matches; deliberately below any accepted
/// vector match to reflect lower confidence.
pub const KEYWORD_SCORE: f32 = 0.45;
/// Flat score for the recency fallback, signaling "unranked".
pub const RECENCY_SCORE: f32 = 0.1;
/// Keyword queries are bounded to the first few tokens to cap query cost.
pub const MAX_KEYWORDS: usize = 2;
/// Maximum excerpt length in characters before truncation.
pub const EXCERPT_CHARS: usize = 200;
/// Minimum token length (exclusive) for keyword extraction.
const MIN_TOKEN_CHARS: usize = 2;

/// Source label used when a chunk carries no filename metadata.
const UNKNOWN_SOURCE: &str = "unknown";

/// Outcome of one retrieval cascade run.
///
/// `NoMatch` is a first-class signal, distinct from a successful-but-empty
/// list: it tells the caller to emit a templated "not found" answer instead
/// of invoking the language model.
#[derive(Clone, Debug, PartialEq)]
pub enum Retrieval {
    /// Citations ordered by non-increasing relevance, one per source document.
    Found(Vec<SourceCitation>),
    /// Both tiers produced nothing (or everything failed).
    NoMatch,
}

impl Retrieval {
    #[must_use]
    pub fn citations(&self) -> &[SourceCitation] {
        match self {
            Retrieval::Found(citations) => citations,
            Retrieval::NoMatch => &[],
        }
    }

    #[must_use]
    pub fn is_no_match(&self) -> bool {
        matches!(self, Retrieval::NoMatch)
    }
}

/// Query-time search over persisted chunks.
///
/// Holds no per-request state; one instance serves concurrent requests.
pub struct Retriever {
    provider: Arc<dyn AiProvider>,
    store: Arc<dyn Store>,
    threshold: f32,
}

impl Retriever {
    pub fn new(provider: Arc<dyn AiProvider>, store: Arc<dyn Store>) -> Self {
        Self {
            provider,
            store,
            threshold: SIMILARITY_THRESHOLD,
        }
    }

    /// Overrides the vector-match similarity threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Finds the most relevant sources for `query` within an organization.
    ///
    /// Infallible by design: collaborator failures demote through the cascade
    /// and total exhaustion resolves to [`Retrieval::NoMatch`].
    pub async fn find_relevant(&self, query: &str, org_id: &str, limit: usize) -> Retrieval {
        match self.vector_tier(query, org_id, limit).await {
            Ok(hits) if !hits.is_empty() => {
                debug!(org_id, hits = hits.len(), "vector tier satisfied query");
                return assemble_citations(hits);
            }
            Ok(_) => {
                debug!(org_id, "vector tier empty, falling back to keyword search");
            }
            Err(err) => {
                warn!(org_id, error = %err, "vector tier failed, falling back to keyword search");
            }
        }

        match self.keyword_tier(query, org_id, limit).await {
            Ok(hits) => assemble_citations(hits),
            Err(err) => {
                warn!(org_id, error = %err, "keyword tier failed, no sources available");
                Retrieval::NoMatch
            }
        }
    }

    /// Tier 1: embed the query and ask the store for nearest chunks.
    async fn vector_tier(
        &self,
        query: &str,
        org_id: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, crate::types::RagError> {
        let embedding = self.provider.embed(query).await?;
        let hits = self
            .store
            .search_similar(org_id, &embedding, limit, self.threshold)
            .await?;
        Ok(hits
            .into_iter()
            .map(|(chunk, similarity)| retrieved(chunk, similarity))
            .collect())
    }

    /// Tier 2: substring matches on extracted keywords, with a recency
    /// fallback when there are no usable tokens or no matches at all.
    async fn keyword_tier(
        &self,
        query: &str,
        org_id: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, crate::types::RagError> {
        let keywords: Vec<&str> = query
            .split_whitespace()
            .filter(|token| token.chars().count() > MIN_TOKEN_CHARS)
            .collect();

        if keywords.is_empty() {
            debug!(org_id, "no usable keywords, returning recent chunks");
            return self.recency_fallback(org_id, limit).await;
        }

        let mut seen: HashSet<uuid::Uuid> = HashSet::new();
        let mut matches: Vec<ChunkRecord> = Vec::new();
        for keyword in keywords.iter().take(MAX_KEYWORDS) {
            for chunk in self.store.search_text(org_id, keyword, limit).await? {
                if seen.insert(chunk.id) {
                    matches.push(chunk);
                }
            }
        }
        matches.truncate(limit);

        if matches.is_empty() {
            debug!(org_id, "keyword search empty, returning recent chunks");
            return self.recency_fallback(org_id, limit).await;
        }

        Ok(matches
            .into_iter()
            .map(|chunk| retrieved(chunk, KEYWORD_SCORE))
            .collect())
    }

    async fn recency_fallback(
        &self,
        org_id: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, crate::types::RagError> {
        Ok(self
            .store
            .recent_chunks(org_id, limit)
            .await?
            .into_iter()
            .map(|chunk| retrieved(chunk, RECENCY_SCORE))
            .collect())
    }
}

fn retrieved(chunk: ChunkRecord, similarity: f32) -> RetrievedChunk {
    let filename = chunk
        .metadata
        .get("filename")
        .and_then(|value| value.as_str())
        .unwrap_or(UNKNOWN_SOURCE)
        .to_string();
    RetrievedChunk {
        chunk,
        filename,
        similarity,
    }
}

/// Groups retrieved chunks into per-document citations.
///
/// Input order reflects the producing tier's ranking, so keeping the first
/// occurrence per document keeps its best chunk. The stable sort afterwards
/// only enforces the non-increasing score contract across tiers.
fn assemble_citations(hits: Vec<RetrievedChunk>) -> Retrieval {
    let mut seen_documents = HashSet::new();
    let mut citations: Vec<SourceCitation> = Vec::new();

    for hit in hits {
        if !seen_documents.insert(hit.chunk.document_id) {
            continue;
        }
        citations.push(SourceCitation {
            document_id: hit.chunk.document_id,
            filename: hit.filename,
            page: hit
                .chunk
                .metadata
                .get("page")
                .and_then(|value| value.as_u64())
                .and_then(|page| u32::try_from(page).ok()),
            section: hit
                .chunk
                .metadata
                .get("section_title")
                .and_then(|value| value.as_str())
                .map(str::to_string),
            excerpt: excerpt(&hit.chunk.text),
            relevance_score: round_score(hit.similarity),
        });
    }

    if citations.is_empty() {
        return Retrieval::NoMatch;
    }

    citations.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Retrieval::Found(citations)
}

/// Caps a chunk's text to a preview of [`EXCERPT_CHARS`] characters.
fn excerpt(text: &str) -> String {
    let mut chars = text.char_indices();
    match chars.nth(EXCERPT_CHARS) {
        Some((idx, _)) => {
            let mut preview = text[..idx].to_string();
            preview.push('…');
            preview
        }
        None => text.to_string(),
    }
}

/// Rounds a similarity to two decimals for presentation.
fn round_score(score: f32) -> f32 {
    (score * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockProvider;
    use crate::stores::MemoryStore;
    use crate::types::ChunkRecord;
    use serde_json::json;
    use uuid::Uuid;

    const ORG: &str = "org-test";

    fn chunk(doc: Uuid, index: usize, text: &str, filename: &str) -> ChunkRecord {
        ChunkRecord::new(ORG, doc, index, text)
            .with_metadata(json!({"filename": filename}))
    }

    async fn embedded_chunk(
        provider: &MockProvider,
        doc: Uuid,
        index: usize,
        text: &str,
        filename: &str,
    ) -> ChunkRecord {
        use crate::providers::AiProvider;
        let embedding = provider.embed(text).await.unwrap();
        chunk(doc, index, text, filename).with_embedding(embedding)
    }

    fn retriever(provider: MockProvider, store: Arc<MemoryStore>) -> Retriever {
        Retriever::new(Arc::new(provider), store)
    }

    #[tokio::test]
    async fn vector_tier_wins_when_similarity_clears_threshold() {
        let provider = MockProvider::new();
        let store = Arc::new(MemoryStore::new());
        let doc_vector = Uuid::new_v4();
        let doc_keyword = Uuid::new_v4();

        let query = "what is the annual leave policy";
        store
            .insert_chunks(vec![
                embedded_chunk(&provider, doc_vector, 0, query, "policy.txt").await,
                // Keyword bait in a different document; must not appear.
                chunk(doc_keyword, 0, "annual report of unrelated figures", "report.txt"),
            ])
            .await
            .unwrap();

        let result = retriever(provider, store).find_relevant(query, ORG, 5).await;
        let citations = result.citations();
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].document_id, doc_vector);
        // Identical text embeds identically, so similarity is 1.0.
        assert_eq!(citations[0].relevance_score, 1.0);
    }

    #[tokio::test]
    async fn below_threshold_vectors_demote_to_keyword_tier() {
        use crate::providers::AiProvider;

        let provider = MockProvider::new();
        let store = Arc::new(MemoryStore::new());
        let doc = Uuid::new_v4();

        let query = "vacation carryover rules";
        // Embedding opposite to the query vector: cosine -1, always filtered.
        let opposite: Vec<f32> = provider
            .embed(query)
            .await
            .unwrap()
            .iter()
            .map(|v| -v)
            .collect();
        store
            .insert_chunks(vec![
                chunk(doc, 0, "vacation days accrue monthly", "handbook.txt")
                    .with_embedding(opposite),
            ])
            .await
            .unwrap();

        let result = retriever(provider, store).find_relevant(query, ORG, 5).await;
        let citations = result.citations();
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].relevance_score, KEYWORD_SCORE);
    }

    #[tokio::test]
    async fn unembedded_chunks_are_reachable_via_keywords() {
        let provider = MockProvider::new();
        let store = Arc::new(MemoryStore::new());
        let doc = Uuid::new_v4();

        // Chunk persisted but not yet embedded: the background task hasn't
        // run. Keyword tier must still find it.
        store
            .insert_chunks(vec![chunk(doc, 0, "yıllık izin hakkı 14 gündür", "izin.txt")])
            .await
            .unwrap();

        let result = retriever(provider, store).find_relevant("izin", ORG, 5).await;
        let citations = result.citations();
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].relevance_score, KEYWORD_SCORE);
        assert_eq!(citations[0].filename, "izin.txt");
    }

    #[tokio::test]
    async fn embedding_failure_demotes_instead_of_erroring() {
        let provider = MockProvider::new().failing_embeddings();
        let store = Arc::new(MemoryStore::new());
        let doc = Uuid::new_v4();

        store
            .insert_chunks(vec![chunk(doc, 0, "remote work policy details", "remote.txt")])
            .await
            .unwrap();

        let result = retriever(provider, store)
            .find_relevant("remote work", ORG, 5)
            .await;
        assert_eq!(result.citations().len(), 1);
        assert_eq!(result.citations()[0].relevance_score, KEYWORD_SCORE);
    }

    #[tokio::test]
    async fn short_tokens_only_fall_back_to_recent_chunks() {
        let provider = MockProvider::new().failing_embeddings();
        let store = Arc::new(MemoryStore::new());
        let doc = Uuid::new_v4();

        store
            .insert_chunks(vec![chunk(doc, 0, "some indexed content", "doc.txt")])
            .await
            .unwrap();

        // Every token has <= 2 characters, so keyword extraction yields none.
        let result = retriever(provider, store).find_relevant("is it ok", ORG, 5).await;
        let citations = result.citations();
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].relevance_score, RECENCY_SCORE);
    }

    #[tokio::test]
    async fn unmatched_keywords_fall_back_to_recent_chunks() {
        let provider = MockProvider::new().failing_embeddings();
        let store = Arc::new(MemoryStore::new());
        let doc = Uuid::new_v4();

        store
            .insert_chunks(vec![chunk(doc, 0, "completely unrelated text", "doc.txt")])
            .await
            .unwrap();

        let result = retriever(provider, store)
            .find_relevant("zzzquery nomatch", ORG, 5)
            .await;
        assert_eq!(result.citations()[0].relevance_score, RECENCY_SCORE);
    }

    #[tokio::test]
    async fn empty_corpus_yields_explicit_no_match() {
        let provider = MockProvider::new();
        let store = Arc::new(MemoryStore::new());

        let result = retriever(provider, store)
            .find_relevant("anything at all", ORG, 5)
            .await;
        assert!(result.is_no_match());
        assert!(result.citations().is_empty());
    }

    #[tokio::test]
    async fn citations_are_deduplicated_by_document() {
        let provider = MockProvider::new();
        let store = Arc::new(MemoryStore::new());
        let doc = Uuid::new_v4();

        let query = "severance terms";
        store
            .insert_chunks(vec![
                embedded_chunk(&provider, doc, 0, query, "contract.txt").await,
                embedded_chunk(&provider, doc, 1, query, "contract.txt").await,
            ])
            .await
            .unwrap();

        let result = retriever(provider, store).find_relevant(query, ORG, 5).await;
        assert_eq!(result.citations().len(), 1, "one citation per document");
    }

    #[tokio::test]
    async fn citations_are_ordered_by_descending_score() {
        let provider = MockProvider::new();
        let store = Arc::new(MemoryStore::new());

        let query = "probation period length";
        let mut chunks = Vec::new();
        chunks.push(embedded_chunk(&provider, Uuid::new_v4(), 0, query, "exact.txt").await);
        // A near-but-not-identical text: similarity below 1.0 but usually
        // high enough to clear the threshold is not guaranteed, so give it a
        // handcrafted partially-aligned vector instead.
        {
            use crate::providers::AiProvider;
            let base = provider.embed(query).await.unwrap();
            let mut skewed = base.clone();
            skewed[0] += 1.0;
            let norm: f32 = skewed.iter().map(|v| v * v).sum::<f32>().sqrt();
            for v in &mut skewed {
                *v /= norm;
            }
            chunks.push(
                chunk(Uuid::new_v4(), 0, "probation details, partial match", "partial.txt")
                    .with_embedding(skewed),
            );
        }
        store.insert_chunks(chunks).await.unwrap();

        // Threshold zero keeps the partially-aligned vector in Tier 1
        // regardless of how the hash-seeded base vector is oriented.
        let result = Retriever::new(Arc::new(provider), store)
            .with_threshold(0.0)
            .find_relevant(query, ORG, 5)
            .await;
        let citations = result.citations();
        assert!(citations.len() >= 2);
        for pair in citations.windows(2) {
            assert!(pair[0].relevance_score >= pair[1].relevance_score);
        }
        assert_eq!(citations[0].filename, "exact.txt");
    }

    #[tokio::test]
    async fn long_excerpts_are_truncated_with_ellipsis() {
        let provider = MockProvider::new().failing_embeddings();
        let store = Arc::new(MemoryStore::new());
        let doc = Uuid::new_v4();

        let long_text = format!("keyword {}", "x".repeat(400));
        store
            .insert_chunks(vec![chunk(doc, 0, &long_text, "long.txt")])
            .await
            .unwrap();

        let result = retriever(provider, store).find_relevant("keyword", ORG, 5).await;
        let excerpt = &result.citations()[0].excerpt;
        assert!(excerpt.ends_with('…'));
        assert_eq!(excerpt.chars().count(), EXCERPT_CHARS + 1);
    }

    #[tokio::test]
    async fn page_and_section_metadata_carry_into_citations() {
        let provider = MockProvider::new().failing_embeddings();
        let store = Arc::new(MemoryStore::new());
        let doc = Uuid::new_v4();

        let record = ChunkRecord::new(ORG, doc, 0, "benefits overview text").with_metadata(json!({
            "filename": "benefits.txt",
            "page": 3,
            "section_title": "Benefits",
        }));
        store.insert_chunks(vec![record]).await.unwrap();

        let result = retriever(provider, store)
            .find_relevant("benefits", ORG, 5)
            .await;
        let citation = &result.citations()[0];
        assert_eq!(citation.page, Some(3));
        assert_eq!(citation.section.as_deref(), Some("Benefits"));
    }

    #[test]
    fn scores_round_to_two_decimals() {
        assert_eq!(round_score(0.87654), 0.88);
        assert_eq!(round_score(0.1), 0.1);
        assert_eq!(round_score(1.0), 1.0);
    }

    #[test]
    fn short_text_excerpt_is_unchanged() {
        assert_eq!(excerpt("short"), "short");
    }
}
