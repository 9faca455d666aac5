//! Durable storage collaborator.
//!
//! The pipeline treats storage as an external system behind the [`Store`]
//! trait: filtered CRUD over documents, chunks, sessions, and feedback, plus
//! the similarity-search operation delegated to the backend's native vector
//! capability. Nothing in the core builds its own index or query planner.
//!
//! ```text
//!                  ┌────────────────┐
//!                  │  Store trait   │
//!                  │  (async CRUD + │
//!                  │   similarity)  │
//!                  └───────┬────────┘
//!                          │
//!            ┌─────────────┼─────────────┐
//!            ▼             ▼             ▼
//!     ┌────────────┐ ┌────────────┐ ┌────────────┐
//!     │  Memory    │ │  (extern)  │ │  (extern)  │
//!     │ (tests/dev)│ │  pgvector  │ │ sqlite-vec │
//!     └────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! [`memory::MemoryStore`] is the in-crate reference implementation: brute
//! force but semantically faithful, used by the test suite and local
//! development.

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::types::{
    ChunkRecord, DashboardStats, DocumentRecord, DocumentStatus, FeedbackRecord, MessageRecord,
    RagError, SessionRecord,
};

pub use memory::MemoryStore;

/// Async storage interface consumed by the pipeline and the retriever.
///
/// All chunk queries are scoped by organization identifier; the core passes
/// the scope through without interpreting it.
#[async_trait]
pub trait Store: Send + Sync {
    // Documents

    async fn insert_document(&self, document: DocumentRecord) -> Result<(), RagError>;

    async fn get_document(&self, id: Uuid) -> Result<Option<DocumentRecord>, RagError>;

    /// All documents for an organization, newest first.
    async fn list_documents(&self, org_id: &str) -> Result<Vec<DocumentRecord>, RagError>;

    /// Updates processing status, storing `error_message` for failed documents.
    async fn update_document_status(
        &self,
        id: Uuid,
        status: DocumentStatus,
        error_message: Option<String>,
    ) -> Result<(), RagError>;

    async fn delete_document(&self, id: Uuid) -> Result<(), RagError>;

    // Chunks

    async fn insert_chunks(&self, chunks: Vec<ChunkRecord>) -> Result<(), RagError>;

    /// Deletes all chunks belonging to a document, returning the count removed.
    async fn delete_document_chunks(&self, document_id: Uuid) -> Result<usize, RagError>;

    /// Chunks of a document that have no embedding yet.
    ///
    /// This is the observable state of the background embedding task: a chunk
    /// disappears from this set exactly when its vector has been persisted.
    async fn chunks_missing_embedding(
        &self,
        document_id: Uuid,
    ) -> Result<Vec<ChunkRecord>, RagError>;

    async fn set_chunk_embedding(
        &self,
        chunk_id: Uuid,
        embedding: Vec<f32>,
    ) -> Result<(), RagError>;

    // Search

    /// Nearest chunks by cosine similarity within the organization scope,
    /// filtered to `similarity >= threshold`, most similar first.
    async fn search_similar(
        &self,
        org_id: &str,
        query_embedding: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<(ChunkRecord, f32)>, RagError>;

    /// Chunks whose text contains `needle` (case-insensitive substring).
    async fn search_text(
        &self,
        org_id: &str,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<ChunkRecord>, RagError>;

    /// Most-recently-indexed chunks for an organization.
    async fn recent_chunks(&self, org_id: &str, limit: usize) -> Result<Vec<ChunkRecord>, RagError>;

    // Sessions & feedback

    async fn insert_session(&self, session: SessionRecord) -> Result<(), RagError>;

    async fn insert_message(&self, message: MessageRecord) -> Result<(), RagError>;

    /// Messages of a session in insertion order.
    async fn session_messages(&self, session_id: Uuid) -> Result<Vec<MessageRecord>, RagError>;

    async fn insert_feedback(&self, feedback: FeedbackRecord) -> Result<(), RagError>;

    /// Most recent user-role questions across an organization's sessions,
    /// newest first.
    async fn recent_questions(
        &self,
        org_id: &str,
        limit: usize,
    ) -> Result<Vec<String>, RagError>;

    /// Aggregate counts for the dashboard view.
    async fn stats(&self, org_id: &str) -> Result<DashboardStats, RagError>;
}
