//! In-memory reference store.
//!
//! Keeps every record in process memory behind `parking_lot` locks and
//! answers similarity queries with brute-force cosine similarity. Not meant
//! for production data volumes; it exists so the pipeline and retriever can
//! be exercised without a database, and as the semantic reference for real
//! backends.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::types::{
    ChunkRecord, DashboardStats, DocumentRecord, DocumentStatus, FeedbackRecord, Message,
    MessageRecord, RagError, SessionRecord,
};

use super::Store;

/// Brute-force in-memory [`Store`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<Uuid, DocumentRecord>>,
    /// Insertion order doubles as indexing recency.
    chunks: RwLock<Vec<ChunkRecord>>,
    sessions: RwLock<HashMap<Uuid, SessionRecord>>,
    messages: RwLock<Vec<MessageRecord>>,
    feedback: RwLock<Vec<FeedbackRecord>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn org_session_ids(&self, org_id: &str) -> HashSet<Uuid> {
        self.sessions
            .read()
            .values()
            .filter(|session| session.org_id == org_id)
            .map(|session| session.id)
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_document(&self, document: DocumentRecord) -> Result<(), RagError> {
        self.documents.write().insert(document.id, document);
        Ok(())
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<DocumentRecord>, RagError> {
        Ok(self.documents.read().get(&id).cloned())
    }

    async fn list_documents(&self, org_id: &str) -> Result<Vec<DocumentRecord>, RagError> {
        let mut documents: Vec<DocumentRecord> = self
            .documents
            .read()
            .values()
            .filter(|doc| doc.org_id == org_id)
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(documents)
    }

    async fn update_document_status(
        &self,
        id: Uuid,
        status: DocumentStatus,
        error_message: Option<String>,
    ) -> Result<(), RagError> {
        let mut documents = self.documents.write();
        let document = documents
            .get_mut(&id)
            .ok_or_else(|| RagError::Storage(format!("document {id} not found")))?;
        document.status = status;
        document.error_message = error_message;
        Ok(())
    }

    async fn delete_document(&self, id: Uuid) -> Result<(), RagError> {
        self.documents.write().remove(&id);
        Ok(())
    }

    async fn insert_chunks(&self, chunks: Vec<ChunkRecord>) -> Result<(), RagError> {
        if chunks.is_empty() {
            return Ok(());
        }
        debug!(count = chunks.len(), "inserting chunks");
        self.chunks.write().extend(chunks);
        Ok(())
    }

    async fn delete_document_chunks(&self, document_id: Uuid) -> Result<usize, RagError> {
        let mut chunks = self.chunks.write();
        let before = chunks.len();
        chunks.retain(|chunk| chunk.document_id != document_id);
        Ok(before - chunks.len())
    }

    async fn chunks_missing_embedding(
        &self,
        document_id: Uuid,
    ) -> Result<Vec<ChunkRecord>, RagError> {
        Ok(self
            .chunks
            .read()
            .iter()
            .filter(|chunk| chunk.document_id == document_id && chunk.embedding.is_none())
            .cloned()
            .collect())
    }

    async fn set_chunk_embedding(
        &self,
        chunk_id: Uuid,
        embedding: Vec<f32>,
    ) -> Result<(), RagError> {
        let mut chunks = self.chunks.write();
        let chunk = chunks
            .iter_mut()
            .find(|chunk| chunk.id == chunk_id)
            .ok_or_else(|| RagError::Storage(format!("chunk {chunk_id} not found")))?;
        chunk.embedding = Some(embedding);
        Ok(())
    }

    async fn search_similar(
        &self,
        org_id: &str,
        query_embedding: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<(ChunkRecord, f32)>, RagError> {
        let chunks = self.chunks.read();
        let mut scored: Vec<(f32, &ChunkRecord)> = chunks
            .iter()
            .filter(|chunk| chunk.org_id == org_id)
            .filter_map(|chunk| {
                let embedding = chunk.embedding.as_deref()?;
                let score = Self::cosine_similarity(query_embedding, embedding);
                (score >= threshold).then_some((score, chunk))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, chunk)| (chunk.clone(), score))
            .collect())
    }

    async fn search_text(
        &self,
        org_id: &str,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<ChunkRecord>, RagError> {
        let needle = needle.to_lowercase();
        Ok(self
            .chunks
            .read()
            .iter()
            .filter(|chunk| chunk.org_id == org_id && chunk.text.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn recent_chunks(&self, org_id: &str, limit: usize) -> Result<Vec<ChunkRecord>, RagError> {
        Ok(self
            .chunks
            .read()
            .iter()
            .rev()
            .filter(|chunk| chunk.org_id == org_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_session(&self, session: SessionRecord) -> Result<(), RagError> {
        self.sessions.write().insert(session.id, session);
        Ok(())
    }

    async fn insert_message(&self, message: MessageRecord) -> Result<(), RagError> {
        self.messages.write().push(message);
        Ok(())
    }

    async fn session_messages(&self, session_id: Uuid) -> Result<Vec<MessageRecord>, RagError> {
        Ok(self
            .messages
            .read()
            .iter()
            .filter(|message| message.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn insert_feedback(&self, feedback: FeedbackRecord) -> Result<(), RagError> {
        self.feedback.write().push(feedback);
        Ok(())
    }

    async fn recent_questions(
        &self,
        org_id: &str,
        limit: usize,
    ) -> Result<Vec<String>, RagError> {
        let org_sessions = self.org_session_ids(org_id);
        Ok(self
            .messages
            .read()
            .iter()
            .rev()
            .filter(|message| {
                message.role == Message::USER && org_sessions.contains(&message.session_id)
            })
            .take(limit)
            .map(|message| message.content.clone())
            .collect())
    }

    async fn stats(&self, org_id: &str) -> Result<DashboardStats, RagError> {
        let now = Utc::now();
        let week_ago = now - chrono::Duration::days(7);
        let today = now.date_naive();

        let (total_documents, documents_this_week) = {
            let documents = self.documents.read();
            let total = documents.values().filter(|doc| doc.org_id == org_id).count();
            let this_week = documents
                .values()
                .filter(|doc| doc.org_id == org_id && doc.created_at >= week_ago)
                .count();
            (total, this_week)
        };
        let total_chunks = self
            .chunks
            .read()
            .iter()
            .filter(|chunk| chunk.org_id == org_id)
            .count();
        let chats_today = self
            .sessions
            .read()
            .values()
            .filter(|session| session.org_id == org_id && session.created_at.date_naive() == today)
            .count();

        // Feedback is tied to sessions, not organizations; join through the
        // session to keep every stat scoped the same way. Scores (1..=5) map
        // onto a 0-100 scale: 5 → 100, 1 → 20.
        let org_sessions = self.org_session_ids(org_id);
        let total_sessions = org_sessions.len();
        let scores: Vec<u32> = self
            .feedback
            .read()
            .iter()
            .filter(|feedback| org_sessions.contains(&feedback.session_id))
            .map(|feedback| u32::from(feedback.score))
            .collect();
        let accuracy_rate = if scores.is_empty() {
            None
        } else {
            let avg = scores.iter().sum::<u32>() as f32 / scores.len() as f32;
            Some((avg * 20.0 * 10.0).round() / 10.0)
        };

        Ok(DashboardStats {
            total_documents,
            total_chunks,
            total_sessions,
            documents_this_week,
            chats_today,
            accuracy_rate,
        })
    }
}
