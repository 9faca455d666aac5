//! Core domain types shared across the document pipeline and retrieval cascade.
//!
//! Every field the pipeline depends on is a named struct member; only
//! genuinely caller-supplied context lives in the open `metadata` maps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors produced by the document pipeline and its collaborators.
///
/// Collaborator failures are wrapped into a string payload at the boundary
/// where they occur, so callers can log and branch without dragging every
/// backend's error type through the public API.
#[derive(Debug, Error)]
pub enum RagError {
    /// The source document could not be read or parsed into text.
    /// Fatal to that document's processing; the document is marked failed.
    #[error("text extraction failed: {0}")]
    Extraction(String),

    /// An embedding request failed. Transient: chunks are persisted before
    /// embeddings, so re-invoking the embedding pass retries cleanly.
    #[error("embedding request failed: {0}")]
    Embedding(String),

    /// A chat completion request failed.
    #[error("chat completion failed: {0}")]
    Completion(String),

    /// A storage operation failed.
    #[error("storage operation failed: {0}")]
    Storage(String),

    /// A blob read or write failed.
    #[error("blob store operation failed: {0}")]
    Blob(String),

    /// Configuration was missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem-level failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Processing state of an uploaded document.
///
/// `Indexed` means chunks are persisted; it does not imply every chunk has an
/// embedding yet; embedding runs as a detached task and retrieval tolerates
/// chunks in either state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Indexed,
    Failed,
}

/// A stored document and its processing state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub org_id: String,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: usize,
    /// Key under which the raw bytes live in the blob store.
    pub storage_key: String,
    pub status: DocumentStatus,
    /// Populated when `status == Failed`; surfaced on the next list/read.
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A persisted chunk of a document's extracted text.
///
/// `char_start`/`char_end` are character offsets into the cleaned source text
/// the chunk was derived from. Consecutive chunks may overlap by design;
/// offsets are monotonically non-decreasing across `chunk_index`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: Uuid,
    pub org_id: String,
    pub document_id: Uuid,
    pub chunk_index: usize,
    pub text: String,
    /// Open metadata map: positional fields plus caller-supplied context
    /// (at minimum a human-readable source label).
    pub metadata: serde_json::Value,
    /// `None` until the background embedding pass has run for this chunk.
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

impl ChunkRecord {
    pub fn new(
        org_id: impl Into<String>,
        document_id: Uuid,
        chunk_index: usize,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id: org_id.into(),
            document_id,
            chunk_index,
            text: text.into(),
            metadata: serde_json::Value::Object(Default::default()),
            embedding: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// A chunk pulled back by one retrieval tier, with provenance and score.
///
/// Transient: exists only for the duration of one query, between the search
/// tiers and citation assembly.
#[derive(Clone, Debug)]
pub struct RetrievedChunk {
    pub chunk: ChunkRecord,
    pub filename: String,
    /// Similarity in `[0, 1]`; vector matches carry the store's cosine
    /// similarity, keyword and recency matches carry a flat tier score.
    pub similarity: f32,
}

/// A user-facing reference tying an answer back to a source document.
///
/// One citation per distinct source document per query.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SourceCitation {
    pub document_id: Uuid,
    pub filename: String,
    pub page: Option<u32>,
    pub section: Option<String>,
    /// Truncated text preview, capped with a `…` suffix.
    pub excerpt: String,
    /// Rounded to two decimals for presentation.
    pub relevance_score: f32,
}

/// A role-tagged message in a chat conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub const SYSTEM: &'static str = "system";
    pub const USER: &'static str = "user";
    pub const ASSISTANT: &'static str = "assistant";

    #[must_use]
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Self::SYSTEM, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Self::USER, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Self::ASSISTANT, content)
    }
}

/// A stored chat session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub org_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// A stored chat message with the citations it was answered from.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: String,
    pub content: String,
    pub sources: Vec<SourceCitation>,
    pub created_at: DateTime<Utc>,
}

/// User feedback on a chat session, scored 1 (poor) to 5 (excellent).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub score: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate counts for the dashboard view.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DashboardStats {
    pub total_documents: usize,
    pub total_chunks: usize,
    pub total_sessions: usize,
    /// Documents uploaded within the last seven days.
    pub documents_this_week: usize,
    /// Sessions started since UTC midnight.
    pub chats_today: usize,
    /// Average feedback score mapped onto a 0–100 scale; `None` when the
    /// organization has no feedback yet.
    pub accuracy_rate: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors_set_roles() {
        assert_eq!(Message::system("s").role, "system");
        assert_eq!(Message::user("u").role, "user");
        assert_eq!(Message::assistant("a").role, "assistant");
    }

    #[test]
    fn chunk_record_builder_attaches_embedding_and_metadata() {
        let doc = Uuid::new_v4();
        let record = ChunkRecord::new("org", doc, 3, "body")
            .with_metadata(serde_json::json!({"filename": "a.txt"}))
            .with_embedding(vec![0.5, 0.5]);
        assert_eq!(record.chunk_index, 3);
        assert_eq!(record.metadata["filename"], "a.txt");
        assert_eq!(record.embedding.as_deref(), Some(&[0.5, 0.5][..]));
    }

    #[test]
    fn document_status_serializes_lowercase() {
        let json = serde_json::to_string(&DocumentStatus::Indexed).unwrap();
        assert_eq!(json, "\"indexed\"");
    }
}
