//! Document lifecycle: upload, text extraction, chunk persistence, and the
//! background embedding pass.
//!
//! Upload and processing are decoupled: the caller gets a document record
//! back as soon as bytes are stored, and any extraction or storage failure is
//! recorded on the document (`status = failed` plus a stored error message)
//! rather than thrown back through the upload call. Embedding runs as a
//! detached task after chunks are persisted; a reader racing that task sees
//! chunks without embeddings and retrieval falls back to keyword search until
//! the pass completes. There is no transaction spanning chunk persistence and
//! embedding persistence; partial completion after a crash is tolerated and
//! repaired by re-invoking [`DocumentPipeline::embed_pending`].

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::chunker;
use crate::config::Settings;
use crate::extract::TextExtractor;
use crate::providers::AiProvider;
use crate::stores::Store;
use crate::types::{ChunkRecord, DocumentRecord, DocumentStatus, RagError};

/// Embedding requests are batched to respect provider input limits.
pub const EMBEDDING_BATCH_SIZE: usize = 100;

/// Orchestrates a document's path from uploaded bytes to searchable chunks.
///
/// All collaborators are injected at construction; the pipeline holds no
/// per-request state and serves concurrent requests without coordination.
pub struct DocumentPipeline {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    extractor: Arc<dyn TextExtractor>,
    provider: Arc<dyn AiProvider>,
    settings: Settings,
}

impl DocumentPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        extractor: Arc<dyn TextExtractor>,
        provider: Arc<dyn AiProvider>,
        settings: Settings,
    ) -> Self {
        Self {
            store,
            blobs,
            extractor,
            provider,
            settings,
        }
    }

    /// Stores an uploaded file and indexes it into chunks.
    ///
    /// Returns the document record in its post-processing state. Extraction
    /// and chunk-persistence failures mark the document failed instead of
    /// erroring; only blob/record insertion failures (before processing can
    /// even start) surface as errors.
    pub async fn upload(
        &self,
        bytes: &[u8],
        filename: &str,
        mime_type: &str,
        org_id: &str,
    ) -> Result<DocumentRecord, RagError> {
        let id = Uuid::new_v4();
        let storage_key = format!("{org_id}/{id}/{filename}");
        self.blobs.put(&storage_key, bytes).await?;

        let record = DocumentRecord {
            id,
            org_id: org_id.to_string(),
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            size_bytes: bytes.len(),
            storage_key,
            status: DocumentStatus::Uploaded,
            error_message: None,
            created_at: Utc::now(),
        };
        self.store.insert_document(record.clone()).await?;

        match self.index_document(&record, bytes).await {
            Ok(count) => {
                debug!(document_id = %id, chunks = count, "document indexed");
                self.store
                    .update_document_status(id, DocumentStatus::Indexed, None)
                    .await?;
            }
            Err(err) => {
                warn!(document_id = %id, error = %err, "document processing failed");
                self.store
                    .update_document_status(id, DocumentStatus::Failed, Some(err.to_string()))
                    .await?;
            }
        }

        self.store
            .get_document(id)
            .await?
            .ok_or_else(|| RagError::Storage(format!("document {id} vanished during upload")))
    }

    /// Re-runs extraction and chunking for a stored document.
    ///
    /// Existing chunks are replaced, so reprocessing never duplicates.
    pub async fn process(&self, document_id: Uuid) -> Result<usize, RagError> {
        let document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| RagError::Storage(format!("document {document_id} not found")))?;

        self.store
            .update_document_status(document_id, DocumentStatus::Processing, None)
            .await?;

        let result = async {
            let bytes = self.blobs.get(&document.storage_key).await?;
            self.store.delete_document_chunks(document_id).await?;
            self.index_document(&document, &bytes).await
        }
        .await;

        match result {
            Ok(count) => {
                self.store
                    .update_document_status(document_id, DocumentStatus::Indexed, None)
                    .await?;
                Ok(count)
            }
            Err(err) => {
                self.store
                    .update_document_status(
                        document_id,
                        DocumentStatus::Failed,
                        Some(err.to_string()),
                    )
                    .await?;
                Err(err)
            }
        }
    }

    /// Splits extracted text and persists the chunk records.
    async fn index_document(
        &self,
        document: &DocumentRecord,
        bytes: &[u8],
    ) -> Result<usize, RagError> {
        let text = self
            .extractor
            .extract(bytes, &document.mime_type, &document.filename)
            .await?;

        let mut context = serde_json::Map::new();
        context.insert("document_id".into(), document.id.to_string().into());
        context.insert("filename".into(), document.filename.clone().into());

        let chunks = chunker::split(
            &text,
            self.settings.chunk_size,
            self.settings.chunk_overlap,
            Some(&context),
        );

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .map(|chunk| {
                ChunkRecord::new(&document.org_id, document.id, chunk.chunk_index, chunk.text)
                    .with_metadata(chunk.metadata)
            })
            .collect();

        let count = records.len();
        self.store.insert_chunks(records).await?;
        Ok(count)
    }

    /// Embeds every chunk of a document that still lacks a vector.
    ///
    /// Batches of [`EMBEDDING_BATCH_SIZE`] keep requests inside provider
    /// limits. A transient failure leaves already-persisted vectors in place;
    /// calling again retries only what is still missing.
    pub async fn embed_pending(&self, document_id: Uuid) -> Result<usize, RagError> {
        let pending = self.store.chunks_missing_embedding(document_id).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut processed = 0;
        for batch in pending.chunks(EMBEDDING_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = self.provider.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "provider returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }
            for (chunk, vector) in batch.iter().zip(vectors) {
                self.store.set_chunk_embedding(chunk.id, vector).await?;
                processed += 1;
            }
        }

        debug!(document_id = %document_id, embedded = processed, "embedding pass complete");
        Ok(processed)
    }

    /// Kicks off [`embed_pending`](Self::embed_pending) as a detached task.
    ///
    /// Failures are logged, not propagated: un-embedded chunks stay reachable
    /// through the keyword fallback tier until a later pass succeeds.
    pub fn spawn_embedding(self: &Arc<Self>, document_id: Uuid) -> tokio::task::JoinHandle<()> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = pipeline.embed_pending(document_id).await {
                warn!(
                    document_id = %document_id,
                    error = %err,
                    "background embedding failed; chunks remain keyword-searchable"
                );
            }
        })
    }

    /// Deletes a document, its chunks, and its stored bytes.
    pub async fn delete(&self, document_id: Uuid) -> Result<(), RagError> {
        let Some(document) = self.store.get_document(document_id).await? else {
            return Ok(());
        };

        // Chunks first: a crash between the two deletes must not leave
        // orphaned chunks pointing at a missing document.
        self.store.delete_document_chunks(document_id).await?;
        self.store.delete_document(document_id).await?;

        if let Err(err) = self.blobs.delete(&document.storage_key).await {
            warn!(document_id = %document_id, error = %err, "blob cleanup failed");
        }
        Ok(())
    }

    /// All documents for an organization, newest first.
    pub async fn list(&self, org_id: &str) -> Result<Vec<DocumentRecord>, RagError> {
        self.store.list_documents(org_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::FsBlobStore;
    use crate::extract::PlainTextExtractor;
    use crate::providers::MockProvider;
    use crate::stores::MemoryStore;
    use tempfile::{TempDir, tempdir};

    const ORG: &str = "org-test";

    fn pipeline_with(provider: MockProvider) -> (Arc<DocumentPipeline>, Arc<MemoryStore>, TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let pipeline = Arc::new(DocumentPipeline::new(
            store.clone(),
            Arc::new(FsBlobStore::new(dir.path())),
            Arc::new(PlainTextExtractor),
            Arc::new(provider),
            Settings::default(),
        ));
        (pipeline, store, dir)
    }

    #[tokio::test]
    async fn upload_indexes_text_documents() {
        let (pipeline, store, _dir) = pipeline_with(MockProvider::new());

        let body = "First paragraph of the policy.\n\nSecond paragraph with details.";
        let document = pipeline
            .upload(body.as_bytes(), "policy.txt", "text/plain", ORG)
            .await
            .unwrap();

        assert_eq!(document.status, DocumentStatus::Indexed);
        assert!(document.error_message.is_none());

        let chunks = store.recent_chunks(ORG, 10).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].document_id, document.id);
        assert_eq!(chunks[0].metadata["filename"], "policy.txt");
        assert_eq!(chunks[0].metadata["char_start"], 0);
        assert!(chunks[0].embedding.is_none(), "embedding runs separately");
    }

    #[tokio::test]
    async fn unsupported_format_marks_document_failed_without_erroring() {
        let (pipeline, store, _dir) = pipeline_with(MockProvider::new());

        let document = pipeline
            .upload(b"%PDF-1.7 binary", "scan.pdf", "application/pdf", ORG)
            .await
            .unwrap();

        assert_eq!(document.status, DocumentStatus::Failed);
        let message = document.error_message.unwrap();
        assert!(message.contains("extraction"), "stored message: {message}");
        assert!(store.recent_chunks(ORG, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn embed_pending_fills_missing_vectors() {
        let (pipeline, store, _dir) = pipeline_with(MockProvider::new());

        let document = pipeline
            .upload(b"Some indexable content here.", "notes.txt", "text/plain", ORG)
            .await
            .unwrap();

        let embedded = pipeline.embed_pending(document.id).await.unwrap();
        assert_eq!(embedded, 1);
        assert!(
            store
                .chunks_missing_embedding(document.id)
                .await
                .unwrap()
                .is_empty()
        );

        // Idempotent: nothing left to embed.
        assert_eq!(pipeline.embed_pending(document.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn embedding_failure_is_retriable() {
        let (pipeline, store, _dir) = pipeline_with(MockProvider::new().failing_embeddings());

        let document = pipeline
            .upload(b"Chunk text survives embedding failures.", "a.txt", "text/plain", ORG)
            .await
            .unwrap();
        assert_eq!(document.status, DocumentStatus::Indexed);

        let result = pipeline.embed_pending(document.id).await;
        assert!(matches!(result, Err(RagError::Embedding(_))));

        // Chunks were persisted before embedding and remain pending.
        assert_eq!(
            store
                .chunks_missing_embedding(document.id)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn spawned_embedding_completes_in_background() {
        let (pipeline, store, _dir) = pipeline_with(MockProvider::new());

        let document = pipeline
            .upload(b"Background embedding target.", "bg.txt", "text/plain", ORG)
            .await
            .unwrap();

        pipeline.spawn_embedding(document.id).await.unwrap();
        assert!(
            store
                .chunks_missing_embedding(document.id)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn reprocessing_replaces_chunks_without_duplication() {
        let (pipeline, store, _dir) = pipeline_with(MockProvider::new());

        let document = pipeline
            .upload(b"Stable paragraph content.", "stable.txt", "text/plain", ORG)
            .await
            .unwrap();

        let count = pipeline.process(document.id).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.recent_chunks(ORG, 10).await.unwrap().len(), 1);

        let refreshed = store.get_document(document.id).await.unwrap().unwrap();
        assert_eq!(refreshed.status, DocumentStatus::Indexed);
    }

    #[tokio::test]
    async fn delete_cascades_to_chunks_and_blob() {
        let (pipeline, store, _dir) = pipeline_with(MockProvider::new());

        let document = pipeline
            .upload(b"Delete me soon.", "temp.txt", "text/plain", ORG)
            .await
            .unwrap();

        pipeline.delete(document.id).await.unwrap();

        assert!(store.get_document(document.id).await.unwrap().is_none());
        assert!(store.recent_chunks(ORG, 10).await.unwrap().is_empty());
        assert!(pipeline.list(ORG).await.unwrap().is_empty());

        // Deleting again is a no-op, not an error.
        pipeline.delete(document.id).await.unwrap();
    }
}
