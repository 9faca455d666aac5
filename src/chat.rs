//! Chat over retrieved document context.
//!
//! [`ChatService::answer`] wires the retrieval cascade into prompt assembly:
//! a no-match retrieval short-circuits to a templated "not found" reply
//! without ever invoking the language model, and a completion failure
//! degrades to an apology string carrying the underlying error text; the
//! sources that were found are still returned either way.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::providers::AiProvider;
use crate::retriever::{Retrieval, Retriever};
use crate::stores::Store;
use crate::types::{
    DashboardStats, FeedbackRecord, Message, MessageRecord, RagError, SessionRecord,
    SourceCitation,
};

/// Instructions pinned to the front of every completion request.
pub const SYSTEM_PROMPT: &str = "\
You are a helpful assistant that answers questions from company documents.

RULES:
1. Answer ONLY from the provided context.
2. If the context does not contain the answer, say clearly that the \
information is not in the uploaded documents.
3. NEVER invent or guess information that is not in the context.
4. Cite your sources in every answer (which document, which section).
5. Present information clearly and concisely.

FORMAT:
- Bold the key facts
- Use bullet points for lists
- Break long answers into sections";

/// Reply used when retrieval produced no sources at all.
pub const NOT_FOUND_ANSWER: &str = "I could not find this information in the \
uploaded documents. Please try a different question or upload the relevant \
documents.";

/// Only the most recent turns of history are replayed into the prompt.
const HISTORY_WINDOW: usize = 6;

/// Answer plus the citations it was grounded on.
#[derive(Clone, Debug)]
pub struct ChatReply {
    pub answer: String,
    pub sources: Vec<SourceCitation>,
    /// `false` exactly when retrieval resolved to no-match.
    pub has_sources: bool,
}

/// RAG chat: retrieval, prompt assembly, completion, session persistence.
pub struct ChatService {
    retriever: Retriever,
    provider: Arc<dyn AiProvider>,
    store: Arc<dyn Store>,
    retrieval_limit: usize,
}

impl ChatService {
    pub fn new(
        retriever: Retriever,
        provider: Arc<dyn AiProvider>,
        store: Arc<dyn Store>,
        retrieval_limit: usize,
    ) -> Self {
        Self {
            retriever,
            provider,
            store,
            retrieval_limit,
        }
    }

    /// Answers a question against the organization's indexed documents.
    ///
    /// Never returns an error to the caller: retrieval failures resolve to
    /// the not-found reply and completion failures to an apology.
    pub async fn answer(&self, question: &str, org_id: &str, history: &[Message]) -> ChatReply {
        let retrieval = self
            .retriever
            .find_relevant(question, org_id, self.retrieval_limit)
            .await;

        let citations = match retrieval {
            Retrieval::NoMatch => {
                return ChatReply {
                    answer: NOT_FOUND_ANSWER.to_string(),
                    sources: Vec::new(),
                    has_sources: false,
                };
            }
            Retrieval::Found(citations) => citations,
        };

        let context = build_context(&citations);
        let messages = build_messages(history, question, &context);

        let answer = match self.provider.complete(&messages).await {
            Ok(text) => text,
            Err(err) => {
                warn!(org_id, error = %err, "completion failed, degrading to apology");
                format!("I ran into an error while answering your question: {err}")
            }
        };

        ChatReply {
            answer,
            has_sources: !citations.is_empty(),
            sources: citations,
        }
    }

    /// Creates a new chat session.
    pub async fn start_session(
        &self,
        org_id: &str,
        title: Option<&str>,
    ) -> Result<SessionRecord, RagError> {
        let session = SessionRecord {
            id: Uuid::new_v4(),
            org_id: org_id.to_string(),
            title: title.unwrap_or("New chat").to_string(),
            created_at: Utc::now(),
        };
        self.store.insert_session(session.clone()).await?;
        Ok(session)
    }

    /// Persists one turn of a session's transcript.
    pub async fn record_message(
        &self,
        session_id: Uuid,
        role: &str,
        content: &str,
        sources: Vec<SourceCitation>,
    ) -> Result<(), RagError> {
        self.store
            .insert_message(MessageRecord {
                id: Uuid::new_v4(),
                session_id,
                role: role.to_string(),
                content: content.to_string(),
                sources,
                created_at: Utc::now(),
            })
            .await
    }

    /// Loads a session's transcript as prompt-ready messages.
    pub async fn history(&self, session_id: Uuid) -> Result<Vec<Message>, RagError> {
        Ok(self
            .store
            .session_messages(session_id)
            .await?
            .into_iter()
            .map(|record| Message::new(&record.role, record.content))
            .collect())
    }

    /// Records user feedback for a session, scored 1 (poor) to 5 (excellent).
    pub async fn record_feedback(
        &self,
        session_id: Uuid,
        score: u8,
        comment: Option<String>,
    ) -> Result<(), RagError> {
        if !(1..=5).contains(&score) {
            return Err(RagError::Config(format!(
                "feedback score must be between 1 and 5, got {score}"
            )));
        }
        self.store
            .insert_feedback(FeedbackRecord {
                id: Uuid::new_v4(),
                session_id,
                score,
                comment,
                created_at: Utc::now(),
            })
            .await
    }

    /// Starter questions shown before the user has asked anything.
    #[must_use]
    pub fn suggested_questions(&self) -> Vec<&'static str> {
        vec![
            "What are the annual leave entitlements?",
            "What is the remote work policy?",
            "How does the performance review process work?",
            "What benefits are available?",
        ]
    }

    /// Most recent questions users have asked across the organization.
    pub async fn recent_questions(
        &self,
        org_id: &str,
        limit: usize,
    ) -> Result<Vec<String>, RagError> {
        self.store.recent_questions(org_id, limit).await
    }

    /// Aggregate counts for the dashboard view.
    pub async fn dashboard(&self, org_id: &str) -> Result<DashboardStats, RagError> {
        self.store.stats(org_id).await
    }
}

/// Renders citations into the numbered context block fed to the model.
fn build_context(citations: &[SourceCitation]) -> String {
    citations
        .iter()
        .enumerate()
        .map(|(i, citation)| {
            format!(
                "[Source {}: {}]\n{}\n---",
                i + 1,
                citation.filename,
                citation.excerpt
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Assembles the completion request: system prompt, a bounded window of
/// recent history, then the context-wrapped question.
fn build_messages(history: &[Message], question: &str, context: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len().min(HISTORY_WINDOW) + 2);
    messages.push(Message::system(SYSTEM_PROMPT));

    let start = history.len().saturating_sub(HISTORY_WINDOW);
    messages.extend(history[start..].iter().cloned());

    messages.push(Message::user(format!(
        "CONTEXT:\n{context}\n\nQUESTION:\n{question}"
    )));
    messages
}
