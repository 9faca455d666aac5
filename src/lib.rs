//! ```text
//! Upload ──► extract::TextExtractor ──► chunker::split ──► stores::Store
//!                                                             │
//!                  providers::AiProvider ◄── ingestion::embed_pending
//!                                                             │
//! Question ──► retriever::Retriever ── vector ─┬─ keyword ─┬─ recency
//!                                              │           │
//!                                              ▼           ▼
//!                              SourceCitations or Retrieval::NoMatch
//!                                              │
//! chat::ChatService ──► grounded answer + citations
//! ```
//!
//! Document-grounded chat: documents go in one end, cited answers come out
//! the other. Retrieval degrades through three tiers rather than erroring,
//! and every answer carries the citations it drew from.

pub mod blob;
pub mod chat;
pub mod chunker;
pub mod config;
pub mod extract;
pub mod ingestion;
pub mod providers;
pub mod retriever;
pub mod stores;
pub mod types;

pub use chat::{ChatReply, ChatService};
pub use chunker::Chunk;
pub use config::Settings;
pub use ingestion::DocumentPipeline;
pub use providers::AiProvider;
pub use retriever::{Retrieval, Retriever};
pub use stores::Store;
pub use types::{RagError, SourceCitation};
