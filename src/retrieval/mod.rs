//! Knowledge-base retrieval.
//!
//! This module provides:
//! - `RetrievalBackend` trait for abstraction over managed vector-search services
//! - `ContextRetriever`: shapes raw results into chat-ready context and citations
//! - `BedrockKnowledgeBase`: backend implementation for AWS Bedrock knowledge bases
//! - tracing decorators for observing calls without touching adapter logic

mod adapter;
mod bedrock;
mod observe;

pub use adapter::{
    ContextRetriever, ContextSource, RetrieverConfig, DEFAULT_RESULT_COUNT,
    MAX_SURFACED_CITATIONS,
};
pub use bedrock::BedrockKnowledgeBase;
pub use observe::{TracedBackend, TracedSource};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::RetrievalError;

/// Parameters for one retrieval round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalRequest {
    pub knowledge_base_id: String,
    pub query: String,
    /// Number of results the backend is asked for.
    pub result_count: usize,
}

/// A raw result item, normalized from whatever the backend returned.
///
/// Every field is optional at the wire level; the adapter decides what
/// is usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Text content of the chunk.
    pub content: Option<String>,
    /// Relevance score assigned by the backend.
    pub score: Option<f64>,
    /// URI of the source document this chunk was cut from.
    pub source_uri: Option<String>,
    /// Backend-assigned chunk identifier.
    pub chunk_id: Option<String>,
}

/// A single citation surfaced to the end user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub id: String,
    /// Human-readable source name derived from the document URI.
    pub file_name: String,
    pub snippet: String,
    pub score: f64,
}

/// The result of one retrieval call.
///
/// `is_rag_working` distinguishes "backend answered" (even with zero
/// matches) from "backend unreachable or not configured".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalOutcome {
    pub context: String,
    pub is_rag_working: bool,
    pub citations: Vec<Citation>,
}

impl RetrievalOutcome {
    /// The degraded outcome returned on every failure path.  The calling
    /// chat flow proceeds without grounding instead of failing the turn.
    pub fn unavailable() -> Self {
        Self {
            context: String::new(),
            is_rag_working: false,
            citations: Vec::new(),
        }
    }
}

/// Abstract trait for managed vector-search backends.
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    /// Backend name for logging / diagnostics.
    fn name(&self) -> &str;

    /// Fetch up to `request.result_count` chunks relevant to the query,
    /// in backend relevance order.
    async fn retrieve(
        &self,
        request: &RetrievalRequest,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError>;
}
