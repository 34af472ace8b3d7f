//! ContextRetriever — shapes backend results into chat context.
//!
//! Queries the injected `RetrievalBackend` for chunks relevant to the
//! user's input and folds them into a context string plus a citation
//! list.  Failures never escape: a blank knowledge-base id or any
//! backend error degrades to an empty outcome so the surrounding chat
//! turn can proceed without grounding.

use async_trait::async_trait;

use super::{Citation, RetrievalBackend, RetrievalOutcome, RetrievalRequest, RetrievedChunk};

/// Results requested from the backend when the caller does not say.
pub const DEFAULT_RESULT_COUNT: usize = 3;

/// Citations surfaced to the end user per call.  The full result set
/// still feeds the context string; only the top entry is attributed.
pub const MAX_SURFACED_CITATIONS: usize = 1;

/// Separator between chunk texts in the assembled context.
const CONTEXT_SEPARATOR: &str = "\n\n";

/// Configuration for the retrieval adapter.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Results requested per call.
    pub result_count: usize,
    /// Citations surfaced per call.
    pub max_citations: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            result_count: DEFAULT_RESULT_COUNT,
            max_citations: MAX_SURFACED_CITATIONS,
        }
    }
}

/// Anything that resolves a query against a knowledge base into a
/// `RetrievalOutcome`.  Seam for decorators and for callers holding the
/// adapter as a trait object.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn retrieve_context(&self, query: &str, knowledge_base_id: &str) -> RetrievalOutcome;
}

/// Retrieval adapter over an injected backend.
pub struct ContextRetriever<B> {
    backend: B,
    config: RetrieverConfig,
}

impl<B: RetrievalBackend> ContextRetriever<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, RetrieverConfig::default())
    }

    pub fn with_config(backend: B, config: RetrieverConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Retrieve context using the configured default result count.
    pub async fn retrieve_context(
        &self,
        query: &str,
        knowledge_base_id: &str,
    ) -> RetrievalOutcome {
        self.retrieve_with_count(query, knowledge_base_id, self.config.result_count)
            .await
    }

    /// Retrieve context requesting `result_count` chunks from the backend.
    ///
    /// Never returns an error.  A blank knowledge-base id skips the
    /// backend entirely; a backend failure is logged and both yield
    /// `RetrievalOutcome::unavailable()`.
    pub async fn retrieve_with_count(
        &self,
        query: &str,
        knowledge_base_id: &str,
        result_count: usize,
    ) -> RetrievalOutcome {
        if knowledge_base_id.trim().is_empty() {
            tracing::warn!("knowledge base id not provided, skipping retrieval");
            return RetrievalOutcome::unavailable();
        }

        let request = RetrievalRequest {
            knowledge_base_id: knowledge_base_id.to_string(),
            query: query.to_string(),
            result_count,
        };

        match self.backend.retrieve(&request).await {
            Ok(chunks) => self.assemble(chunks),
            Err(err) => {
                tracing::error!(backend = self.backend.name(), "retrieval failed: {err}");
                RetrievalOutcome::unavailable()
            }
        }
    }

    /// Fold raw chunks into the final outcome.
    ///
    /// Chunks without non-empty text are dropped first; the index used
    /// for synthetic ids and fallback names is the position in the
    /// filtered sequence.  Backend ordering is preserved throughout.
    fn assemble(&self, chunks: Vec<RetrievedChunk>) -> RetrievalOutcome {
        let usable: Vec<&RetrievedChunk> = chunks
            .iter()
            .filter(|chunk| chunk.content.as_deref().is_some_and(|text| !text.is_empty()))
            .collect();

        let context = usable
            .iter()
            .map(|chunk| chunk.content.as_deref().unwrap_or_default())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);

        let citations: Vec<Citation> = usable
            .iter()
            .enumerate()
            .take(self.config.max_citations)
            .map(|(index, chunk)| build_citation(chunk, index))
            .collect();

        tracing::debug!(?citations, "parsed citations");

        RetrievalOutcome {
            context,
            is_rag_working: true,
            citations,
        }
    }
}

#[async_trait]
impl<B: RetrievalBackend> ContextSource for ContextRetriever<B> {
    async fn retrieve_context(&self, query: &str, knowledge_base_id: &str) -> RetrievalOutcome {
        ContextRetriever::retrieve_context(self, query, knowledge_base_id).await
    }
}

/// Build the citation for one chunk.  `index` is the chunk's position in
/// the filtered result sequence.
fn build_citation(chunk: &RetrievedChunk, index: usize) -> Citation {
    let raw_name = chunk
        .source_uri
        .as_deref()
        .and_then(|uri| uri.rsplit('/').next())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Source-{index}.txt"));

    Citation {
        id: chunk
            .chunk_id
            .clone()
            .unwrap_or_else(|| format!("chunk-{index}")),
        file_name: display_name(&raw_name),
        snippet: chunk.content.clone().unwrap_or_default(),
        score: chunk.score.unwrap_or(0.0),
    }
}

/// Turn a file name into a display name: underscores become spaces and
/// the first `.txt` marker is dropped.  Applies to the `Source-<n>.txt`
/// fallback as well, so unattributed chunks surface as `Source-<n>`.
fn display_name(file_name: &str) -> String {
    file_name.replace('_', " ").replacen(".txt", "", 1)
}
