//! Tracing decorators for retrieval calls.
//!
//! Observability is a cross-cutting concern kept out of the adapter: wrap
//! a backend or a `ContextSource` in these decorators to record inputs
//! and outputs as spans, or leave them off (tests do).  Removing either
//! wrapper never changes what the wrapped call returns.

use async_trait::async_trait;
use tracing::Instrument;

use super::adapter::ContextSource;
use super::{RetrievalBackend, RetrievalOutcome, RetrievalRequest, RetrievedChunk};
use crate::errors::RetrievalError;

/// Records each backend round trip as a `fetch_documents` span.
pub struct TracedBackend<B> {
    inner: B,
}

impl<B: RetrievalBackend> TracedBackend<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<B: RetrievalBackend> RetrievalBackend for TracedBackend<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn retrieve(
        &self,
        request: &RetrievalRequest,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let span = tracing::info_span!(
            "fetch_documents",
            backend = self.inner.name(),
            query = %request.query,
            result_count = request.result_count,
        );
        async {
            let result = self.inner.retrieve(request).await;
            match &result {
                Ok(chunks) => tracing::debug!(returned = chunks.len(), "backend returned"),
                Err(err) => tracing::debug!(%err, "backend call failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

/// Records each adapter call as a `retrieval` span, including the final
/// citation list.
pub struct TracedSource<S> {
    inner: S,
}

impl<S: ContextSource> TracedSource<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: ContextSource> ContextSource for TracedSource<S> {
    async fn retrieve_context(&self, query: &str, knowledge_base_id: &str) -> RetrievalOutcome {
        let span = tracing::info_span!("retrieval", query = %query);
        async {
            let outcome = self.inner.retrieve_context(query, knowledge_base_id).await;
            tracing::debug!(
                is_rag_working = outcome.is_rag_working,
                citations = ?outcome.citations,
                context_chars = outcome.context.len(),
                "retrieval completed"
            );
            outcome
        }
        .instrument(span)
        .await
    }
}
