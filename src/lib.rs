//! Knowledge-base retrieval adapter for chat context grounding.
//!
//! Fetches semantically relevant document chunks from a managed
//! vector-search backend and shapes them into a context string plus a
//! short citation list for a single chat turn.  Retrieval failures never
//! escape to the caller: every failure path degrades to an empty outcome
//! with `is_rag_working = false`, so the surrounding chat flow proceeds
//! without grounding instead of failing the whole request.

pub mod config;
pub mod errors;
pub mod retrieval;

pub use config::{AwsCredentials, BedrockConfig};
pub use errors::RetrievalError;
pub use retrieval::{
    BedrockKnowledgeBase, Citation, ContextRetriever, ContextSource, RetrievalBackend,
    RetrievalOutcome, RetrievalRequest, RetrievedChunk, RetrieverConfig, TracedBackend,
    TracedSource,
};
