use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("missing configuration: {0}")]
    MissingConfig(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("backend returned HTTP {status}: {body}")]
    Backend { status: u16, body: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl RetrievalError {
    pub fn request<E: std::fmt::Display>(err: E) -> Self {
        RetrievalError::Request(err.to_string())
    }

    pub fn malformed<E: std::fmt::Display>(err: E) -> Self {
        RetrievalError::MalformedResponse(err.to_string())
    }
}
