//! Backend configuration sourced from the process environment.
//!
//! Credentials are read once at construction and injected into the
//! backend client; nothing in this crate touches the environment at call
//! time.  A missing required variable is reported immediately instead of
//! surfacing later as an opaque signing failure.
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID` — required
//! - `AWS_SECRET_ACCESS_KEY` — required
//! - `AWS_SESSION_TOKEN` — optional (temporary credentials / assumed roles)
//! - `AWS_REGION` — optional, defaults to `us-east-1`

use crate::errors::RetrievalError;

/// Region used when `AWS_REGION` is not set.
pub const DEFAULT_REGION: &str = "us-east-1";

/// AWS credentials for signing backend requests.
#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    /// Load credentials from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`,
    /// and optionally `AWS_SESSION_TOKEN`.
    pub fn from_env() -> Result<Self, RetrievalError> {
        let access_key_id = require_env("AWS_ACCESS_KEY_ID")?;
        let secret_access_key = require_env("AWS_SECRET_ACCESS_KEY")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN")
            .ok()
            .filter(|token| !token.is_empty());

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// Connection settings for the managed knowledge-base backend.
#[derive(Debug, Clone)]
pub struct BedrockConfig {
    /// AWS region hosting the knowledge base.  Must match where the
    /// knowledge base was created.
    pub region: String,
    /// Custom endpoint for local stand-ins; the standard regional host is
    /// used when `None`.
    pub endpoint_url: Option<String>,
    pub credentials: AwsCredentials,
}

impl BedrockConfig {
    pub fn new(region: impl Into<String>, credentials: AwsCredentials) -> Self {
        Self {
            region: region.into(),
            endpoint_url: None,
            credentials,
        }
    }

    pub fn with_endpoint(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    /// Build a config from the process environment.
    ///
    /// Logs which credential variables were found, never their values.
    pub fn from_env() -> Result<Self, RetrievalError> {
        let credentials = AwsCredentials::from_env()?;
        let region = std::env::var("AWS_REGION")
            .ok()
            .filter(|region| !region.is_empty())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        tracing::info!(
            region = %region,
            session_token = credentials.session_token.is_some(),
            "loaded AWS credentials from environment"
        );

        Ok(Self {
            region,
            endpoint_url: None,
            credentials,
        })
    }
}

fn require_env(name: &str) -> Result<String, RetrievalError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(RetrievalError::MissingConfig(format!(
            "{name} environment variable not set"
        ))),
    }
}
