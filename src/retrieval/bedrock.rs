//! AWS Bedrock knowledge-base backend.
//!
//! Calls the Bedrock Agent Runtime `Retrieve` API over HTTPS with AWS
//! Signature V4 authentication.  Signing is done in pure Rust with
//! `hmac` and `sha2`, so the crate carries no AWS SDK and no C library
//! build dependencies.
//!
//! # Request
//!
//! ```text
//! POST /knowledgebases/{knowledgeBaseId}/retrieve
//! {
//!   "retrievalQuery": { "text": "<query>" },
//!   "retrievalConfiguration": {
//!     "vectorSearchConfiguration": { "numberOfResults": 3 }
//!   }
//! }
//! ```
//!
//! # Response
//!
//! A `retrievalResults` array where each item optionally carries
//! `content.text`, `score`, `metadata` (with the chunk-id key), and
//! `location.s3Location.uri`.  Unknown fields are ignored; every known
//! field is optional.
//!
//! # Authentication
//!
//! All requests are signed using
//! [AWS Signature Version 4](https://docs.aws.amazon.com/IAM/latest/UserGuide/reference_sigv4-create-signed-request.html)
//! with HMAC-SHA256 (`hmac` + `sha2` crates).  A session token header is
//! included when temporary credentials are in use.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{RetrievalBackend, RetrievalRequest, RetrievedChunk};
use crate::config::BedrockConfig;
use crate::errors::RetrievalError;

type HmacSha256 = Hmac<Sha256>;

/// Metadata key carrying the backend-assigned chunk identifier.
const CHUNK_ID_METADATA_KEY: &str = "x-amz-bedrock-kb-chunk-id";

/// SigV4 service name for the Bedrock Agent Runtime.
const SERVICE_NAME: &str = "bedrock";

/// `RetrievalBackend` implementation for AWS Bedrock knowledge bases.
pub struct BedrockKnowledgeBase {
    config: BedrockConfig,
    client: Client,
}

impl BedrockKnowledgeBase {
    /// Create a backend for the given connection settings.
    pub fn new(config: BedrockConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn config(&self) -> &BedrockConfig {
        &self.config
    }

    /// Hostname for the configured region, or the custom endpoint when
    /// one is set (LocalStack and similar stand-ins).
    fn host(&self) -> String {
        match &self.config.endpoint_url {
            Some(endpoint) => endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string(),
            None => format!("bedrock-agent-runtime.{}.amazonaws.com", self.config.region),
        }
    }
}

#[async_trait]
impl RetrievalBackend for BedrockKnowledgeBase {
    fn name(&self) -> &str {
        "bedrock"
    }

    async fn retrieve(
        &self,
        request: &RetrievalRequest,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let body =
            serde_json::to_vec(&RetrieveBody::from(request)).map_err(RetrievalError::request)?;
        let path = retrieve_path(&request.knowledge_base_id);
        let host = self.host();
        let url = format!("https://{host}{path}");

        let signed = sign_post(&self.config, &host, &path, &body, Utc::now());

        let mut builder = self
            .client
            .post(&url)
            .header("content-type", "application/json");
        for (name, value) in &signed.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .body(body)
            .send()
            .await
            .map_err(RetrievalError::request)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Backend {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let payload: RetrieveResponse =
            response.json().await.map_err(RetrievalError::malformed)?;

        Ok(payload
            .retrieval_results
            .into_iter()
            .map(RetrievedChunk::from)
            .collect())
    }
}

/// Canonical URI for the retrieve call.  Path segments are RFC 3986
/// encoded so the signed path matches what the backend sees.
fn retrieve_path(knowledge_base_id: &str) -> String {
    format!("/knowledgebases/{}/retrieve", uri_encode(knowledge_base_id))
}

// ============ Wire format ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveBody<'a> {
    retrieval_query: QueryBody<'a>,
    retrieval_configuration: ConfigurationBody,
}

#[derive(Serialize)]
struct QueryBody<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigurationBody {
    vector_search_configuration: VectorSearchBody,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VectorSearchBody {
    number_of_results: usize,
}

impl<'a> From<&'a RetrievalRequest> for RetrieveBody<'a> {
    fn from(request: &'a RetrievalRequest) -> Self {
        Self {
            retrieval_query: QueryBody {
                text: &request.query,
            },
            retrieval_configuration: ConfigurationBody {
                vector_search_configuration: VectorSearchBody {
                    number_of_results: request.result_count,
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveResponse {
    #[serde(default)]
    retrieval_results: Vec<WireResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireResult {
    content: Option<WireContent>,
    location: Option<WireLocation>,
    metadata: Option<HashMap<String, serde_json::Value>>,
    score: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireContent {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireLocation {
    s3_location: Option<WireS3Location>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireS3Location {
    uri: Option<String>,
}

impl From<WireResult> for RetrievedChunk {
    fn from(result: WireResult) -> Self {
        let chunk_id = result
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.get(CHUNK_ID_METADATA_KEY))
            .and_then(|value| value.as_str())
            .map(str::to_string);

        RetrievedChunk {
            content: result.content.and_then(|content| content.text),
            score: result.score,
            source_uri: result
                .location
                .and_then(|location| location.s3_location)
                .and_then(|location| location.uri),
            chunk_id,
        }
    }
}

// ============ AWS SigV4 Signing ============

/// Headers to attach to a signed request.
struct SignedRequest {
    headers: Vec<(String, String)>,
}

/// Sign a JSON POST with AWS Signature V4.
///
/// The canonical request covers `content-type`, `host`,
/// `x-amz-content-sha256`, `x-amz-date`, and the session token header
/// when present.  `reqwest` fills in `host` itself, so it is signed but
/// not returned.
fn sign_post(
    config: &BedrockConfig,
    host: &str,
    path: &str,
    body: &[u8],
    now: DateTime<Utc>,
) -> SignedRequest {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let payload_hash = hex_sha256(body);

    let mut headers = vec![
        ("content-type".to_string(), "application/json".to_string()),
        ("host".to_string(), host.to_string()),
        ("x-amz-content-sha256".to_string(), payload_hash.clone()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(token) = &config.credentials.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers = headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();

    let canonical_request =
        format!("POST\n{path}\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}");

    let credential_scope = format!(
        "{date_stamp}/{}/{SERVICE_NAME}/aws4_request",
        config.region
    );
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(
        &config.credentials.secret_access_key,
        &date_stamp,
        &config.region,
        SERVICE_NAME,
    );
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
        config.credentials.access_key_id
    );

    let mut out = vec![
        ("authorization".to_string(), authorization),
        ("x-amz-content-sha256".to_string(), payload_hash),
        ("x-amz-date".to_string(), amz_date),
    ];
    if let Some(token) = &config.credentials.session_token {
        out.push(("x-amz-security-token".to_string(), token.clone()));
    }

    SignedRequest { headers: out }
}

/// Compute the hex-encoded SHA-256 hash of data.
fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute HMAC-SHA256 of data with the given key.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{secret_key}").as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986 (used in SigV4 canonical requests).
///
/// Encodes all characters except unreserved characters:
/// `A-Z a-z 0-9 - _ . ~`
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::config::AwsCredentials;

    fn test_config() -> BedrockConfig {
        BedrockConfig::new(
            "us-east-1",
            AwsCredentials {
                access_key_id: "AKIDEXAMPLE".to_string(),
                secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
                session_token: None,
            },
        )
    }

    #[test]
    fn test_request_body_wire_shape() {
        let request = RetrievalRequest {
            knowledge_base_id: "KB123".to_string(),
            query: "how do refunds work".to_string(),
            result_count: 3,
        };
        let body = serde_json::to_value(RetrieveBody::from(&request)).unwrap();
        assert_eq!(
            body,
            json!({
                "retrievalQuery": { "text": "how do refunds work" },
                "retrievalConfiguration": {
                    "vectorSearchConfiguration": { "numberOfResults": 3 }
                }
            })
        );
    }

    #[test]
    fn test_response_parsing_full_item() {
        let payload = r#"{
            "retrievalResults": [
                {
                    "content": { "text": "Refunds are processed in 5 days.", "type": "TEXT" },
                    "location": {
                        "type": "S3",
                        "s3Location": { "uri": "s3://kb-docs/Refund_Policy.txt" }
                    },
                    "metadata": {
                        "x-amz-bedrock-kb-chunk-id": "chunk-id-1",
                        "x-amz-bedrock-kb-source-uri": "s3://kb-docs/Refund_Policy.txt"
                    },
                    "score": 0.73
                }
            ]
        }"#;
        let response: RetrieveResponse = serde_json::from_str(payload).unwrap();
        let chunks: Vec<RetrievedChunk> = response
            .retrieval_results
            .into_iter()
            .map(RetrievedChunk::from)
            .collect();

        assert_eq!(
            chunks,
            vec![RetrievedChunk {
                content: Some("Refunds are processed in 5 days.".to_string()),
                score: Some(0.73),
                source_uri: Some("s3://kb-docs/Refund_Policy.txt".to_string()),
                chunk_id: Some("chunk-id-1".to_string()),
            }]
        );
    }

    #[test]
    fn test_response_parsing_sparse_items() {
        let payload = r#"{
            "retrievalResults": [
                { "score": 0.5 },
                { "content": {} },
                { "content": { "text": "bare text" } }
            ]
        }"#;
        let response: RetrieveResponse = serde_json::from_str(payload).unwrap();
        let chunks: Vec<RetrievedChunk> = response
            .retrieval_results
            .into_iter()
            .map(RetrievedChunk::from)
            .collect();

        assert_eq!(chunks[0].content, None);
        assert_eq!(chunks[0].score, Some(0.5));
        assert_eq!(chunks[1].content, None);
        assert_eq!(chunks[2].content.as_deref(), Some("bare text"));
        assert_eq!(chunks[2].chunk_id, None);
        assert_eq!(chunks[2].source_uri, None);
    }

    #[test]
    fn test_response_parsing_empty_body() {
        let response: RetrieveResponse = serde_json::from_str("{}").unwrap();
        assert!(response.retrieval_results.is_empty());
    }

    #[test]
    fn test_non_string_chunk_id_is_ignored() {
        let payload = r#"{
            "retrievalResults": [
                { "content": { "text": "t" }, "metadata": { "x-amz-bedrock-kb-chunk-id": 42 } }
            ]
        }"#;
        let response: RetrieveResponse = serde_json::from_str(payload).unwrap();
        let chunk = RetrievedChunk::from(response.retrieval_results.into_iter().next().unwrap());
        assert_eq!(chunk.chunk_id, None);
    }

    #[test]
    fn test_default_host() {
        let backend = BedrockKnowledgeBase::new(test_config());
        assert_eq!(
            backend.host(),
            "bedrock-agent-runtime.us-east-1.amazonaws.com"
        );
    }

    #[test]
    fn test_endpoint_override_host() {
        let backend =
            BedrockKnowledgeBase::new(test_config().with_endpoint("http://localhost:4566/"));
        assert_eq!(backend.host(), "localhost:4566");
    }

    #[test]
    fn test_retrieve_path_encodes_id() {
        assert_eq!(retrieve_path("KB123"), "/knowledgebases/KB123/retrieve");
        assert_eq!(
            retrieve_path("kb/odd id"),
            "/knowledgebases/kb%2Fodd%20id/retrieve"
        );
    }

    #[test]
    fn test_uri_encode_unreserved() {
        assert_eq!(uri_encode("AZaz09-_.~"), "AZaz09-_.~");
        assert_eq!(uri_encode("a b+c"), "a%20b%2Bc");
    }

    #[test]
    fn test_derive_signing_key_matches_aws_example() {
        // Published example from the AWS SigV4 documentation.
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_sign_post_header_shape() {
        let now = Utc.with_ymd_and_hms(2012, 2, 15, 0, 0, 0).unwrap();
        let signed = sign_post(
            &test_config(),
            "bedrock-agent-runtime.us-east-1.amazonaws.com",
            "/knowledgebases/KB123/retrieve",
            b"{}",
            now,
        );

        let auth = signed
            .headers
            .iter()
            .find(|(name, _)| name == "authorization")
            .map(|(_, value)| value.clone())
            .unwrap();
        assert!(auth.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20120215/us-east-1/bedrock/aws4_request, \
             SignedHeaders=content-type;host;x-amz-content-sha256;x-amz-date, Signature="
        ));

        let amz_date = signed
            .headers
            .iter()
            .find(|(name, _)| name == "x-amz-date")
            .map(|(_, value)| value.clone())
            .unwrap();
        assert_eq!(amz_date, "20120215T000000Z");

        assert!(!signed
            .headers
            .iter()
            .any(|(name, _)| name == "x-amz-security-token"));
    }

    #[test]
    fn test_sign_post_includes_session_token() {
        let mut config = test_config();
        config.credentials.session_token = Some("TOKEN".to_string());

        let now = Utc.with_ymd_and_hms(2012, 2, 15, 0, 0, 0).unwrap();
        let signed = sign_post(
            &config,
            "bedrock-agent-runtime.us-east-1.amazonaws.com",
            "/knowledgebases/KB123/retrieve",
            b"{}",
            now,
        );

        let auth = signed
            .headers
            .iter()
            .find(|(name, _)| name == "authorization")
            .map(|(_, value)| value.clone())
            .unwrap();
        assert!(auth.contains(
            "SignedHeaders=content-type;host;x-amz-content-sha256;x-amz-date;x-amz-security-token"
        ));
        assert!(signed
            .headers
            .iter()
            .any(|(name, value)| name == "x-amz-security-token" && value == "TOKEN"));
    }

    #[test]
    fn test_signature_is_deterministic() {
        let now = Utc.with_ymd_and_hms(2012, 2, 15, 0, 0, 0).unwrap();
        let sign = || {
            sign_post(
                &test_config(),
                "bedrock-agent-runtime.us-east-1.amazonaws.com",
                "/knowledgebases/KB123/retrieve",
                b"{\"retrievalQuery\":{\"text\":\"q\"}}",
                now,
            )
            .headers
        };
        assert_eq!(sign(), sign());
    }
}
