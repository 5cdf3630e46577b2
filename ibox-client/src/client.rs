//! HTTP transport and the uniform response envelope.

use std::fmt;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All endpoints live under this prefix on the array.
pub const API_BASE: &str = "/api/rest";

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// Malformed or contradictory input, caught before any network I/O.
    #[error("invalid input: {0}")]
    Validation(String),
    /// The outgoing payload could not be serialized. Never retried.
    #[error("failed to encode request body: {0}")]
    Encoding(#[source] serde_json::Error),
    /// Connection or protocol-level HTTP failure.
    #[error("http transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    /// The response body does not match the envelope contract; usually an
    /// incompatible server version.
    #[error("malformed api envelope (status {status}): {detail}")]
    Protocol { status: u16, detail: String },
    /// A well-formed envelope with its error member populated.
    #[error("{context}\n API response: {error}")]
    Api {
        context: String,
        status: u16,
        error: ApiError,
    },
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Error member of the response envelope, surfaced verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub is_remote: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub reasons: Option<serde_json::Value>,
    #[serde(default)]
    pub severity: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.severity, self.message)?;
        if let Some(reasons) = &self.reasons {
            write!(f, ", reasons: {}", reasons)?;
        }
        Ok(())
    }
}

/// Pagination and readiness metadata. Collection endpoints populate
/// `number_of_objects`; point lookups usually omit the whole member.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ApiMetadata {
    #[serde(default)]
    pub number_of_objects: i64,
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub page_size: i64,
    #[serde(default)]
    pub pages_total: i64,
    #[serde(default)]
    pub ready: bool,
}

/// The uniform wrapper every endpoint returns. Decoded and discarded within
/// a single call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiResult {
    #[serde(default)]
    pub error: Option<ApiError>,
    #[serde(default)]
    pub metadata: Option<ApiMetadata>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

/// iBox API client. Explicitly constructed, immutable, and passed by
/// reference to every driver call; cloning shares the connection pool.
#[derive(Clone)]
pub struct Client {
    username: String,
    password: String,
    hostname: String,
    http: reqwest::Client,
}

impl Client {
    /// Create a new client for the array at `hostname`.
    pub fn new(username: &str, password: &str, hostname: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            username: username.to_string(),
            password: password.to_string(),
            hostname: hostname.trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Build headers for a request. Non-GET verbs carry a JSON content type.
    fn headers(&self, method: &Method) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let credentials = BASE64.encode(format!("{}:{}", self.username, self.password));
        if let Ok(value) = HeaderValue::from_str(&format!("Basic {}", credentials)) {
            headers.insert(AUTHORIZATION, value);
        }

        if *method != Method::GET {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        headers
    }

    /// Issue one API call and decode the envelope. The body, if any, is
    /// already serialized; no retry happens at this layer.
    pub(crate) async fn api_call(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<(ApiResult, StatusCode)> {
        let url = format!("http://{}{}{}", self.hostname, API_BASE, path);
        tracing::debug!(method = %method, %url, "api request");

        let headers = self.headers(&method);
        let mut request = self.http.request(method.clone(), &url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        tracing::debug!(method = %method, %url, status = status.as_u16(), "api response");

        let envelope: ApiResult =
            serde_json::from_str(&text).map_err(|err| ClientError::Protocol {
                status: status.as_u16(),
                detail: err.to_string(),
            })?;
        Ok((envelope, status))
    }

    /// Serialize a request body, failing fast before any network I/O.
    pub(crate) fn encode<B: Serialize>(body: &B) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(body).map_err(ClientError::Encoding)
    }
}

/// Decode the envelope's result member into a typed record.
pub(crate) fn decode<T: DeserializeOwned>(
    result: Option<serde_json::Value>,
    status: StatusCode,
) -> Result<T> {
    let value = result.unwrap_or(serde_json::Value::Null);
    serde_json::from_value(value).map_err(|err| ClientError::Protocol {
        status: status.as_u16(),
        detail: err.to_string(),
    })
}

/// Surface a non-2xx response. The contract guarantees the error member is
/// populated; a missing one is a protocol violation, not a success.
pub(crate) fn api_error(context: String, status: StatusCode, envelope: ApiResult) -> ClientError {
    match envelope.error {
        Some(error) => ClientError::Api {
            context,
            status: status.as_u16(),
            error,
        },
        None => ClientError::Protocol {
            status: status.as_u16(),
            detail: format!("{}: error member missing from envelope", context),
        },
    }
}

/// Number of objects in a collection response, falling back to the decoded
/// array length when the server omits the metadata member.
pub(crate) fn number_of_objects(envelope: &ApiResult, decoded_len: usize) -> i64 {
    envelope
        .metadata
        .map(|m| m.number_of_objects)
        .unwrap_or(decoded_len as i64)
}
