/// Judge0 transport
///
/// **Responsibility:**
/// Speak the Judge0 HTTP contract and nothing else.
///
/// - `POST /submissions?base64_encoded=..&wait=true` → one terminal result
/// - `POST /submissions/batch?base64_encoded=..` → one token per submission
/// - `GET /submissions/batch?tokens=..&base64_encoded=..` → results in token order
///
/// Numeric status ids are mapped into `JudgeStatus` here; retries, polling
/// and grading live above this layer.

use crate::error::JudgeError;
use crate::submission::Submission;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use gavel_common::{JudgeConfig, JudgeResult, JudgeStatus, Token};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Narrow interface to the external judge
#[async_trait]
pub trait JudgeApi: Send + Sync {
    /// Create one submission and wait for its terminal result
    async fn submit_wait(&self, request: &SubmissionRequest) -> Result<JudgeResult, JudgeError>;

    /// Create many submissions, returning their tokens in input order
    async fn submit_batch(&self, requests: &[SubmissionRequest]) -> Result<Vec<Token>, JudgeError>;

    /// Fetch the current results for the given tokens, in token order
    async fn fetch_batch(&self, tokens: &[Token]) -> Result<Vec<JudgeResult>, JudgeError>;
}

/// Request body for one submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub source_code: String,
    pub language_id: u32,
    pub stdin: String,
    pub expected_output: String,
}

impl From<&Submission> for SubmissionRequest {
    fn from(submission: &Submission) -> Self {
        Self {
            source_code: submission.source_code.clone(),
            language_id: submission.language_id.get(),
            stdin: submission.stdin.clone(),
            expected_output: submission.expected_output.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    submissions: &'a [SubmissionRequest],
}

#[derive(Debug, Deserialize)]
struct WireStatus {
    id: u32,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireResult {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    status: Option<WireStatus>,
    #[serde(default)]
    stdout: Option<String>,
    #[serde(default)]
    stderr: Option<String>,
    #[serde(default)]
    compile_output: Option<String>,
    #[serde(default)]
    message: Option<String>,
    /// Judge0 reports seconds as a decimal string
    #[serde(default)]
    time: Option<serde_json::Value>,
    #[serde(default)]
    memory: Option<u64>,
}

/// One entry of a batch creation response: a token, or the validation errors
#[derive(Debug, Deserialize)]
struct WireToken {
    #[serde(default)]
    token: Option<String>,
    #[serde(flatten)]
    errors: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WireBatchResults {
    submissions: Vec<Option<WireResult>>,
}

/// HTTP client for a Judge0 deployment
#[derive(Debug, Clone)]
pub struct Judge0Client {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    base64_encoded: bool,
}

impl Judge0Client {
    pub fn new(config: &JudgeConfig) -> Result<Self, JudgeError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| JudgeError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            base64_encoded: config.base64_encoded,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.header("X-Auth-Token", token),
            None => builder,
        }
    }

    fn encode_request(&self, request: &SubmissionRequest) -> SubmissionRequest {
        if !self.base64_encoded {
            return request.clone();
        }
        SubmissionRequest {
            source_code: general_purpose::STANDARD.encode(&request.source_code),
            language_id: request.language_id,
            stdin: general_purpose::STANDARD.encode(&request.stdin),
            expected_output: general_purpose::STANDARD.encode(&request.expected_output),
        }
    }

    fn decode_field(&self, field: Option<String>) -> Result<Option<String>, JudgeError> {
        match field {
            Some(raw) if self.base64_encoded => {
                // Judge0 wraps base64 output at 60 columns
                let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
                let bytes = general_purpose::STANDARD
                    .decode(compact.as_bytes())
                    .map_err(|e| JudgeError::Protocol(format!("invalid base64 field: {}", e)))?;
                Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
            }
            other => Ok(other),
        }
    }

    fn parse_result(&self, wire: WireResult) -> Result<JudgeResult, JudgeError> {
        let wire_status = wire
            .status
            .ok_or_else(|| JudgeError::Protocol("result has no status".to_string()))?;
        let status = JudgeStatus::from_id(wire_status.id).ok_or_else(|| {
            JudgeError::Protocol(format!("unknown status id {}", wire_status.id))
        })?;

        let time = match wire.time {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s.trim().parse::<f64>().map_err(|_| {
                JudgeError::Protocol(format!("invalid time value {:?}", s))
            })?),
            Some(serde_json::Value::Number(n)) => n.as_f64(),
            Some(other) => {
                return Err(JudgeError::Protocol(format!("invalid time value {}", other)))
            }
        };

        Ok(JudgeResult {
            token: wire.token.map(Token::new),
            status,
            status_description: wire_status
                .description
                .unwrap_or_else(|| status.default_description().to_string()),
            stdout: self.decode_field(wire.stdout)?,
            stderr: self.decode_field(wire.stderr)?,
            compile_output: self.decode_field(wire.compile_output)?,
            message: self.decode_field(wire.message)?,
            time,
            memory: wire.memory,
        })
    }

    /// Send a request and parse the JSON body, classifying failures
    async fn send<T>(&self, builder: reqwest::RequestBuilder) -> Result<T, JudgeError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self.authorize(builder).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            JudgeError::Protocol(format!("malformed response body ({}): {}", e, truncate(&body)))
        })
    }
}

/// 5xx and 429 mean the judge is struggling; other statuses mean we broke the contract
fn classify_status(status: StatusCode, body: &str) -> JudgeError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        JudgeError::Unavailable(format!("HTTP {}: {}", status, truncate(body)))
    } else {
        JudgeError::Protocol(format!("HTTP {}: {}", status, truncate(body)))
    }
}

fn truncate(body: &str) -> &str {
    const LIMIT: usize = 256;
    if body.len() <= LIMIT {
        return body;
    }
    let mut end = LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[async_trait]
impl JudgeApi for Judge0Client {
    async fn submit_wait(&self, request: &SubmissionRequest) -> Result<JudgeResult, JudgeError> {
        let body = self.encode_request(request);
        let builder = self
            .http
            .post(self.url("/submissions"))
            .query(&[
                ("base64_encoded", self.base64_encoded.to_string()),
                ("wait", "true".to_string()),
            ])
            .json(&body);

        let wire: WireResult = self.send(builder).await?;
        let result = self.parse_result(wire)?;
        debug!(status = %result.status, "Judge returned synchronous result");
        Ok(result)
    }

    async fn submit_batch(&self, requests: &[SubmissionRequest]) -> Result<Vec<Token>, JudgeError> {
        let encoded: Vec<SubmissionRequest> =
            requests.iter().map(|r| self.encode_request(r)).collect();
        let builder = self
            .http
            .post(self.url("/submissions/batch"))
            .query(&[("base64_encoded", self.base64_encoded.to_string())])
            .json(&BatchRequest {
                submissions: &encoded,
            });

        let entries: Vec<WireToken> = self.send(builder).await?;
        entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| match entry.token {
                Some(token) => Ok(Token::new(token)),
                None => Err(JudgeError::Protocol(format!(
                    "batch entry {} was rejected: {}",
                    index,
                    serde_json::Value::Object(entry.errors)
                ))),
            })
            .collect()
    }

    async fn fetch_batch(&self, tokens: &[Token]) -> Result<Vec<JudgeResult>, JudgeError> {
        let csv = tokens
            .iter()
            .map(Token::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let builder = self.http.get(self.url("/submissions/batch")).query(&[
            ("tokens", csv),
            ("base64_encoded", self.base64_encoded.to_string()),
        ]);

        let batch: WireBatchResults = self.send(builder).await?;
        batch
            .submissions
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                let wire = entry.ok_or_else(|| {
                    JudgeError::Protocol(format!("no result for token at position {}", index))
                })?;
                self.parse_result(wire)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gavel_common::RuntimeSignal;

    fn client(base64_encoded: bool) -> Judge0Client {
        let config = JudgeConfig {
            base64_encoded,
            ..JudgeConfig::new("http://judge.local/")
        };
        Judge0Client::new(&config).unwrap()
    }

    fn wire(json: &str) -> WireResult {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_trailing_slash_is_stripped() {
        assert_eq!(client(false).url("/submissions"), "http://judge.local/submissions");
    }

    #[test]
    fn test_maps_status_and_time() {
        let result = client(false)
            .parse_result(wire(
                r#"{"token": "t1", "status": {"id": 3, "description": "Accepted"},
                    "stdout": "3\n", "time": "0.012", "memory": 3120}"#,
            ))
            .unwrap();

        assert_eq!(result.status, JudgeStatus::Accepted);
        assert_eq!(result.token, Some(Token::new("t1")));
        assert_eq!(result.stdout.as_deref(), Some("3\n"));
        assert_eq!(result.time, Some(0.012));
        assert_eq!(result.memory, Some(3120));
    }

    #[test]
    fn test_runtime_error_sub_kind() {
        let result = client(false)
            .parse_result(wire(
                r#"{"status": {"id": 11, "description": "Runtime Error (NZEC)"}, "time": null}"#,
            ))
            .unwrap();
        assert_eq!(
            result.status,
            JudgeStatus::RuntimeError(RuntimeSignal::Nzec)
        );
        assert_eq!(result.status_description, "Runtime Error (NZEC)");
        assert_eq!(result.time, None);
    }

    #[test]
    fn test_unknown_status_is_protocol_error() {
        let err = client(false)
            .parse_result(wire(r#"{"status": {"id": 99, "description": "??"}}"#))
            .unwrap_err();
        assert!(matches!(err, JudgeError::Protocol(_)));

        let err = client(false).parse_result(wire(r#"{"stdout": "x"}"#)).unwrap_err();
        assert!(matches!(err, JudgeError::Protocol(_)));
    }

    #[test]
    fn test_base64_round_trip() {
        let client = client(true);
        let request = SubmissionRequest {
            source_code: "print(input())".to_string(),
            language_id: 71,
            stdin: "hi".to_string(),
            expected_output: "hi".to_string(),
        };

        let encoded = client.encode_request(&request);
        assert_eq!(encoded.stdin, "aGk=");
        assert_eq!(encoded.language_id, 71);

        let result = client
            .parse_result(wire(
                r#"{"status": {"id": 3}, "stdout": "aGkK\n", "stderr": null}"#,
            ))
            .unwrap();
        assert_eq!(result.stdout.as_deref(), Some("hi\n"));
        assert_eq!(result.status_description, "Accepted");
    }

    #[test]
    fn test_invalid_base64_is_protocol_error() {
        let err = client(true)
            .parse_result(wire(r#"{"status": {"id": 3}, "stdout": "%%%"}"#))
            .unwrap_err();
        assert!(matches!(err, JudgeError::Protocol(_)));
    }

    #[test]
    fn test_status_classification() {
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "").is_transient());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(!classify_status(StatusCode::UNPROCESSABLE_ENTITY, "").is_transient());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let body = "é".repeat(200);
        let cut = truncate(&body);
        assert!(cut.len() <= 256);
        assert!(body.starts_with(cut));
    }
}
