//! Analysis gateway: the upstream LLM behind the review service.
//!
//! Everything past this module only sees the [`TextAnalyzer`] contract:
//! normalized text in, raw candidates plus usage metadata out, or a
//! classified failure. The production implementation talks to the Gemini
//! `generateContent` REST endpoint; tests substitute their own analyzer.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use shared_types::{ErrorCategory, RawCandidate};

/// Instruction contract sent with every request. The context rule at the
/// end is load-bearing: reconciliation can only anchor candidates whose
/// context is an exact substring of the submitted text.
const REVIEW_PROMPT: &str = r#"You are an expert proofreader and copy editor. Analyze the provided text for errors and assess its overall quality.

ERROR DETECTION RULES:
- Focus on genuine errors, not subjective style preferences
- Categorize each error as exactly one of: "spelling", "grammar", "style"
- Report at most 30 errors, preferring the most significant ones

FOR EACH ERROR provide:
- text_original: the exact erroneous text as it appears, the wrong words only, never the whole sentence
- text_corrected: your suggested correction
- category: one of "spelling", "grammar", "style"
- description: a brief explanation, under 500 characters
- position: the 0-based character index where the error starts
- context: the erroneous text with surrounding characters, around 200 characters in total

QUALITY SUMMARY:
Provide an overall assessment in under 1000 characters: readability, the most frequent error types, a quality rating (poor, fair, good or excellent) and key recommendations.

CRITICAL: every context value must be copied verbatim from the provided text, with text_original contained in it exactly as reported. Do not paraphrase, trim words or fix anything inside context.

Respond with a JSON object holding an "errors" array and a "summary" string."#;

/// What a successful upstream round trip produced.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub candidates: Vec<RawCandidate>,
    pub summary: String,
    pub tokens_used: u32,
    /// Wall-clock duration of the upstream call.
    pub elapsed: Duration,
    /// Reply entries that did not decode as candidates and were skipped.
    pub malformed_dropped: u32,
}

/// Upstream failures, classified for the API error mapping.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("analysis timed out after {0}ms")]
    Timeout(u64),

    #[error("analysis service rate limit exceeded")]
    RateLimited,

    #[error("analysis service returned unusable data: {0}")]
    Parse(String),

    #[error("analysis request failed: {0}")]
    Http(String),

    #[error("analysis service error (status {status}): {message}")]
    Upstream { status: u16, message: String },
}

impl GatewayError {
    /// Status reported to our own callers.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::RateLimited
            | GatewayError::Parse(_)
            | GatewayError::Http(_)
            | GatewayError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Capability interface for the external analysis service.
#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    /// Analyze normalized text, returning unverified candidates.
    async fn analyze(&self, text: &str) -> Result<AnalysisOutcome, GatewayError>;
}

/// Connection settings for the Gemini backend.
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model_id: String,
    pub base_url: String,
    pub timeout: Duration,
}

// Manual impl: the credential must never reach a log line.
impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model_id", &self.model_id)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Production [`TextAnalyzer`] speaking the Gemini REST protocol.
pub struct GeminiAnalyzer {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiAnalyzer {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model_id
        )
    }

    fn timeout_ms(&self) -> u64 {
        self.config.timeout.as_millis() as u64
    }

    /// One send/receive cycle, with upstream failures classified.
    async fn round_trip(&self, text: &str) -> Result<Value, GatewayError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request_body(text))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(self.timeout_ms())
                } else {
                    GatewayError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GatewayError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))
    }
}

#[async_trait]
impl TextAnalyzer for GeminiAnalyzer {
    async fn analyze(&self, text: &str) -> Result<AnalysisOutcome, GatewayError> {
        let started = Instant::now();

        let payload = tokio::time::timeout(self.config.timeout, self.round_trip(text))
            .await
            .map_err(|_| GatewayError::Timeout(self.timeout_ms()))??;

        let elapsed = started.elapsed();
        debug!("Gemini round trip took {}ms", elapsed.as_millis());

        decode_reply(&payload, elapsed)
    }
}

/// Build the generateContent request: instruction contract plus text, with
/// a response schema pinning the reply to the `{errors, summary}` shape.
fn request_body(text: &str) -> Value {
    json!({
        "contents": [{
            "parts": [
                { "text": REVIEW_PROMPT },
                { "text": text },
            ]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "errors": {
                        "type": "ARRAY",
                        "items": {
                            "type": "OBJECT",
                            "properties": {
                                "category": { "type": "STRING", "enum": ["spelling", "grammar", "style"] },
                                "text_original": { "type": "STRING" },
                                "text_corrected": { "type": "STRING" },
                                "context": { "type": "STRING" },
                                "description": { "type": "STRING" },
                                "position": { "type": "INTEGER" },
                            },
                            "required": ["category", "text_original", "text_corrected", "context", "description"],
                        },
                    },
                    "summary": { "type": "STRING" },
                },
                "required": ["errors", "summary"],
            },
        },
    })
}

/// One reply entry as the model writes it. The position is accepted as any
/// JSON value and discarded when it cannot be a text offset; a model that
/// mangles the hint should not cost us the whole candidate.
#[derive(Debug, Deserialize)]
struct WireCandidate {
    category: ErrorCategory,
    text_original: String,
    text_corrected: String,
    context: String,
    description: String,
    #[serde(default)]
    position: Option<Value>,
}

impl From<WireCandidate> for RawCandidate {
    fn from(wire: WireCandidate) -> Self {
        let reported_position = wire
            .position
            .as_ref()
            .and_then(Value::as_i64)
            .and_then(|p| usize::try_from(p).ok());
        RawCandidate {
            category: wire.category,
            text_original: wire.text_original,
            text_corrected: wire.text_corrected,
            context: wire.context,
            description: wire.description,
            reported_position,
        }
    }
}

/// Decode a generateContent reply into candidates plus usage metadata.
///
/// Individual entries that do not fit the candidate shape are skipped and
/// counted. The call as a whole only fails when the model text is not the
/// expected JSON document, or when every entry of a non-empty list is
/// malformed.
fn decode_reply(payload: &Value, elapsed: Duration) -> Result<AnalysisOutcome, GatewayError> {
    let model_text = payload["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part["text"].as_str())
                .collect::<String>()
        })
        .filter(|text| !text.is_empty())
        .ok_or_else(|| GatewayError::Parse("reply contains no content".to_string()))?;

    let document: Value = serde_json::from_str(&model_text)
        .map_err(|e| GatewayError::Parse(format!("model output is not JSON: {}", e)))?;

    let summary = document["summary"].as_str().unwrap_or_default().to_string();
    let entries = document["errors"].as_array().cloned().unwrap_or_default();

    let mut candidates = Vec::with_capacity(entries.len());
    let mut malformed = 0u32;
    for entry in &entries {
        match serde_json::from_value::<WireCandidate>(entry.clone()) {
            Ok(wire) => candidates.push(RawCandidate::from(wire)),
            Err(e) => {
                warn!("skipping malformed reply entry: {}", e);
                malformed += 1;
            }
        }
    }

    if !entries.is_empty() && candidates.is_empty() {
        return Err(GatewayError::Parse(format!(
            "all {} reply entries were malformed",
            malformed
        )));
    }

    // Usage metadata is best-effort; a missing count is reported as zero.
    let tokens_used = payload["usageMetadata"]["totalTokenCount"]
        .as_u64()
        .unwrap_or(0) as u32;

    Ok(AnalysisOutcome {
        candidates,
        summary,
        tokens_used,
        elapsed,
        malformed_dropped: malformed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Wrap a model document in the generateContent reply envelope.
    fn reply(document: &Value, tokens: Option<u64>) -> Value {
        let mut payload = json!({
            "candidates": [{
                "content": {
                    "parts": [{ "text": document.to_string() }]
                }
            }]
        });
        if let Some(count) = tokens {
            payload["usageMetadata"] = json!({ "totalTokenCount": count });
        }
        payload
    }

    fn entry(original: &str, position: Value) -> Value {
        json!({
            "category": "spelling",
            "text_original": original,
            "text_corrected": "fixed",
            "context": format!("around {original} here"),
            "description": "misspelling",
            "position": position,
        })
    }

    const ELAPSED: Duration = Duration::from_millis(250);

    #[test]
    fn decodes_a_well_formed_reply() {
        let document = json!({
            "errors": [entry("teh", json!(7)), entry("recieve", json!(40))],
            "summary": "Mostly clean."
        });
        let outcome = decode_reply(&reply(&document, Some(321)), ELAPSED).unwrap();

        assert_eq!(outcome.candidates.len(), 2);
        assert_eq!(outcome.candidates[0].text_original, "teh");
        assert_eq!(outcome.candidates[0].reported_position, Some(7));
        assert_eq!(outcome.candidates[0].category, ErrorCategory::Spelling);
        assert_eq!(outcome.summary, "Mostly clean.");
        assert_eq!(outcome.tokens_used, 321);
        assert_eq!(outcome.elapsed, ELAPSED);
        assert_eq!(outcome.malformed_dropped, 0);
    }

    #[test]
    fn unusable_positions_are_discarded_without_losing_the_entry() {
        let document = json!({
            "errors": [
                entry("aaa", json!(-4)),
                entry("bbb", json!(3.5)),
                entry("ccc", json!("12")),
                entry("ddd", Value::Null),
            ],
            "summary": ""
        });
        let outcome = decode_reply(&reply(&document, None), ELAPSED).unwrap();

        assert_eq!(outcome.candidates.len(), 4);
        for candidate in &outcome.candidates {
            assert_eq!(candidate.reported_position, None);
        }
        assert_eq!(outcome.malformed_dropped, 0);
    }

    #[test]
    fn malformed_entries_are_skipped_and_counted() {
        let document = json!({
            "errors": [
                entry("good", json!(0)),
                { "category": "punctuation", "text_original": "x", "text_corrected": "y",
                  "context": "x", "description": "bad category" },
                { "category": "grammar", "text_original": "missing fields" },
            ],
            "summary": "One good entry."
        });
        let outcome = decode_reply(&reply(&document, Some(10)), ELAPSED).unwrap();

        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].text_original, "good");
        assert_eq!(outcome.malformed_dropped, 2);
    }

    #[test]
    fn all_entries_malformed_is_a_parse_error() {
        let document = json!({
            "errors": [
                { "category": "nope" },
                { "text_original": 42 },
            ],
            "summary": "irrelevant"
        });
        let result = decode_reply(&reply(&document, None), ELAPSED);
        assert!(matches!(result, Err(GatewayError::Parse(_))));
    }

    #[test]
    fn empty_error_list_is_not_a_failure() {
        let document = json!({ "errors": [], "summary": "Flawless." });
        let outcome = decode_reply(&reply(&document, Some(55)), ELAPSED).unwrap();
        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.summary, "Flawless.");
        assert_eq!(outcome.malformed_dropped, 0);
    }

    #[test]
    fn reply_without_content_is_a_parse_error() {
        let payload = json!({ "candidates": [] });
        let result = decode_reply(&payload, ELAPSED);
        assert!(matches!(result, Err(GatewayError::Parse(_))));
    }

    #[test]
    fn non_json_model_text_is_a_parse_error() {
        let payload = json!({
            "candidates": [{ "content": { "parts": [{ "text": "Sorry, I cannot do that." }] } }]
        });
        let result = decode_reply(&payload, ELAPSED);
        assert!(matches!(result, Err(GatewayError::Parse(_))));
    }

    #[test]
    fn model_text_split_across_parts_is_reassembled() {
        let document = json!({ "errors": [entry("teh", json!(3))], "summary": "ok" });
        let text = document.to_string();
        let (head, tail) = text.split_at(text.len() / 2);
        let payload = json!({
            "candidates": [{
                "content": { "parts": [{ "text": head }, { "text": tail }] }
            }]
        });
        let outcome = decode_reply(&payload, ELAPSED).unwrap();
        assert_eq!(outcome.candidates.len(), 1);
    }

    #[test]
    fn missing_usage_metadata_reads_as_zero_tokens() {
        let document = json!({ "errors": [], "summary": "ok" });
        let outcome = decode_reply(&reply(&document, None), ELAPSED).unwrap();
        assert_eq!(outcome.tokens_used, 0);
    }

    #[test]
    fn timeout_maps_to_gateway_timeout_status() {
        assert_eq!(
            GatewayError::Timeout(30_000).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(GatewayError::RateLimited.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            GatewayError::Parse("x".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::Upstream { status: 500, message: String::new() }.status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn config_debug_redacts_the_api_key() {
        let config = GeminiConfig {
            api_key: "google-secret".to_string(),
            model_id: "gemini-2.0-flash".to_string(),
            base_url: "http://localhost:1234".to_string(),
            timeout: Duration::from_secs(5),
        };
        let printed = format!("{:?}", config);
        assert!(!printed.contains("google-secret"));
        assert!(printed.contains("<redacted>"));
        assert!(printed.contains("gemini-2.0-flash"));
    }
}
