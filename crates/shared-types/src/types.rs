use chrono::{DateTime, Utc};
use std::time::Duration;

/// Category of a detected writing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Spelling,
    Grammar,
    Style,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCategory::Spelling => "spelling",
            ErrorCategory::Grammar => "grammar",
            ErrorCategory::Style => "style",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for ErrorCategory {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spelling" => Ok(ErrorCategory::Spelling),
            "grammar" => Ok(ErrorCategory::Grammar),
            "style" => Ok(ErrorCategory::Style),
            other => Err(ParseCategoryError(other.to_string())),
        }
    }
}

/// A stored category string that does not name a known category.
#[derive(Debug, thiserror::Error)]
#[error("unknown error category: {0:?}")]
pub struct ParseCategoryError(pub String);

/// One error suggestion as reported by the analysis service, before any
/// verification against the submitted text.
///
/// Everything in here is untrusted: the context may not occur in the text,
/// and the position is a hint at best. Candidates only exist between the
/// upstream reply and the reconciliation pass.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RawCandidate {
    pub category: ErrorCategory,
    pub text_original: String,
    pub text_corrected: String,
    pub context: String,
    pub description: String,
    /// Where the service claims the error starts. Used only to pick between
    /// multiple matches, never trusted as-is.
    #[serde(default)]
    pub reported_position: Option<usize>,
}

/// A candidate that survived reconciliation, pinned to a verified offset.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidatedError {
    pub text_original: String,
    pub text_corrected: String,
    pub category: ErrorCategory,
    /// Byte offset into the normalized text. Guaranteed to satisfy
    /// `text[position..position + text_original.len()] == text_original`.
    pub position: usize,
    pub description: String,
    pub context: String,
}

/// A completed review: the analyzed text, the quality summary, and the
/// validated errors in document order.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Assessment {
    pub text_submitted: String,
    pub summary: String,
    /// Upstream round-trip time in seconds.
    pub processing_time: f64,
    pub tokens_used: u32,
    pub created_at: DateTime<Utc>,
    pub errors: Vec<ValidatedError>,
}

impl Assessment {
    /// Package validated errors with the request metadata. Pure composition;
    /// `created_at` is stamped here.
    pub fn assemble(
        text_submitted: String,
        errors: Vec<ValidatedError>,
        summary: String,
        tokens_used: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            text_submitted,
            summary,
            processing_time: elapsed.as_secs_f64(),
            tokens_used,
            created_at: Utc::now(),
            errors,
        }
    }
}
