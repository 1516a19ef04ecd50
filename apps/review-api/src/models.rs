//! Data models for the review API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use shared_types::{Assessment, ErrorCategory, ValidatedError};

/// Request to analyze a piece of text
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    pub text: String,
}

/// Assessment as returned by the API.
///
/// `id` is null when the assessment was computed but could not be saved;
/// the analysis itself is still returned.
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentResponse {
    pub id: Option<i64>,
    pub text_submitted: String,
    pub summary: String,
    pub processing_time: f64,
    pub tokens_used: u32,
    pub created_at: DateTime<Utc>,
    pub errors: Vec<ValidatedError>,
}

impl AssessmentResponse {
    pub fn from_assessment(id: Option<i64>, assessment: Assessment) -> Self {
        Self {
            id,
            text_submitted: assessment.text_submitted,
            summary: assessment.summary,
            processing_time: assessment.processing_time,
            tokens_used: assessment.tokens_used,
            created_at: assessment.created_at,
            errors: assessment.errors,
        }
    }
}

/// Assessment row as stored in the database
#[derive(Debug, Clone, FromRow)]
pub struct AssessmentRow {
    pub id: i64,
    pub text_submitted: String,
    pub summary: String,
    pub processing_time: f64,
    pub tokens_used: i64,
    pub created_at: DateTime<Utc>,
}

/// Error row as stored in the database
#[derive(Debug, Clone, FromRow)]
pub struct ErrorRow {
    pub text_original: String,
    pub text_corrected: String,
    pub category: String,
    pub description: String,
    pub position: i64,
    pub context: String,
}

impl TryFrom<ErrorRow> for ValidatedError {
    type Error = anyhow::Error;

    fn try_from(row: ErrorRow) -> Result<Self, Self::Error> {
        let category: ErrorCategory = row.category.parse()?;
        let position = usize::try_from(row.position)
            .map_err(|_| anyhow::anyhow!("negative stored position: {}", row.position))?;
        Ok(ValidatedError {
            text_original: row.text_original,
            text_corrected: row.text_corrected,
            category,
            position,
            description: row.description,
            context: row.context,
        })
    }
}
