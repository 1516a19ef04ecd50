//! HTTP handlers for the review API

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use review_engine::{normalize, reconcile};
use shared_types::{Assessment, ValidatedError};

use crate::error::ApiError;
use crate::models::{AnalyzeRequest, AssessmentResponse, AssessmentRow, ErrorRow};
use crate::state::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "review-api",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Handler: POST /review/analyze
///
/// The full pipeline: normalize the text, send it upstream, reconcile the
/// candidates against the normalized text, assemble and store. A storage
/// failure does not fail the request; the response then carries a null id.
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AssessmentResponse>, ApiError> {
    let text = normalize(&request.text, Some(state.config.max_text_length))
        .map_err(|e| ApiError::InvalidText(e.to_string()))?;

    let outcome = state.analyzer.analyze(&text).await?;
    if outcome.malformed_dropped > 0 {
        tracing::warn!(
            "analysis reply contained {} malformed entries",
            outcome.malformed_dropped
        );
    }

    let received = outcome.candidates.len();
    let result = reconcile(&text, outcome.candidates);
    tracing::info!(
        "validated {} of {} candidates ({} dropped)",
        result.errors.len(),
        received,
        result.drops.total()
    );

    let assessment = Assessment::assemble(
        text,
        result.errors,
        outcome.summary,
        outcome.tokens_used,
        outcome.elapsed,
    );

    let id = match store_assessment(&state, &assessment).await {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::error!("Failed to store assessment: {}", e);
            None
        }
    };

    Ok(Json(AssessmentResponse::from_assessment(id, assessment)))
}

/// Handler: GET /review/:id
pub async fn get_assessment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<AssessmentResponse>, ApiError> {
    let row: AssessmentRow = sqlx::query_as(
        r#"
        SELECT id, text_submitted, summary, processing_time, tokens_used, created_at
        FROM assessments
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::AssessmentNotFound(id))?;

    let errors = load_errors(&state, row.id).await?;
    Ok(Json(to_response(row, errors)?))
}

/// Query parameters for the list endpoint
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
}

/// Handler: GET /review/
///
/// Most recent assessments first. The limit defaults to 100 and is clamped
/// to 1..=1000.
pub async fn list_assessments(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<AssessmentResponse>>, ApiError> {
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);

    let rows: Vec<AssessmentRow> = sqlx::query_as(
        r#"
        SELECT id, text_submitted, summary, processing_time, tokens_used, created_at
        FROM assessments
        ORDER BY id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(&state.db)
    .await?;

    let mut responses = Vec::with_capacity(rows.len());
    for row in rows {
        let errors = load_errors(&state, row.id).await?;
        responses.push(to_response(row, errors)?);
    }

    Ok(Json(responses))
}

/// Insert an assessment and its errors in one transaction.
async fn store_assessment(state: &AppState, assessment: &Assessment) -> Result<i64, sqlx::Error> {
    let mut tx = state.db.begin().await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO assessments (text_submitted, summary, processing_time, tokens_used, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&assessment.text_submitted)
    .bind(&assessment.summary)
    .bind(assessment.processing_time)
    .bind(assessment.tokens_used as i64)
    .bind(assessment.created_at.to_rfc3339())
    .execute(&mut *tx)
    .await?;

    let assessment_id = inserted.last_insert_rowid();

    for error in &assessment.errors {
        sqlx::query(
            r#"
            INSERT INTO assessment_errors
                (assessment_id, text_original, text_corrected, category, description, position, context)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(assessment_id)
        .bind(&error.text_original)
        .bind(&error.text_corrected)
        .bind(error.category.to_string())
        .bind(&error.description)
        .bind(error.position as i64)
        .bind(&error.context)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(assessment_id)
}

/// Stored errors for one assessment, in document order.
async fn load_errors(state: &AppState, assessment_id: i64) -> Result<Vec<ErrorRow>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT text_original, text_corrected, category, description, position, context
        FROM assessment_errors
        WHERE assessment_id = ?
        ORDER BY position ASC, id ASC
        "#,
    )
    .bind(assessment_id)
    .fetch_all(&state.db)
    .await
}

/// Rebuild the API shape from storage rows.
fn to_response(row: AssessmentRow, rows: Vec<ErrorRow>) -> Result<AssessmentResponse, ApiError> {
    let errors = rows
        .into_iter()
        .map(ValidatedError::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(ApiError::Internal)?;

    Ok(AssessmentResponse {
        id: Some(row.id),
        text_submitted: row.text_submitted,
        summary: row.summary,
        processing_time: row.processing_time,
        tokens_used: u32::try_from(row.tokens_used).unwrap_or(0),
        created_at: row.created_at,
        errors,
    })
}
