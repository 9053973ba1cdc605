use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;

use super::assessment::Assessment;
use super::domain::SubjectId;
use super::events::{CalculationEvent, ComparisonBasisEvent, LegacyAssessmentBatch};
use super::repository::{AssessmentRepository, MessagePublisher};
use super::service::{DeviationService, DeviationServiceError};

/// Router builder exposing the inbound events and history lookups over HTTP.
pub fn deviation_router<R, P>(service: Arc<DeviationService<R, P>>) -> Router
where
    R: AssessmentRepository + 'static,
    P: MessagePublisher + 'static,
{
    Router::new()
        .route(
            "/api/v1/deviation/calculations",
            post(calculation_handler::<R, P>),
        )
        .route(
            "/api/v1/deviation/comparison-bases",
            post(comparison_basis_handler::<R, P>),
        )
        .route(
            "/api/v1/deviation/legacy-assessments",
            post(reconciliation_handler::<R, P>),
        )
        .route(
            "/api/v1/deviation/histories/:subject/:qualifying_date",
            get(history_handler::<R, P>),
        )
        .with_state(service)
}

/// Public view of a stored history.
#[derive(Debug, Serialize)]
pub struct HistoryView {
    pub subject: SubjectId,
    pub qualifying_date: NaiveDate,
    pub current: Option<Assessment>,
    pub assessments: Vec<Assessment>,
}

pub(crate) async fn calculation_handler<R, P>(
    State(service): State<Arc<DeviationService<R, P>>>,
    axum::Json(event): axum::Json<CalculationEvent>,
) -> Response
where
    R: AssessmentRepository + 'static,
    P: MessagePublisher + 'static,
{
    match service.handle_calculation(event) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn comparison_basis_handler<R, P>(
    State(service): State<Arc<DeviationService<R, P>>>,
    axum::Json(event): axum::Json<ComparisonBasisEvent>,
) -> Response
where
    R: AssessmentRepository + 'static,
    P: MessagePublisher + 'static,
{
    match service.handle_comparison_basis(event) {
        Ok(outcome) => (StatusCode::ACCEPTED, axum::Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn reconciliation_handler<R, P>(
    State(service): State<Arc<DeviationService<R, P>>>,
    axum::Json(batch): axum::Json<LegacyAssessmentBatch>,
) -> Response
where
    R: AssessmentRepository + 'static,
    P: MessagePublisher + 'static,
{
    match service.reconcile(batch) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn history_handler<R, P>(
    State(service): State<Arc<DeviationService<R, P>>>,
    Path((subject, qualifying_date)): Path<(String, NaiveDate)>,
) -> Response
where
    R: AssessmentRepository + 'static,
    P: MessagePublisher + 'static,
{
    let subject = SubjectId(subject);
    match service.history(&subject, qualifying_date) {
        Ok(history) => {
            let view = HistoryView {
                subject: history.subject().clone(),
                qualifying_date: history.qualifying_date(),
                current: history.current().cloned(),
                assessments: history.assessments().to_vec(),
            };
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

fn error_response(error: DeviationServiceError) -> Response {
    let status = match error {
        DeviationServiceError::Basis(_)
        | DeviationServiceError::Deviation(_)
        | DeviationServiceError::Reconciliation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DeviationServiceError::Restore(_)
        | DeviationServiceError::Repository(_)
        | DeviationServiceError::Publish(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
