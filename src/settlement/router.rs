use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use super::domain::{DriverId, Platform, RawRecord};
use super::report::SettlementView;
use super::repository::{EarningRecordRepository, SettlementRepository};
use super::service::{FleetDirectory, RuleProvider, SettlementError, SettlementService};
use super::week::WeekId;

/// Router builder exposing the HTTP surface of the settlement engine.
pub fn settlement_router<S, D, P>(service: Arc<SettlementService<S, D, P>>) -> Router
where
    S: SettlementRepository + EarningRecordRepository + 'static,
    D: FleetDirectory + 'static,
    P: RuleProvider + 'static,
{
    Router::new()
        .route(
            "/api/v1/imports/:platform/:week",
            post(import_handler::<S, D, P>),
        )
        .route("/api/v1/settlements/:week", get(list_handler::<S, D, P>))
        .route(
            "/api/v1/settlements/:week/run",
            post(run_handler::<S, D, P>),
        )
        .route(
            "/api/v1/settlements/:week/recompute",
            post(recompute_handler::<S, D, P>),
        )
        .route(
            "/api/v1/settlements/:week/report",
            get(report_handler::<S, D, P>),
        )
        .route(
            "/api/v1/settlements/:week/export",
            get(export_handler::<S, D, P>),
        )
        .route(
            "/api/v1/settlements/:week/:driver_id",
            get(detail_handler::<S, D, P>),
        )
        .route(
            "/api/v1/settlements/:week/:driver_id/pay",
            post(pay_handler::<S, D, P>),
        )
        .route(
            "/api/v1/settlements/:week/:driver_id/cancel",
            post(cancel_handler::<S, D, P>),
        )
        .route(
            "/api/v1/settlements/:week/:driver_id/proof",
            post(proof_handler::<S, D, P>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct PayRequest {
    pub proof_reference: String,
    /// Defaults to today when the portal omits it.
    pub paid_on: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct RecomputeRequest {
    pub driver_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProofRequest {
    pub proof_reference: String,
}

pub(crate) async fn import_handler<S, D, P>(
    State(service): State<Arc<SettlementService<S, D, P>>>,
    Path((platform, week)): Path<(String, String)>,
    axum::Json(rows): axum::Json<Vec<RawRecord>>,
) -> Response
where
    S: SettlementRepository + EarningRecordRepository + 'static,
    D: FleetDirectory + 'static,
    P: RuleProvider + 'static,
{
    let platform = match platform.parse::<Platform>() {
        Ok(platform) => platform,
        Err(error) => return bad_request(&error),
    };
    let week = match week.parse::<WeekId>() {
        Ok(week) => week,
        Err(error) => return bad_request(&error.to_string()),
    };
    match service.import_batch(platform, week, &rows) {
        Ok(summary) => (StatusCode::ACCEPTED, axum::Json(summary)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_handler<S, D, P>(
    State(service): State<Arc<SettlementService<S, D, P>>>,
    Path(week): Path<String>,
) -> Response
where
    S: SettlementRepository + EarningRecordRepository + 'static,
    D: FleetDirectory + 'static,
    P: RuleProvider + 'static,
{
    let week = match week.parse::<WeekId>() {
        Ok(week) => week,
        Err(error) => return bad_request(&error.to_string()),
    };
    match service.settlements(week) {
        Ok(settlements) => {
            let views: Vec<SettlementView> = settlements.iter().map(SettlementView::from).collect();
            (StatusCode::OK, axum::Json(views)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn detail_handler<S, D, P>(
    State(service): State<Arc<SettlementService<S, D, P>>>,
    Path((week, driver_id)): Path<(String, String)>,
) -> Response
where
    S: SettlementRepository + EarningRecordRepository + 'static,
    D: FleetDirectory + 'static,
    P: RuleProvider + 'static,
{
    let week = match week.parse::<WeekId>() {
        Ok(week) => week,
        Err(error) => return bad_request(&error.to_string()),
    };
    match service.settlement(&DriverId(driver_id), week) {
        Ok(settlement) => {
            (StatusCode::OK, axum::Json(SettlementView::from(&settlement))).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn run_handler<S, D, P>(
    State(service): State<Arc<SettlementService<S, D, P>>>,
    Path(week): Path<String>,
) -> Response
where
    S: SettlementRepository + EarningRecordRepository + 'static,
    D: FleetDirectory + 'static,
    P: RuleProvider + 'static,
{
    let week = match week.parse::<WeekId>() {
        Ok(week) => week,
        Err(error) => return bad_request(&error.to_string()),
    };
    match service.run_week(week) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn recompute_handler<S, D, P>(
    State(service): State<Arc<SettlementService<S, D, P>>>,
    Path(week): Path<String>,
    body: Option<axum::Json<RecomputeRequest>>,
) -> Response
where
    S: SettlementRepository + EarningRecordRepository + 'static,
    D: FleetDirectory + 'static,
    P: RuleProvider + 'static,
{
    let week = match week.parse::<WeekId>() {
        Ok(week) => week,
        Err(error) => return bad_request(&error.to_string()),
    };
    let target = body
        .map(|axum::Json(request)| request.driver_id)
        .unwrap_or(None)
        .map(DriverId);
    match service.recompute(week, target) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn report_handler<S, D, P>(
    State(service): State<Arc<SettlementService<S, D, P>>>,
    Path(week): Path<String>,
) -> Response
where
    S: SettlementRepository + EarningRecordRepository + 'static,
    D: FleetDirectory + 'static,
    P: RuleProvider + 'static,
{
    let week = match week.parse::<WeekId>() {
        Ok(week) => week,
        Err(error) => return bad_request(&error.to_string()),
    };
    match service.weekly_report(week) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn export_handler<S, D, P>(
    State(service): State<Arc<SettlementService<S, D, P>>>,
    Path(week): Path<String>,
) -> Response
where
    S: SettlementRepository + EarningRecordRepository + 'static,
    D: FleetDirectory + 'static,
    P: RuleProvider + 'static,
{
    let week = match week.parse::<WeekId>() {
        Ok(week) => week,
        Err(error) => return bad_request(&error.to_string()),
    };
    match service.export_week_csv(week) {
        Ok(csv) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            csv,
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn pay_handler<S, D, P>(
    State(service): State<Arc<SettlementService<S, D, P>>>,
    Path((week, driver_id)): Path<(String, String)>,
    axum::Json(request): axum::Json<PayRequest>,
) -> Response
where
    S: SettlementRepository + EarningRecordRepository + 'static,
    D: FleetDirectory + 'static,
    P: RuleProvider + 'static,
{
    let week = match week.parse::<WeekId>() {
        Ok(week) => week,
        Err(error) => return bad_request(&error.to_string()),
    };
    let paid_on = request
        .paid_on
        .unwrap_or_else(|| Utc::now().date_naive());
    match service.mark_paid(
        &DriverId(driver_id),
        week,
        paid_on,
        request.proof_reference,
    ) {
        Ok(settlement) => {
            (StatusCode::OK, axum::Json(SettlementView::from(&settlement))).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn cancel_handler<S, D, P>(
    State(service): State<Arc<SettlementService<S, D, P>>>,
    Path((week, driver_id)): Path<(String, String)>,
) -> Response
where
    S: SettlementRepository + EarningRecordRepository + 'static,
    D: FleetDirectory + 'static,
    P: RuleProvider + 'static,
{
    let week = match week.parse::<WeekId>() {
        Ok(week) => week,
        Err(error) => return bad_request(&error.to_string()),
    };
    match service.cancel(&DriverId(driver_id), week) {
        Ok(settlement) => {
            (StatusCode::OK, axum::Json(SettlementView::from(&settlement))).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn proof_handler<S, D, P>(
    State(service): State<Arc<SettlementService<S, D, P>>>,
    Path((week, driver_id)): Path<(String, String)>,
    axum::Json(request): axum::Json<ProofRequest>,
) -> Response
where
    S: SettlementRepository + EarningRecordRepository + 'static,
    D: FleetDirectory + 'static,
    P: RuleProvider + 'static,
{
    let week = match week.parse::<WeekId>() {
        Ok(week) => week,
        Err(error) => return bad_request(&error.to_string()),
    };
    match service.attach_proof(&DriverId(driver_id), week, request.proof_reference) {
        Ok(settlement) => {
            (StatusCode::OK, axum::Json(SettlementView::from(&settlement))).into_response()
        }
        Err(error) => error_response(error),
    }
}

fn bad_request(message: &str) -> Response {
    let payload = json!({
        "error": message,
    });
    (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
}

fn error_response(error: SettlementError) -> Response {
    let status = match &error {
        SettlementError::Frozen { .. } | SettlementError::Conflict { .. } => StatusCode::CONFLICT,
        SettlementError::NotFound { .. } => StatusCode::NOT_FOUND,
        SettlementError::InvalidTransition(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SettlementError::Export(_) | SettlementError::Repository(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
