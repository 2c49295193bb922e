use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::candidates::export::ExportScope;
use crate::candidates::ranking::{FilterKey, FilterState};
use crate::candidates::selection::{SelectionSet, ToggleOutcome};
use crate::dashboard::view::{BulkOutcome, ComparisonEntry, DashboardView, MutationOutcome};
use crate::errors::AppError;
use crate::models::candidate::{CandidateKey, CandidateStatus};
use crate::models::notification::MarkReadRequest;
use crate::notifications::NotificationSummary;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SelectJobRequest {
    pub job_id: String,
}

#[derive(Deserialize)]
pub struct SearchRequest {
    pub text: String,
}

#[derive(Deserialize)]
pub struct StatusUpdateRequest {
    pub status: CandidateStatus,
}

#[derive(Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub scope: ExportScope,
}

#[derive(Serialize)]
pub struct SelectionResponse {
    pub outcome: ToggleOutcome,
    pub selection: SelectionSet,
}

/// GET /api/v1/dashboard
pub async fn handle_get_view(State(state): State<AppState>) -> Json<DashboardView> {
    Json(state.dashboard.view())
}

/// POST /api/v1/dashboard/job
pub async fn handle_select_job(
    State(state): State<AppState>,
    Json(req): Json<SelectJobRequest>,
) -> Result<Json<DashboardView>, AppError> {
    state.dashboard.select_job(&req.job_id).await?;
    Ok(Json(state.dashboard.view()))
}

/// POST /api/v1/dashboard/job/results/retry
pub async fn handle_retry_results(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.dashboard.retry_results().await?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/dashboard/history/refresh
pub async fn handle_refresh_history(
    State(state): State<AppState>,
) -> Result<Json<DashboardView>, AppError> {
    state.dashboard.refresh_history().await?;
    Ok(Json(state.dashboard.view()))
}

/// POST /api/v1/dashboard/filters/:key/toggle
pub async fn handle_toggle_filter(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<FilterState>, AppError> {
    let key: FilterKey = key.parse().map_err(AppError::Validation)?;
    Ok(Json(state.dashboard.toggle_filter(key)))
}

/// DELETE /api/v1/dashboard/filters
/// Turns the toggles off; the search text is left as is.
pub async fn handle_clear_filters(State(state): State<AppState>) -> Json<FilterState> {
    Json(state.dashboard.clear_filters())
}

/// PUT /api/v1/dashboard/search
pub async fn handle_set_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Json<FilterState> {
    Json(state.dashboard.set_search(&req.text))
}

/// POST /api/v1/dashboard/selection/:filename/toggle
pub async fn handle_toggle_selection(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<SelectionResponse>, AppError> {
    let outcome = state.dashboard.toggle_selection(&filename)?;
    Ok(Json(SelectionResponse {
        outcome,
        selection: state.dashboard.view().selection,
    }))
}

/// DELETE /api/v1/dashboard/selection
pub async fn handle_clear_selection(State(state): State<AppState>) -> StatusCode {
    state.dashboard.clear_selection();
    StatusCode::NO_CONTENT
}

/// POST /api/v1/dashboard/selection/shortlist
pub async fn handle_bulk_shortlist(
    State(state): State<AppState>,
) -> Result<Json<BulkOutcome>, AppError> {
    Ok(Json(state.dashboard.bulk_shortlist_selected().await?))
}

/// GET /api/v1/dashboard/comparison
pub async fn handle_comparison(State(state): State<AppState>) -> Json<Vec<ComparisonEntry>> {
    Json(state.dashboard.comparison())
}

/// GET /api/v1/dashboard/export?scope=all|selected
pub async fn handle_export(
    State(state): State<AppState>,
    Query(params): Query<ExportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (filename, body) = state.dashboard.export_csv(params.scope)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    ))
}

/// PUT /api/v1/dashboard/candidates/:job_id/:filename/status
pub async fn handle_set_status(
    State(state): State<AppState>,
    Path((job_id, filename)): Path<(String, String)>,
    Json(req): Json<StatusUpdateRequest>,
) -> Result<Json<MutationOutcome>, AppError> {
    let key = CandidateKey { job_id, filename };
    Ok(Json(state.dashboard.set_candidate_status(key, req.status).await?))
}

/// POST /api/v1/dashboard/candidates/:job_id/:filename/shortlist
pub async fn handle_toggle_shortlist(
    State(state): State<AppState>,
    Path((job_id, filename)): Path<(String, String)>,
) -> Result<Json<MutationOutcome>, AppError> {
    let key = CandidateKey { job_id, filename };
    Ok(Json(state.dashboard.toggle_shortlist(key).await?))
}

/// GET /api/v1/notifications
pub async fn handle_notifications(State(state): State<AppState>) -> Json<NotificationSummary> {
    Json(state.dashboard.notifications())
}

/// POST /api/v1/notifications/read
/// An absent `ids` marks everything read.
pub async fn handle_mark_read(
    State(state): State<AppState>,
    Json(req): Json<MarkReadRequest>,
) -> Result<Json<NotificationSummary>, AppError> {
    state.dashboard.mark_notifications_read(req.ids).await?;
    Ok(Json(state.dashboard.notifications()))
}
