//! # REST API for Scheduled Visits
//!
//! Preview/commit of ad-hoc visit batches, listing and single-visit
//! maintenance including check-in and check-out.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use shared::{
    CreateScheduleEventsRequest, ScheduleEventListRequest, ScheduleEventsResponse,
    SchedulePreviewRequest, UpdateScheduleEventRequest, VisitClockRequest,
};
use tracing::info;

use crate::domain::error::ScheduleError;
use crate::io::rest::mappers::parse_datetime;
use crate::io::rest::mappers::schedule_mapper::ScheduleMapper;
use crate::AppState;

/// Create a router for schedule event APIs
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_schedule_events).post(create_schedule_events))
        .route("/preview", post(create_schedule_preview))
        .route("/:event_id", get(get_schedule_event).patch(update_schedule_event))
        .route("/:event_id/check-in", post(record_check_in))
        .route("/:event_id/check-out", post(record_check_out))
}

/// Expand and conflict-check a definition without storing anything
pub async fn create_schedule_preview(
    State(state): State<AppState>,
    Json(request): Json<SchedulePreviewRequest>,
) -> Result<impl IntoResponse, ScheduleError> {
    info!("POST /api/schedule-events/preview - request: {:?}", request);

    let command = ScheduleMapper::to_preview_command(request)?;
    let preview = state.schedule_service.create_schedule_preview(command).await?;

    Ok(Json(ScheduleMapper::to_preview_response(preview)))
}

pub async fn create_schedule_events(
    State(state): State<AppState>,
    Json(request): Json<CreateScheduleEventsRequest>,
) -> Result<impl IntoResponse, ScheduleError> {
    info!(
        "POST /api/schedule-events - {} candidates",
        request.candidates.len()
    );

    let batch = ScheduleMapper::to_commit_batch(request)?;
    let events = state.schedule_service.create_schedule_events(batch).await?;

    Ok((
        StatusCode::CREATED,
        Json(ScheduleEventsResponse {
            events: ScheduleMapper::to_event_dto_list(events),
        }),
    ))
}

pub async fn get_schedule_events(
    State(state): State<AppState>,
    Query(request): Query<ScheduleEventListRequest>,
) -> Result<impl IntoResponse, ScheduleError> {
    info!("GET /api/schedule-events - query: {:?}", request);

    let query = ScheduleMapper::to_list_query(request)?;
    let page = state.schedule_service.get_schedule_events(query).await?;

    Ok(Json(ScheduleMapper::to_list_response(page)))
}

pub async fn get_schedule_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, ScheduleError> {
    info!("GET /api/schedule-events/{}", event_id);

    let event = state.schedule_service.get_schedule_event(&event_id).await?;

    Ok(Json(ScheduleMapper::event_to_dto(event)))
}

pub async fn update_schedule_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Json(request): Json<UpdateScheduleEventRequest>,
) -> Result<impl IntoResponse, ScheduleError> {
    info!("PATCH /api/schedule-events/{} - request: {:?}", event_id, request);

    let command = ScheduleMapper::to_update_command(event_id, request)?;
    let event = state.schedule_service.update_schedule_event(command).await?;

    Ok(Json(ScheduleMapper::event_to_dto(event)))
}

pub async fn record_check_in(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Json(request): Json<VisitClockRequest>,
) -> Result<impl IntoResponse, ScheduleError> {
    info!("POST /api/schedule-events/{}/check-in at {}", event_id, request.at);

    let at = parse_datetime("at", &request.at)?;
    let event = state.schedule_service.record_check_in(&event_id, at).await?;

    Ok(Json(ScheduleMapper::event_to_dto(event)))
}

pub async fn record_check_out(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Json(request): Json<VisitClockRequest>,
) -> Result<impl IntoResponse, ScheduleError> {
    info!("POST /api/schedule-events/{}/check-out at {}", event_id, request.at);

    let at = parse_datetime("at", &request.at)?;
    let event = state.schedule_service.record_check_out(&event_id, at).await?;

    Ok(Json(ScheduleMapper::event_to_dto(event)))
}
