//! # REST API for Visit Templates
//!
//! Endpoints for maintaining a patient's recurring weekly pattern and
//! projecting it onto the calendar.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, post, put},
    Router,
};
use shared::{
    AddWeekRequest, CreateTemplateRequest, GenerateFromTemplateRequest, InsertTemplateEventRequest,
    TemplateEventsResponse, UpdateTemplateStatusRequest,
};
use tracing::info;

use crate::domain::error::ScheduleError;
use crate::io::rest::mappers::parse_date;
use crate::io::rest::mappers::template_mapper::TemplateMapper;
use crate::AppState;

/// Create a router for template related APIs
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/templates", post(create_template))
        .route("/templates/:template_id", delete(delete_template))
        .route("/templates/:template_id/status", put(update_template_status))
        .route("/templates/:template_id/weeks", post(add_week))
        .route("/templates/:template_id/weeks/:week_index", delete(delete_week))
        .route(
            "/templates/:template_id/weeks/:week_index/events",
            post(insert_template_event),
        )
        .route(
            "/templates/:template_id/events/:event_id",
            delete(delete_template_event),
        )
        .route("/patients/:patient_id/template", get(get_template_with_weeks))
        .route(
            "/patients/:patient_id/template/generate",
            post(generate_from_template),
        )
}

pub async fn create_template(
    State(state): State<AppState>,
    Json(request): Json<CreateTemplateRequest>,
) -> Result<impl IntoResponse, ScheduleError> {
    info!("POST /api/templates - request: {:?}", request);

    let command = TemplateMapper::to_create_command(request)?;
    let template = state.template_service.create_template(command).await?;

    Ok((StatusCode::CREATED, Json(TemplateMapper::to_dto(template))))
}

/// Active template of a patient with every week and event
pub async fn get_template_with_weeks(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> Result<impl IntoResponse, ScheduleError> {
    info!("GET /api/patients/{}/template", patient_id);

    let detail = state.template_service.get_template_with_weeks(&patient_id).await?;

    Ok(Json(TemplateMapper::detail_to_dto(detail)))
}

pub async fn update_template_status(
    State(state): State<AppState>,
    Path(template_id): Path<String>,
    Json(request): Json<UpdateTemplateStatusRequest>,
) -> Result<impl IntoResponse, ScheduleError> {
    info!("PUT /api/templates/{}/status - request: {:?}", template_id, request);

    let status = TemplateMapper::status_to_domain(request.status);
    let template = state
        .template_service
        .update_template_status(&template_id, status)
        .await?;

    Ok(Json(TemplateMapper::to_dto(template)))
}

pub async fn delete_template(
    State(state): State<AppState>,
    Path(template_id): Path<String>,
) -> Result<impl IntoResponse, ScheduleError> {
    info!("DELETE /api/templates/{}", template_id);

    state.template_service.delete_template(&template_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_week(
    State(state): State<AppState>,
    Path(template_id): Path<String>,
    Json(request): Json<AddWeekRequest>,
) -> Result<impl IntoResponse, ScheduleError> {
    info!("POST /api/templates/{}/weeks - request: {:?}", template_id, request);

    let detail = state
        .template_service
        .add_week(&template_id, request.week_index)
        .await?;

    Ok((StatusCode::CREATED, Json(TemplateMapper::detail_to_dto(detail))))
}

pub async fn delete_week(
    State(state): State<AppState>,
    Path((template_id, week_index)): Path<(String, u32)>,
) -> Result<impl IntoResponse, ScheduleError> {
    info!("DELETE /api/templates/{}/weeks/{}", template_id, week_index);

    state.template_service.delete_week(&template_id, week_index).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// One event per requested weekday
pub async fn insert_template_event(
    State(state): State<AppState>,
    Path((template_id, week_index)): Path<(String, u32)>,
    Json(request): Json<InsertTemplateEventRequest>,
) -> Result<impl IntoResponse, ScheduleError> {
    info!(
        "POST /api/templates/{}/weeks/{}/events - request: {:?}",
        template_id, week_index, request
    );

    let command = TemplateMapper::to_insert_event_command(template_id, week_index, request)?;
    let events = state.template_service.insert_template_event(command).await?;

    Ok((
        StatusCode::CREATED,
        Json(TemplateEventsResponse {
            events: TemplateMapper::to_event_dto_list(events),
        }),
    ))
}

/// Responds with the events left in the week
pub async fn delete_template_event(
    State(state): State<AppState>,
    Path((template_id, event_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ScheduleError> {
    info!("DELETE /api/templates/{}/events/{}", template_id, event_id);

    let remaining = state
        .template_service
        .delete_template_event(&template_id, &event_id)
        .await?;

    Ok(Json(TemplateEventsResponse {
        events: TemplateMapper::to_event_dto_list(remaining),
    }))
}

pub async fn generate_from_template(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
    Json(request): Json<GenerateFromTemplateRequest>,
) -> Result<impl IntoResponse, ScheduleError> {
    info!(
        "POST /api/patients/{}/template/generate - request: {:?}",
        patient_id, request
    );

    let end_date = parse_date("end_date", &request.end_date)?;
    let result = state
        .projector
        .generate_from_template(&patient_id, end_date)
        .await?;

    Ok(Json(TemplateMapper::to_generate_response(result)))
}
