//! # Care Scheduler Backend
//!
//! Visit scheduling for a home-care agency: recurring weekly templates per
//! patient, projection of templates onto the calendar, ad-hoc recurring
//! visits with a preview/commit workflow and double-booking detection.
//!
//! ## Architecture
//!
//! - **domain**: services, commands and models
//! - **storage**: SQLite persistence through sqlx
//! - **io**: REST endpoints (axum) and DTO mapping
//! - **config**: YAML file plus environment overrides

use anyhow::Result;
use axum::http::{HeaderValue, Method};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod config;
pub mod domain;
pub mod io;
pub mod storage;

use config::AppConfig;
use domain::{
    AuthorizationLookup, InMemoryDirectory, PartyDirectory, ScheduleService, TemplateProjector,
    TemplateService,
};
use io::rest::{schedule_apis, template_apis};
use storage::DbConnection;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub template_service: TemplateService,
    pub schedule_service: ScheduleService,
    pub projector: TemplateProjector,
}

impl AppState {
    /// Wire the services to one database and one directory
    pub fn new<D>(db: DbConnection, directory: Arc<D>, config: &AppConfig) -> Self
    where
        D: PartyDirectory + AuthorizationLookup + 'static,
    {
        let parties: Arc<dyn PartyDirectory> = directory.clone();
        let authorizations: Arc<dyn AuthorizationLookup> = directory;

        Self {
            template_service: TemplateService::new(db.clone(), parties.clone()),
            schedule_service: ScheduleService::new(db.clone(), parties, authorizations)
                .with_page_sizes(config.default_page_size, config.max_page_size),
            projector: TemplateProjector::new(db).with_max_projection_days(config.max_projection_days),
        }
    }
}

/// Open the database, load the directory and build the services
pub async fn initialize_backend(config: &AppConfig) -> Result<AppState> {
    info!("Initializing backend");

    let db = DbConnection::new(&config.database_url).await?;

    let directory = match &config.directory_seed {
        Some(path) => {
            info!("Loading directory seed from {}", path.display());
            InMemoryDirectory::from_yaml_file(path)?
        }
        None => {
            info!("No directory seed configured; accepting any patient and staff id");
            InMemoryDirectory::permissive()
        }
    };

    Ok(AppState::new(db, Arc::new(directory), config))
}

/// Create the Axum router with all routes configured
pub fn create_router(app_state: AppState, cors_origin: &str) -> Result<Router> {
    let cors = CorsLayer::new()
        .allow_origin(cors_origin.parse::<HeaderValue>()?)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any);

    let api_routes = Router::new()
        .merge(template_apis::router())
        .nest("/schedule-events", schedule_apis::router());

    Ok(Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::AuthorizationInfo;
    use chrono::NaiveDate;

    /// State over a fresh in-memory database with a small seeded directory
    pub async fn setup_test_state() -> AppState {
        let db = DbConnection::init_test().await.expect("Failed to create test database");
        let directory = InMemoryDirectory::default()
            .with_patient("patient-1", "Ada Lovelace")
            .with_patient("patient-2", "Alan Turing")
            .with_staff("staff-x", "Grace Hopper")
            .with_staff("staff-y", "Katherine Johnson")
            .with_authorization(AuthorizationInfo {
                id: "auth-1".to_string(),
                patient_id: "patient-1".to_string(),
                valid_from: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                valid_to: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
                remaining_units: Some(40),
            });

        AppState::new(db, Arc::new(directory), &AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_template_projection_through_router() {
        let state = test_support::setup_test_state().await;
        let app = create_router(state, "http://localhost:8080").unwrap();

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/templates",
                json!({ "patient_id": "patient-1", "name": "Two week rota", "anchor_date": "2025-03-02" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let template: shared::Template = serde_json::from_slice(&bytes).unwrap();

        for week_index in [0, 1] {
            let response = app
                .clone()
                .oneshot(post_json(
                    &format!("/api/templates/{}/weeks", template.id),
                    json!({ "week_index": week_index }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        for (week_index, weekday) in [(0, 1), (1, 3)] {
            let response = app
                .clone()
                .oneshot(post_json(
                    &format!("/api/templates/{}/weeks/{}/events", template.id, week_index),
                    json!({ "weekdays": [weekday], "start_time": "09:00", "end_time": "10:00" }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/patients/patient-1/template/generate",
                json!({ "end_date": "2025-03-18" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let generated: shared::GenerateFromTemplateResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(generated.created_count, 3);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/schedule-events?patient_id=patient-1&status=PLANNED")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let listed: shared::ScheduleEventListResponse = serde_json::from_slice(&bytes).unwrap();
        let dates: Vec<_> = listed.events.iter().map(|e| e.event_date.as_str()).collect();
        assert_eq!(dates, vec!["2025-03-03", "2025-03-12", "2025-03-17"]);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let state = test_support::setup_test_state().await;
        let app = create_router(state, "http://localhost:8080").unwrap();

        let response = app
            .oneshot(Request::builder().uri("/api/nothing").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
