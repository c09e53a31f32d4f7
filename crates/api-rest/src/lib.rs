//! # API REST
//!
//! REST API implementation for patient intake.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, status codes)
//!
//! Uses `api-shared` for request/response types.

#![warn(rust_2018_idioms)]

mod error;

pub use error::ApiError;

use api_shared::{
    parse_category, parse_flow_step, parse_priority, ClassifyReq, ClassifyRes, ErrorRes,
    FieldErrorRes, HealthRes, HealthService, IdConfigDto, PatientRes, PreviewRes, PriorityReq,
    RegisterReq, RequiredFieldsRes, RouteReq, ValidateReq, ValidationRes,
};
use axum::{
    extract::{Path as AxumPath, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use intake_core::{
    required_fields, validate, wizard_steps, Classification, CoreConfig, FlowRouter, FlowStep,
    HospitalContext, HospitalIdConfig, HospitalKey, IdConfigService, NonEmptyText,
    PatientRecordId, PatientService, RecordStore,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Header naming the member of staff making the request.
pub const ACTOR_HEADER: &str = "x-actor";

/// Application state for the REST API server
///
/// Contains the services shared by all request handlers.
#[derive(Clone)]
pub struct AppState {
    patients: PatientService,
    settings: IdConfigService,
}

impl AppState {
    pub fn new(cfg: Arc<CoreConfig>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            patients: PatientService::new(cfg.clone(), store.clone()),
            settings: IdConfigService::new(cfg, store),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        get_required_fields,
        validate_draft,
        classify_intake,
        get_id_config,
        put_id_config,
        preview_id,
        register_patient,
        get_patient,
        advance_patient,
        route_patient,
        discharge_patient,
        escalate_priority,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        FieldErrorRes,
        ValidationRes,
        ValidateReq,
        RequiredFieldsRes,
        ClassifyReq,
        ClassifyRes,
        IdConfigDto,
        PreviewRes,
        RegisterReq,
        PatientRes,
        RouteReq,
        PriorityReq,
    ))
)]
pub struct ApiDoc;

/// Builds the intake router with Swagger UI and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/intake/required-fields/:category", get(get_required_fields))
        .route("/intake/validate", post(validate_draft))
        .route("/intake/classify", post(classify_intake))
        .route(
            "/hospitals/:hospital/id-config",
            get(get_id_config).put(put_id_config),
        )
        .route("/hospitals/:hospital/id-config/preview", get(preview_id))
        .route("/hospitals/:hospital/patients", post(register_patient))
        .route("/hospitals/:hospital/patients/:id", get(get_patient))
        .route(
            "/hospitals/:hospital/patients/:id/advance",
            post(advance_patient),
        )
        .route("/hospitals/:hospital/patients/:id/route", post(route_patient))
        .route(
            "/hospitals/:hospital/patients/:id/discharge",
            post(discharge_patient),
        )
        .route(
            "/hospitals/:hospital/patients/:id/priority",
            post(escalate_priority),
        )
        .merge(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn hospital_context(hospital: &str, headers: &HeaderMap) -> Result<HospitalContext, ApiError> {
    let key = HospitalKey::parse(hospital)?;
    let actor = headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok());
    Ok(HospitalContext::new(key).with_actor(NonEmptyText::from_optional(actor)))
}

fn patient_id(id: &str) -> Result<PatientRecordId, ApiError> {
    Ok(PatientRecordId::parse(id)?)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
#[axum::debug_handler]
async fn health() -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    get,
    path = "/intake/required-fields/{category}",
    params(("category" = String, Path, description = "new, returning or emergency")),
    responses(
        (status = 200, description = "Mandatory fields and wizard steps", body = RequiredFieldsRes),
        (status = 400, description = "Unknown category", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_required_fields(
    AxumPath(category): AxumPath<String>,
) -> Result<Json<RequiredFieldsRes>, ApiError> {
    let category = parse_category(&category)?;
    Ok(Json(RequiredFieldsRes {
        registration_category: category.as_str().to_owned(),
        fields: required_fields(category)
            .into_iter()
            .map(|f| f.as_str().to_owned())
            .collect(),
        wizard_steps: wizard_steps(category)
            .into_iter()
            .map(|s| s.as_str().to_owned())
            .collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/intake/validate",
    request_body = ValidateReq,
    responses(
        (status = 200, description = "Validation report; invalid drafts are not an error here", body = ValidationRes)
    )
)]
/// Checks a draft without registering anything.
#[axum::debug_handler]
async fn validate_draft(Json(req): Json<ValidateReq>) -> Json<ValidationRes> {
    Json(ValidationRes::from(&validate(&req.draft)))
}

#[utoipa::path(
    post,
    path = "/intake/classify",
    request_body = ClassifyReq,
    responses(
        (status = 200, description = "Effective priority and first step", body = ClassifyRes),
        (status = 400, description = "Unknown category or priority", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn classify_intake(Json(req): Json<ClassifyReq>) -> Result<Json<ClassifyRes>, ApiError> {
    let category = parse_category(&req.registration_category)?;
    let requested = match req.requested_priority.as_deref() {
        Some(p) => parse_priority(p)?,
        None => Default::default(),
    };
    let classification = Classification::for_intake(category, requested);
    let next = FlowRouter::next_step(FlowStep::Registration, &classification)?;
    Ok(Json(ClassifyRes {
        registration_category: category.as_str().to_owned(),
        effective_priority: classification.effective_priority.as_str().to_owned(),
        emergency: classification.is_emergency(),
        next_step: next.as_str().to_owned(),
    }))
}

#[utoipa::path(
    get,
    path = "/hospitals/{hospital}/id-config",
    params(("hospital" = String, Path, description = "Hospital key")),
    responses(
        (status = 200, description = "Current settings", body = IdConfigDto),
        (status = 404, description = "Hospital not provisioned", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_id_config(
    State(state): State<AppState>,
    AxumPath(hospital): AxumPath<String>,
    headers: HeaderMap,
) -> Result<Json<IdConfigDto>, ApiError> {
    let ctx = hospital_context(&hospital, &headers)?;
    let config = state.settings.load(&ctx)?;
    Ok(Json(IdConfigDto::from(&config)))
}

#[utoipa::path(
    put,
    path = "/hospitals/{hospital}/id-config",
    params(("hospital" = String, Path, description = "Hospital key")),
    request_body = IdConfigDto,
    responses(
        (status = 200, description = "Settings saved", body = IdConfigDto),
        (status = 422, description = "Invalid settings", body = ErrorRes),
        (status = 503, description = "Concurrent registrations, retry", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn put_id_config(
    State(state): State<AppState>,
    AxumPath(hospital): AxumPath<String>,
    headers: HeaderMap,
    Json(req): Json<IdConfigDto>,
) -> Result<Json<IdConfigDto>, ApiError> {
    let ctx = hospital_context(&hospital, &headers)?;
    let config = HospitalIdConfig::try_from(req)?;
    let saved = state.settings.save(&ctx, config)?;
    Ok(Json(IdConfigDto::from(&saved)))
}

#[utoipa::path(
    get,
    path = "/hospitals/{hospital}/id-config/preview",
    params(("hospital" = String, Path, description = "Hospital key")),
    responses(
        (status = 200, description = "The id the next registration would receive", body = PreviewRes),
        (status = 404, description = "Hospital not provisioned", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn preview_id(
    State(state): State<AppState>,
    AxumPath(hospital): AxumPath<String>,
    headers: HeaderMap,
) -> Result<Json<PreviewRes>, ApiError> {
    let ctx = hospital_context(&hospital, &headers)?;
    Ok(Json(PreviewRes {
        next_id: state.settings.preview(&ctx)?,
    }))
}

#[utoipa::path(
    post,
    path = "/hospitals/{hospital}/patients",
    params(("hospital" = String, Path, description = "Hospital key")),
    request_body = RegisterReq,
    responses(
        (status = 201, description = "Patient registered", body = PatientRes),
        (status = 422, description = "Draft failed validation", body = ErrorRes),
        (status = 503, description = "Patient number allocation raced, retry", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn register_patient(
    State(state): State<AppState>,
    AxumPath(hospital): AxumPath<String>,
    headers: HeaderMap,
    Json(req): Json<RegisterReq>,
) -> Result<(StatusCode, Json<PatientRes>), ApiError> {
    let ctx = hospital_context(&hospital, &headers)?;
    let registered = state
        .patients
        .register(&ctx, &req.draft, req.manual_sequence)?;
    Ok((
        StatusCode::CREATED,
        Json(PatientRes::from(&registered.patient)),
    ))
}

#[utoipa::path(
    get,
    path = "/hospitals/{hospital}/patients/{id}",
    params(
        ("hospital" = String, Path, description = "Hospital key"),
        ("id" = String, Path, description = "Patient record id (32 hex characters)")
    ),
    responses(
        (status = 200, description = "Patient", body = PatientRes),
        (status = 404, description = "Not found", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_patient(
    State(state): State<AppState>,
    AxumPath((hospital, id)): AxumPath<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<PatientRes>, ApiError> {
    let ctx = hospital_context(&hospital, &headers)?;
    let patient = state.patients.patient(&ctx, &patient_id(&id)?)?;
    Ok(Json(PatientRes::from(&patient)))
}

#[utoipa::path(
    post,
    path = "/hospitals/{hospital}/patients/{id}/advance",
    params(
        ("hospital" = String, Path, description = "Hospital key"),
        ("id" = String, Path, description = "Patient record id")
    ),
    responses(
        (status = 200, description = "Patient moved to the default next step", body = PatientRes),
        (status = 409, description = "No next step", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn advance_patient(
    State(state): State<AppState>,
    AxumPath((hospital, id)): AxumPath<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<PatientRes>, ApiError> {
    let ctx = hospital_context(&hospital, &headers)?;
    let patient = state.patients.advance(&ctx, &patient_id(&id)?)?;
    Ok(Json(PatientRes::from(&patient)))
}

#[utoipa::path(
    post,
    path = "/hospitals/{hospital}/patients/{id}/route",
    params(
        ("hospital" = String, Path, description = "Hospital key"),
        ("id" = String, Path, description = "Patient record id")
    ),
    request_body = RouteReq,
    responses(
        (status = 200, description = "Patient moved", body = PatientRes),
        (status = 409, description = "Transition not allowed", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn route_patient(
    State(state): State<AppState>,
    AxumPath((hospital, id)): AxumPath<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<RouteReq>,
) -> Result<Json<PatientRes>, ApiError> {
    let ctx = hospital_context(&hospital, &headers)?;
    let target = parse_flow_step(&req.target)?;
    let patient = state.patients.route_to(&ctx, &patient_id(&id)?, target)?;
    Ok(Json(PatientRes::from(&patient)))
}

#[utoipa::path(
    post,
    path = "/hospitals/{hospital}/patients/{id}/discharge",
    params(
        ("hospital" = String, Path, description = "Hospital key"),
        ("id" = String, Path, description = "Patient record id")
    ),
    responses(
        (status = 200, description = "Patient discharged", body = PatientRes)
    )
)]
#[axum::debug_handler]
async fn discharge_patient(
    State(state): State<AppState>,
    AxumPath((hospital, id)): AxumPath<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<PatientRes>, ApiError> {
    let ctx = hospital_context(&hospital, &headers)?;
    let patient = state.patients.discharge(&ctx, &patient_id(&id)?)?;
    Ok(Json(PatientRes::from(&patient)))
}

#[utoipa::path(
    post,
    path = "/hospitals/{hospital}/patients/{id}/priority",
    params(
        ("hospital" = String, Path, description = "Hospital key"),
        ("id" = String, Path, description = "Patient record id")
    ),
    request_body = PriorityReq,
    responses(
        (status = 200, description = "Priority raised or unchanged", body = PatientRes),
        (status = 409, description = "Priority cannot be lowered", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn escalate_priority(
    State(state): State<AppState>,
    AxumPath((hospital, id)): AxumPath<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<PriorityReq>,
) -> Result<Json<PatientRes>, ApiError> {
    let ctx = hospital_context(&hospital, &headers)?;
    let priority = parse_priority(&req.priority)?;
    let patient = state
        .patients
        .escalate_priority(&ctx, &patient_id(&id)?, priority)?;
    Ok(Json(PatientRes::from(&patient)))
}
