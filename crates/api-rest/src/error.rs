use api_shared::{ErrorRes, ValidationRes};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use intake_core::IntakeError;

/// An [`IntakeError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub IntakeError);

impl From<IntakeError> for ApiError {
    fn from(err: IntakeError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            IntakeError::InvalidInput(_) | IntakeError::Text(_) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST")
            }
            IntakeError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_FAILED"),
            IntakeError::Config(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_ID_CONFIG"),
            IntakeError::InvalidTransition { .. } => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            IntakeError::PriorityDowngrade { .. } => (StatusCode::CONFLICT, "PRIORITY_DOWNGRADE"),
            IntakeError::ManualSequenceRequired | IntakeError::ManualSequenceNotIncreasing { .. } => {
                (StatusCode::CONFLICT, "MANUAL_SEQUENCE")
            }
            IntakeError::PatientNotFound(_) | IntakeError::HospitalNotFound(_) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            IntakeError::AllocationConflict { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "ALLOCATION_CONFLICT")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = ?self.0, "intake request failed");
            "An internal error occurred".to_owned()
        } else {
            self.0.to_string()
        };

        let errors = match &self.0 {
            IntakeError::Validation(report) => ValidationRes::from(report).errors,
            _ => Vec::new(),
        };

        let body = ErrorRes {
            code: code.to_owned(),
            message,
            errors,
        };
        (status, Json(body)).into_response()
    }
}
