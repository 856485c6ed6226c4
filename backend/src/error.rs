use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

use crate::db::RepositoryError;
use crate::detect::PipelineError;
use crate::upload::UploadError;

/// Errors as the client sees them. Messages are generic; diagnostics stay in
/// the server log.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidImage(#[from] UploadError),
    #[error("{0}")]
    BadRequest(String),
    #[error("Missing or invalid authorization token")]
    Unauthorized,
    #[error("Not authorized")]
    Forbidden,
    #[error("Detection not found")]
    NotFound,
    #[error("Image storage is unavailable")]
    Storage,
    #[error("Failed to save detection")]
    Persistence,
    #[error("Internal Server Error")]
    Internal,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidImage(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Storage | ApiError::Persistence | ApiError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "message": self.to_string(),
        }))
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Storage(_) => ApiError::Storage,
            PipelineError::Persistence(_) => ApiError::Persistence,
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        log::error!("Repository error: {}", err);
        ApiError::Internal
    }
}

impl From<actix_multipart::MultipartError> for ApiError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        log::warn!("Rejected multipart payload: {}", err);
        ApiError::BadRequest("Invalid multipart payload".to_string())
    }
}
