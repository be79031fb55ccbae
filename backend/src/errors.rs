use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::error::Category;
use shared::ErrorResponse;
use thiserror::Error;

use crate::diagnosis::DiagnosisError;
use crate::upload::UploadError;
use crate::weather::WeatherError;

/// Everything a handler can fail with, rendered as a JSON `ErrorResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Diagnosis(#[from] DiagnosisError),
    #[error(transparent)]
    Weather(#[from] WeatherError),
}

impl ApiError {
    fn body(&self) -> ErrorResponse {
        let (error, details) = match self {
            ApiError::Upload(UploadError::MissingImage)
            | ApiError::Diagnosis(DiagnosisError::MissingImage) => ("No image uploaded", None),
            ApiError::Upload(e @ UploadError::TooLarge { .. }) => {
                ("Image too large", Some(e.to_string()))
            }
            ApiError::Upload(UploadError::Multipart(e)) => {
                ("Internal Server Error", Some(e.to_string()))
            }
            ApiError::Diagnosis(DiagnosisError::ResponseParse { source, .. }) => {
                ("Failed to parse AI response", Some(parse_failure_summary(source)))
            }
            ApiError::Diagnosis(DiagnosisError::Staging(e)) => {
                ("Internal Server Error", Some(e.to_string()))
            }
            ApiError::Weather(WeatherError::InvalidCoordinates(msg)) => {
                ("Invalid coordinates", Some(msg.clone()))
            }
            ApiError::Weather(e) => ("Weather service unavailable", Some(e.to_string())),
        };
        ErrorResponse {
            error: error.to_string(),
            details,
        }
    }
}

/// serde_json messages quote the offending input, so the client only gets the
/// error category and position. The raw model text stays in the server log.
fn parse_failure_summary(err: &serde_json::Error) -> String {
    let kind = match err.classify() {
        Category::Syntax | Category::Eof => "model reply was not valid JSON",
        Category::Data => "model reply was not a valid diagnosis",
        Category::Io => "model reply could not be read",
    };
    format!("{} (line {}, column {})", kind, err.line(), err.column())
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Upload(UploadError::MissingImage)
            | ApiError::Diagnosis(DiagnosisError::MissingImage)
            | ApiError::Weather(WeatherError::InvalidCoordinates(_)) => StatusCode::BAD_REQUEST,
            ApiError::Upload(UploadError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Upload(UploadError::Multipart(_)) | ApiError::Diagnosis(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Weather(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            log::error!("Request failed: {}", self);
        }
        HttpResponse::build(self.status_code()).json(self.body())
    }
}
