use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use std::io;
use thiserror::Error;

use crate::upload::ALLOWED_EXTENSIONS;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Missing API key")]
    MissingApiKey,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("No image file provided")]
    MissingImage,

    #[error("No file selected")]
    EmptyFilename,

    #[error("File type not allowed. Allowed types: {}", ALLOWED_EXTENSIONS.join(", "))]
    DisallowedExtension,

    #[error("Malformed upload: {0}")]
    MalformedUpload(String),

    #[error("File too large: max {limit} bytes allowed")]
    PayloadTooLarge { limit: usize },

    #[error("Storage error: {0}")]
    Storage(#[from] io::Error),

    /// A submission the spooler did not accept. Rendered with the
    /// `success: false` envelope of the print endpoint.
    #[error("{0}")]
    PrintFailed(SpoolerError),

    #[error("{0}")]
    Spooler(#[from] SpoolerError),
}

#[derive(Debug, Error)]
pub enum SpoolerError {
    #[error("No printer configured or found")]
    NoPrinter,

    #[error("Print failed: {0}")]
    Rejected(String),

    #[error("{what} command timed out")]
    TimedOut { what: &'static str },

    #[error("{what} error: {source}")]
    Exec {
        what: &'static str,
        #[source]
        source: io::Error,
    },
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    fn error_type(&self) -> &'static str {
        match self {
            AppError::Initialization(_) => "initialization_error",
            AppError::MissingApiKey | AppError::InvalidApiKey => "auth_error",
            AppError::MissingImage
            | AppError::EmptyFilename
            | AppError::DisallowedExtension
            | AppError::MalformedUpload(_)
            | AppError::PayloadTooLarge { .. } => "validation_error",
            AppError::Storage(_) => "storage_error",
            AppError::PrintFailed(_) | AppError::Spooler(_) => "spooler_error",
        }
    }

    pub fn error_body(&self) -> serde_json::Value {
        match self {
            AppError::PrintFailed(_) => serde_json::json!({
                "success": false,
                "error": self.to_string()
            }),
            _ => serde_json::json!({
                "error": self.to_string()
            }),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingApiKey => StatusCode::UNAUTHORIZED,
            AppError::InvalidApiKey => StatusCode::FORBIDDEN,
            AppError::MissingImage
            | AppError::EmptyFilename
            | AppError::DisallowedExtension
            | AppError::MalformedUpload(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Initialization(_)
            | AppError::Storage(_)
            | AppError::PrintFailed(_)
            | AppError::Spooler(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        tracing::debug!(error_type = self.error_type(), "{}", self);
        HttpResponse::build(self.status_code()).json(self.error_body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spooler_error_display() {
        assert_eq!(
            SpoolerError::NoPrinter.to_string(),
            "No printer configured or found"
        );
        assert_eq!(
            SpoolerError::Rejected("no such printer".to_string()).to_string(),
            "Print failed: no such printer"
        );
        assert_eq!(
            SpoolerError::TimedOut { what: "Print" }.to_string(),
            "Print command timed out"
        );
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(AppError::MissingApiKey.status_code(), 401);
        assert_eq!(AppError::InvalidApiKey.status_code(), 403);
        assert_eq!(AppError::DisallowedExtension.status_code(), 400);
        assert_eq!(
            AppError::PayloadTooLarge { limit: 1 }.status_code(),
            413
        );
        assert_eq!(
            AppError::PrintFailed(SpoolerError::NoPrinter).status_code(),
            500
        );
    }

    #[test]
    fn test_disallowed_extension_lists_allowed_types() {
        assert_eq!(
            AppError::DisallowedExtension.to_string(),
            "File type not allowed. Allowed types: png, jpg, jpeg, gif, bmp, webp"
        );
    }

    #[test]
    fn test_error_body_json() {
        let err = AppError::PrintFailed(SpoolerError::Rejected("no such printer".to_string()));
        let json = err.error_body();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Print failed: no such printer");

        let err = AppError::Spooler(SpoolerError::TimedOut { what: "Status" });
        let json = err.error_body();
        assert!(json.get("success").is_none());
        assert_eq!(json["error"], "Status command timed out");
    }
}
